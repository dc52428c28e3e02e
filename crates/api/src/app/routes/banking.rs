use axum::extract::{Path, Query};
use axum::routing::{get, post};
use axum::Router;
use chrono::Utc;

use estateerp_accounting::{ChartId, ChartOfAccounts, Voucher, VoucherId, VoucherStatus};
use estateerp_banking::{
    BankAccount, BankAccountCommand, BankAccountId, CancelCheque, ImportStatement, IssueCheque,
    MarkChequeCleared, MatchCandidate, OpenBankAccount, ReconcileLine, RegisterChequeBook,
    StatementLineInput, TxnDirection, UnreconcileLine, suggest_matches,
};
use estateerp_core::{AggregateId, AggregateRoot};
use estateerp_infra::data::parse_statement;
use estateerp_infra::projections::BankAccountReadModel;
use estateerp_infra::streams;
use estateerp_infra::workflows::ensure_default_chart;

use super::common::{accepted, authorized, created, items, json, parse_id, require, today};
use crate::app::dto::{self, Body};
use crate::app::errors::{
    ApiResult, data_error_to_response, dispatch_error_to_response, not_found, validation,
};
use crate::context::RequestCtx;

const DEFAULT_MATCH_WINDOW_DAYS: u32 = 3;

pub fn router() -> Router {
    Router::new()
        .route("/accounts", post(open_account).get(list_accounts))
        .route("/accounts/:id", get(get_account))
        .route("/accounts/:id/cheque-books", post(register_cheque_book))
        .route("/accounts/:id/cheques", post(issue_cheque))
        .route("/accounts/:id/cheques/:leaf/clear", post(clear_cheque))
        .route("/accounts/:id/cheques/:leaf/cancel", post(cancel_cheque))
        .route("/accounts/:id/statement", post(import_statement))
        .route("/accounts/:id/statement.csv", post(import_statement_csv))
        .route("/accounts/:id/suggestions", get(match_suggestions))
        .route("/accounts/:id/reconcile", post(reconcile_line))
        .route("/accounts/:id/unreconcile", post(unreconcile_line))
        .route("/accounts/:id/summary", get(reconciliation_summary))
}

fn dispatch_account(
    ctx: &RequestCtx,
    account_id: BankAccountId,
    cmd: BankAccountCommand,
    permission: &'static str,
) -> ApiResult {
    let cmd = authorized(ctx, cmd, permission)?;
    let committed = ctx
        .services
        .dispatch::<BankAccount>(ctx.tenant_id(), account_id.0, streams::BANK_ACCOUNT, cmd, |_, id| {
            BankAccount::empty(BankAccountId::new(id))
        })
        .map_err(dispatch_error_to_response)?;
    Ok(accepted(account_id, &committed))
}

fn read_account(ctx: &RequestCtx, account_id: BankAccountId) -> Result<BankAccountReadModel, axum::response::Response> {
    ctx.services
        .read_models
        .banking
        .get(ctx.tenant_id(), &account_id)
        .ok_or_else(|| not_found(format!("bank account {account_id}")))
}

/// The ledger head must exist in the tenant's chart.
async fn open_account(ctx: RequestCtx, Body(body): Body<dto::OpenBankAccountRequest>) -> ApiResult {
    require(&ctx, "banking.accounts.open")?;
    let tenant_id = ctx.tenant_id();
    ensure_default_chart(&ctx.services.dispatcher, tenant_id).map_err(dispatch_error_to_response)?;
    let chart_id = ChartId::for_tenant(tenant_id);
    let chart: ChartOfAccounts = ctx
        .services
        .load(tenant_id, chart_id.0, |_, id| ChartOfAccounts::empty(ChartId::new(id)))
        .map_err(dispatch_error_to_response)?;
    if chart.head(body.ledger_head.trim()).is_none() {
        return Err(validation(format!("unknown ledger head '{}'", body.ledger_head)));
    }

    let account_id = BankAccountId::generate();
    let cmd = authorized(
        &ctx,
        BankAccountCommand::OpenBankAccount(OpenBankAccount {
            tenant_id,
            account_id,
            bank_name: body.bank_name,
            account_number: body.account_number,
            ifsc: body.ifsc,
            ledger_head: body.ledger_head,
            opening_balance: body.opening_balance,
            occurred_at: Utc::now(),
        }),
        "banking.accounts.open",
    )?;
    let committed = ctx
        .services
        .dispatch::<BankAccount>(tenant_id, account_id.0, streams::BANK_ACCOUNT, cmd, |_, id| {
            BankAccount::empty(BankAccountId::new(id))
        })
        .map_err(dispatch_error_to_response)?;
    Ok(created(account_id, &committed))
}

async fn list_accounts(ctx: RequestCtx) -> ApiResult {
    require(&ctx, "banking.read")?;
    Ok(items(ctx.services.read_models.banking.list(ctx.tenant_id())))
}

async fn get_account(ctx: RequestCtx, Path(id): Path<String>) -> ApiResult {
    require(&ctx, "banking.read")?;
    let account_id: BankAccountId = parse_id(&id, "bank account id")?;
    read_account(&ctx, account_id).map(json)
}

async fn register_cheque_book(
    ctx: RequestCtx,
    Path(id): Path<String>,
    Body(body): Body<dto::ChequeBookRequest>,
) -> ApiResult {
    let account_id: BankAccountId = parse_id(&id, "bank account id")?;
    let cmd = BankAccountCommand::RegisterChequeBook(RegisterChequeBook {
        tenant_id: ctx.tenant_id(),
        account_id,
        first_leaf: body.first_leaf,
        leaf_count: body.leaf_count,
        occurred_at: Utc::now(),
    });
    dispatch_account(&ctx, account_id, cmd, "banking.cheques.manage")
}

async fn issue_cheque(
    ctx: RequestCtx,
    Path(id): Path<String>,
    Body(body): Body<dto::IssueChequeRequest>,
) -> ApiResult {
    let account_id: BankAccountId = parse_id(&id, "bank account id")?;
    let cmd = BankAccountCommand::IssueCheque(IssueCheque {
        tenant_id: ctx.tenant_id(),
        account_id,
        leaf: body.leaf,
        payee: body.payee,
        amount: body.amount,
        date: body.date.unwrap_or_else(today),
        occurred_at: Utc::now(),
    });
    dispatch_account(&ctx, account_id, cmd, "banking.cheques.manage")
}

async fn clear_cheque(
    ctx: RequestCtx,
    Path((id, leaf)): Path<(String, u64)>,
    body: Option<Body<dto::ClearChequeRequest>>,
) -> ApiResult {
    let account_id: BankAccountId = parse_id(&id, "bank account id")?;
    let body = body.map(|Body(b)| b).unwrap_or_default();
    let cmd = BankAccountCommand::MarkChequeCleared(MarkChequeCleared {
        tenant_id: ctx.tenant_id(),
        account_id,
        leaf,
        date: body.date.unwrap_or_else(today),
        occurred_at: Utc::now(),
    });
    dispatch_account(&ctx, account_id, cmd, "banking.cheques.manage")
}

async fn cancel_cheque(
    ctx: RequestCtx,
    Path((id, leaf)): Path<(String, u64)>,
    body: Option<Body<dto::ReasonRequest>>,
) -> ApiResult {
    let account_id: BankAccountId = parse_id(&id, "bank account id")?;
    let cmd = BankAccountCommand::CancelCheque(CancelCheque {
        tenant_id: ctx.tenant_id(),
        account_id,
        leaf,
        reason: body.and_then(|Body(b)| b.reason),
        occurred_at: Utc::now(),
    });
    dispatch_account(&ctx, account_id, cmd, "banking.cheques.manage")
}

fn import_lines(ctx: &RequestCtx, account_id: BankAccountId, lines: Vec<StatementLineInput>) -> ApiResult {
    let cmd = BankAccountCommand::ImportStatement(ImportStatement {
        tenant_id: ctx.tenant_id(),
        account_id,
        lines,
        occurred_at: Utc::now(),
    });
    dispatch_account(ctx, account_id, cmd, "banking.statements.import")
}

async fn import_statement(
    ctx: RequestCtx,
    Path(id): Path<String>,
    Body(body): Body<dto::ImportStatementRequest>,
) -> ApiResult {
    let account_id: BankAccountId = parse_id(&id, "bank account id")?;
    let lines = body
        .lines
        .into_iter()
        .map(|l| StatementLineInput {
            date: l.date,
            description: l.description,
            reference: l.reference,
            withdrawal: l.withdrawal,
            deposit: l.deposit,
        })
        .collect();
    import_lines(&ctx, account_id, lines)
}

/// CSV body with header `date,description,reference,withdrawal,deposit`.
/// Rows that fail to parse are reported back and not imported.
async fn import_statement_csv(ctx: RequestCtx, Path(id): Path<String>, text: String) -> ApiResult {
    require(&ctx, "banking.statements.import")?;
    let account_id: BankAccountId = parse_id(&id, "bank account id")?;
    let parsed = parse_statement(&text).map_err(data_error_to_response)?;
    let rows = parsed.lines.len();
    let committed = if parsed.lines.is_empty() {
        0
    } else {
        let cmd = authorized(
            &ctx,
            BankAccountCommand::ImportStatement(ImportStatement {
                tenant_id: ctx.tenant_id(),
                account_id,
                lines: parsed.lines,
                occurred_at: Utc::now(),
            }),
            "banking.statements.import",
        )?;
        ctx.services
            .dispatch::<BankAccount>(ctx.tenant_id(), account_id.0, streams::BANK_ACCOUNT, cmd, |_, id| {
                BankAccount::empty(BankAccountId::new(id))
            })
            .map_err(dispatch_error_to_response)?
            .len()
    };
    Ok(json(serde_json::json!({
        "id": account_id.to_string(),
        "rows_parsed": rows,
        "rejected": parsed.rejected,
        "events_committed": committed,
    })))
}

/// Posted vouchers touching the account's ledger head become candidates; a
/// net debit to the bank head is a deposit.
fn candidates(ctx: &RequestCtx, ledger_head: &str) -> Vec<MatchCandidate> {
    ctx.services
        .read_models
        .accounting
        .vouchers(ctx.tenant_id(), None, Some(VoucherStatus::Posted))
        .into_iter()
        .filter_map(|v| {
            let net: i64 = v
                .entries
                .iter()
                .filter(|e| e.head_code == ledger_head)
                .map(|e| e.debit - e.credit)
                .sum();
            let (direction, amount) = TxnDirection::from_bank_net(net)?;
            Some(MatchCandidate {
                voucher_id: v.voucher_id.0,
                number: v.number,
                date: v.date,
                amount,
                direction,
            })
        })
        .collect()
}

async fn match_suggestions(
    ctx: RequestCtx,
    Path(id): Path<String>,
    Query(q): Query<dto::SuggestionQuery>,
) -> ApiResult {
    require(&ctx, "banking.read")?;
    require(&ctx, "accounting.read")?;
    let account_id: BankAccountId = parse_id(&id, "bank account id")?;
    let account = read_account(&ctx, account_id)?;
    let window = i64::from(q.window_days.unwrap_or(DEFAULT_MATCH_WINDOW_DAYS));
    let candidates = candidates(&ctx, &account.ledger_head);
    Ok(items(suggest_matches(&account.lines, &candidates, window)))
}

/// The voucher must be posted and move the account's ledger head by the
/// line's amount in the line's direction.
async fn reconcile_line(
    ctx: RequestCtx,
    Path(id): Path<String>,
    Body(body): Body<dto::ReconcileRequest>,
) -> ApiResult {
    require(&ctx, "banking.reconcile")?;
    let tenant_id = ctx.tenant_id();
    let account_id: BankAccountId = parse_id(&id, "bank account id")?;
    let voucher_id: AggregateId = parse_id(&body.voucher_id, "voucher id")?;
    let account: BankAccount = ctx
        .services
        .load(tenant_id, account_id.0, |_, id| BankAccount::empty(BankAccountId::new(id)))
        .map_err(dispatch_error_to_response)?;
    if account.tenant_id().is_none() {
        return Err(not_found(format!("bank account {account_id}")));
    }
    if account.line(body.line_id).is_none() {
        return Err(not_found(format!("statement line {}", body.line_id)));
    }

    let voucher: Voucher = ctx
        .services
        .load(tenant_id, voucher_id, |_, id| Voucher::empty(VoucherId::new(id)))
        .map_err(dispatch_error_to_response)?;
    if voucher.version() == 0 {
        return Err(not_found(format!("voucher {voucher_id}")));
    }
    if voucher.status() != VoucherStatus::Posted {
        return Err(validation(format!("voucher {} is not posted", voucher.number())));
    }
    let net: i64 = voucher
        .entries()
        .iter()
        .filter(|e| e.head_code.trim() == account.ledger_head())
        .map(|e| e.signed())
        .sum();
    let (direction, amount) = TxnDirection::from_bank_net(net).ok_or_else(|| {
        validation(format!(
            "voucher {} does not touch ledger head '{}'",
            voucher.number(),
            account.ledger_head()
        ))
    })?;

    let cmd = BankAccountCommand::ReconcileLine(ReconcileLine {
        tenant_id,
        account_id,
        line_id: body.line_id,
        voucher_id,
        amount,
        direction,
        occurred_at: Utc::now(),
    });
    dispatch_account(&ctx, account_id, cmd, "banking.reconcile")
}

async fn unreconcile_line(
    ctx: RequestCtx,
    Path(id): Path<String>,
    Body(body): Body<dto::UnreconcileRequest>,
) -> ApiResult {
    let account_id: BankAccountId = parse_id(&id, "bank account id")?;
    let cmd = BankAccountCommand::UnreconcileLine(UnreconcileLine {
        tenant_id: ctx.tenant_id(),
        account_id,
        line_id: body.line_id,
        occurred_at: Utc::now(),
    });
    dispatch_account(&ctx, account_id, cmd, "banking.reconcile")
}

async fn reconciliation_summary(ctx: RequestCtx, Path(id): Path<String>) -> ApiResult {
    require(&ctx, "banking.read")?;
    let account_id: BankAccountId = parse_id(&id, "bank account id")?;
    let account = read_account(&ctx, account_id)?;
    let unreconciled: Vec<_> = account.unreconciled().cloned().collect();
    Ok(json(serde_json::json!({
        "summary": account.summary(),
        "unreconciled": unreconciled,
    })))
}
