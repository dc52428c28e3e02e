use axum::extract::{Path, Query};
use axum::routing::{get, post};
use axum::Router;
use chrono::Utc;

use estateerp_accounting::{
    CancelVoucher, ChartCommand, ChartId, ChartOfAccounts, CreateGroup, CreateHead, CreateVoucher,
    DeactivateHead, PostVoucher, RenameHead, Voucher, VoucherCommand, VoucherId,
};
use estateerp_core::{AggregateRoot, TenantId};
use estateerp_infra::streams;
use estateerp_infra::workflows::{ensure_default_chart, ensure_postable};

use super::common::{accepted, authorized, created, items, json, parse_id, require, today};
use crate::app::dto::{self, Body};
use crate::app::errors::{ApiResult, dispatch_error_to_response, not_found, validation};
use crate::context::RequestCtx;

pub fn router() -> Router {
    Router::new()
        .route("/chart/seed", post(seed_chart))
        .route("/groups", post(create_group).get(list_groups))
        .route("/heads", post(create_head).get(list_heads))
        .route("/heads/:code", get(get_head).put(rename_head))
        .route("/heads/:code/deactivate", post(deactivate_head))
        .route("/trial-balance", get(trial_balance))
        .route("/ledger/:code", get(ledger_statement))
        .route("/vouchers", post(create_voucher).get(list_vouchers))
        .route("/vouchers/:id", get(get_voucher))
        .route("/vouchers/:id/post", post(post_voucher))
        .route("/vouchers/:id/cancel", post(cancel_voucher))
}

fn seed(ctx: &RequestCtx) -> Result<(), axum::response::Response> {
    ensure_default_chart(&ctx.services.dispatcher, ctx.tenant_id()).map_err(dispatch_error_to_response)
}

fn load_chart(ctx: &RequestCtx) -> Result<ChartOfAccounts, axum::response::Response> {
    let chart_id = ChartId::for_tenant(ctx.tenant_id());
    ctx.services
        .load(ctx.tenant_id(), chart_id.0, |_, id| ChartOfAccounts::empty(ChartId::new(id)))
        .map_err(dispatch_error_to_response)
}

/// Seed the default chart first so user groups and heads can hang off it.
fn dispatch_chart(ctx: &RequestCtx, cmd: ChartCommand, permission: &'static str) -> ApiResult {
    let cmd = authorized(ctx, cmd, permission)?;
    seed(ctx)?;
    let chart_id = ChartId::for_tenant(ctx.tenant_id());
    let committed = ctx
        .services
        .dispatch::<ChartOfAccounts>(ctx.tenant_id(), chart_id.0, streams::CHART, cmd, |_, id| {
            ChartOfAccounts::empty(ChartId::new(id))
        })
        .map_err(dispatch_error_to_response)?;
    Ok(accepted(chart_id, &committed))
}

fn chart_id(tenant_id: TenantId) -> ChartId {
    ChartId::for_tenant(tenant_id)
}

async fn seed_chart(ctx: RequestCtx) -> ApiResult {
    require(&ctx, "accounting.chart.manage")?;
    seed(&ctx)?;
    let chart = load_chart(&ctx)?;
    Ok(json(serde_json::json!({
        "id": chart_id(ctx.tenant_id()).to_string(),
        "heads": chart.heads().count(),
    })))
}

async fn create_group(ctx: RequestCtx, Body(body): Body<dto::CreateGroupRequest>) -> ApiResult {
    let cmd = ChartCommand::CreateGroup(CreateGroup {
        tenant_id: ctx.tenant_id(),
        chart_id: chart_id(ctx.tenant_id()),
        code: body.code,
        name: body.name,
        nature: body.nature,
        parent: body.parent,
        occurred_at: Utc::now(),
    });
    dispatch_chart(&ctx, cmd, "accounting.chart.manage")
}

async fn list_groups(ctx: RequestCtx) -> ApiResult {
    require(&ctx, "accounting.read")?;
    Ok(items(ctx.services.read_models.accounting.groups(ctx.tenant_id())))
}

async fn create_head(ctx: RequestCtx, Body(body): Body<dto::CreateHeadRequest>) -> ApiResult {
    let cmd = ChartCommand::CreateHead(CreateHead {
        tenant_id: ctx.tenant_id(),
        chart_id: chart_id(ctx.tenant_id()),
        code: body.code,
        name: body.name,
        group: body.group,
        opening_balance: body.opening_balance,
        opening_side: body.opening_side,
        occurred_at: Utc::now(),
    });
    dispatch_chart(&ctx, cmd, "accounting.chart.manage")
}

/// Heads with their current balances.
async fn list_heads(ctx: RequestCtx) -> ApiResult {
    require(&ctx, "accounting.read")?;
    Ok(items(ctx.services.read_models.accounting.accounts(ctx.tenant_id())))
}

async fn get_head(ctx: RequestCtx, Path(code): Path<String>) -> ApiResult {
    require(&ctx, "accounting.read")?;
    ctx.services
        .read_models
        .accounting
        .account(ctx.tenant_id(), &code)
        .map(json)
        .ok_or_else(|| not_found(format!("ledger head '{code}'")))
}

async fn rename_head(
    ctx: RequestCtx,
    Path(code): Path<String>,
    Body(body): Body<dto::RenameRequest>,
) -> ApiResult {
    let cmd = ChartCommand::RenameHead(RenameHead {
        tenant_id: ctx.tenant_id(),
        chart_id: chart_id(ctx.tenant_id()),
        code,
        name: body.name,
        occurred_at: Utc::now(),
    });
    dispatch_chart(&ctx, cmd, "accounting.chart.manage")
}

async fn deactivate_head(ctx: RequestCtx, Path(code): Path<String>) -> ApiResult {
    let cmd = ChartCommand::DeactivateHead(DeactivateHead {
        tenant_id: ctx.tenant_id(),
        chart_id: chart_id(ctx.tenant_id()),
        code,
        occurred_at: Utc::now(),
    });
    dispatch_chart(&ctx, cmd, "accounting.chart.manage")
}

async fn trial_balance(ctx: RequestCtx) -> ApiResult {
    require(&ctx, "accounting.read")?;
    Ok(json(ctx.services.read_models.accounting.trial_balance(ctx.tenant_id())))
}

async fn ledger_statement(
    ctx: RequestCtx,
    Path(code): Path<String>,
    Query(q): Query<dto::LedgerQuery>,
) -> ApiResult {
    require(&ctx, "accounting.read")?;
    if let (Some(from), Some(to)) = (q.from, q.to) {
        if from > to {
            return Err(validation("'from' must not be after 'to'"));
        }
    }
    ctx.services
        .read_models
        .accounting
        .ledger(ctx.tenant_id(), &code, q.from, q.to)
        .map(json)
        .ok_or_else(|| not_found(format!("ledger head '{code}'")))
}

/// Every entry must name an active head of the tenant's chart. Balance is
/// checked by the voucher itself when it is posted.
async fn create_voucher(ctx: RequestCtx, Body(body): Body<dto::CreateVoucherRequest>) -> ApiResult {
    let tenant_id = ctx.tenant_id();
    let permission = if body.post {
        "accounting.vouchers.post"
    } else {
        "accounting.vouchers.create"
    };
    require(&ctx, permission)?;

    seed(&ctx)?;
    ensure_postable(&ctx.services.dispatcher, tenant_id, &body.entries)
        .map_err(dispatch_error_to_response)?;

    let voucher_id = VoucherId::generate();
    let cmd = authorized(
        &ctx,
        VoucherCommand::CreateVoucher(CreateVoucher {
            tenant_id,
            voucher_id,
            number: ctx.services.numbers.next(tenant_id, body.kind.prefix()),
            kind: body.kind,
            date: body.date.unwrap_or_else(today),
            narration: body.narration,
            entries: body.entries,
            reference: body.reference,
            post: body.post,
            occurred_at: Utc::now(),
        }),
        permission,
    )?;
    let committed = ctx
        .services
        .dispatch::<Voucher>(tenant_id, voucher_id.0, streams::VOUCHER, cmd, |_, id| {
            Voucher::empty(VoucherId::new(id))
        })
        .map_err(dispatch_error_to_response)?;
    Ok(created(voucher_id, &committed))
}

async fn list_vouchers(ctx: RequestCtx, Query(q): Query<dto::VoucherListQuery>) -> ApiResult {
    require(&ctx, "accounting.read")?;
    Ok(items(ctx.services.read_models.accounting.vouchers(ctx.tenant_id(), q.kind, q.status)))
}

async fn get_voucher(ctx: RequestCtx, Path(id): Path<String>) -> ApiResult {
    require(&ctx, "accounting.read")?;
    let voucher_id: VoucherId = parse_id(&id, "voucher id")?;
    ctx.services
        .read_models
        .accounting
        .voucher(ctx.tenant_id(), &voucher_id)
        .map(json)
        .ok_or_else(|| not_found(format!("voucher {voucher_id}")))
}

fn dispatch_voucher(ctx: &RequestCtx, voucher_id: VoucherId, cmd: VoucherCommand, permission: &'static str) -> ApiResult {
    let cmd = authorized(ctx, cmd, permission)?;
    let committed = ctx
        .services
        .dispatch::<Voucher>(ctx.tenant_id(), voucher_id.0, streams::VOUCHER, cmd, |_, id| {
            Voucher::empty(VoucherId::new(id))
        })
        .map_err(dispatch_error_to_response)?;
    Ok(accepted(voucher_id, &committed))
}

/// A draft may name a head that was deactivated after it was saved, so the
/// heads are checked again at posting time.
async fn post_voucher(ctx: RequestCtx, Path(id): Path<String>) -> ApiResult {
    require(&ctx, "accounting.vouchers.post")?;
    let voucher_id: VoucherId = parse_id(&id, "voucher id")?;
    let voucher: Voucher = ctx
        .services
        .load(ctx.tenant_id(), voucher_id.0, |_, id| Voucher::empty(VoucherId::new(id)))
        .map_err(dispatch_error_to_response)?;
    if voucher.version() == 0 {
        return Err(not_found(format!("voucher {voucher_id}")));
    }
    seed(&ctx)?;
    ensure_postable(&ctx.services.dispatcher, ctx.tenant_id(), voucher.entries())
        .map_err(dispatch_error_to_response)?;

    let cmd = VoucherCommand::PostVoucher(PostVoucher {
        tenant_id: ctx.tenant_id(),
        voucher_id,
        occurred_at: Utc::now(),
    });
    dispatch_voucher(&ctx, voucher_id, cmd, "accounting.vouchers.post")
}

async fn cancel_voucher(
    ctx: RequestCtx,
    Path(id): Path<String>,
    Body(body): Body<dto::CancelVoucherRequest>,
) -> ApiResult {
    let voucher_id: VoucherId = parse_id(&id, "voucher id")?;
    let cmd = VoucherCommand::CancelVoucher(CancelVoucher {
        tenant_id: ctx.tenant_id(),
        voucher_id,
        reason: body.reason,
        occurred_at: Utc::now(),
    });
    dispatch_voucher(&ctx, voucher_id, cmd, "accounting.vouchers.cancel")
}
