use axum::extract::{Path, Query};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::Router;
use chrono::{Days, NaiveDate, Utc};
use serde::Serialize;

use estateerp_core::AggregateId;
use estateerp_crm::{Customer, CustomerId};
use estateerp_infra::event_store::{EventStore, StoredEvent};
use estateerp_infra::numbering::INVOICE_PREFIX;
use estateerp_infra::projections::InvoiceReadModel;
use estateerp_infra::streams;
use estateerp_infra::workflows::post_invoice_events;
use estateerp_invoicing::{
    CancelInvoice, CreateInvoice, Invoice, InvoiceCommand, InvoiceId, IssueInvoice, RecordPayment,
    ReviseDraft,
};

use super::common::{accepted, authorized, json, parse_id, require, today};
use crate::app::dto::{self, Body};
use crate::app::errors::{
    ApiResult, dispatch_error_to_response, not_found, store_error_to_response, validation,
    workflow_error_to_response,
};
use crate::context::RequestCtx;

const DEFAULT_CREDIT_DAYS: u64 = 30;

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_invoice).get(list_invoices))
        .route("/summary", get(receivables_summary))
        .route("/:id", get(get_invoice).put(revise_draft))
        .route("/:id/issue", post(issue_invoice))
        .route("/:id/payments", post(record_payment))
        .route("/:id/cancel", post(cancel_invoice))
        .route("/:id/repost", post(repost_invoice))
}

/// Read model plus the overdue flag as of `today`.
#[derive(Debug, Serialize)]
struct InvoiceView {
    #[serde(flatten)]
    invoice: InvoiceReadModel,
    overdue: bool,
    days_overdue: i64,
}

impl InvoiceView {
    fn new(invoice: InvoiceReadModel, today: NaiveDate) -> Self {
        let overdue = invoice.is_overdue(today);
        let days_overdue = invoice.days_overdue(today);
        Self {
            invoice,
            overdue,
            days_overdue,
        }
    }
}

fn dispatch_invoice(
    ctx: &RequestCtx,
    invoice_id: InvoiceId,
    cmd: InvoiceCommand,
    permission: &'static str,
) -> Result<Vec<StoredEvent>, axum::response::Response> {
    let cmd = authorized(ctx, cmd, permission)?;
    ctx.services
        .dispatch::<Invoice>(ctx.tenant_id(), invoice_id.0, streams::INVOICE, cmd, |_, id| {
            Invoice::empty(InvoiceId::new(id))
        })
        .map_err(dispatch_error_to_response)
}

/// Dispatch, then post the accounting vouchers the committed events call for.
fn dispatch_and_post(
    ctx: &RequestCtx,
    invoice_id: InvoiceId,
    cmd: InvoiceCommand,
    permission: &'static str,
) -> ApiResult {
    let committed = dispatch_invoice(ctx, invoice_id, cmd, permission)?;
    posted_response(ctx, invoice_id, &committed)
}

fn posted_response(ctx: &RequestCtx, invoice_id: InvoiceId, committed: &[StoredEvent]) -> ApiResult {
    posted_with_status(ctx, StatusCode::OK, invoice_id, committed)
}

fn posted_with_status(
    ctx: &RequestCtx,
    status: StatusCode,
    invoice_id: InvoiceId,
    committed: &[StoredEvent],
) -> ApiResult {
    let services = &ctx.services;
    let vouchers = post_invoice_events(
        &services.dispatcher,
        &services.numbers,
        &services.config.posting,
        ctx.tenant_id(),
        committed,
    )
    .map_err(workflow_error_to_response)?;
    let body = serde_json::json!({
        "id": invoice_id.to_string(),
        "events_committed": committed.len(),
        "vouchers": vouchers.iter().map(ToString::to_string).collect::<Vec<_>>(),
    });
    Ok((status, axum::Json(body)).into_response())
}

/// Draft a GST invoice for a registered customer. The place of supply
/// defaults to the customer's state, the company state comes from config.
async fn create_invoice(ctx: RequestCtx, Body(body): Body<dto::CreateInvoiceRequest>) -> ApiResult {
    let tenant_id = ctx.tenant_id();
    let customer_id: CustomerId = parse_id(&body.customer_id, "customer id")?;
    let property_id = body
        .property_id
        .as_deref()
        .map(|raw| parse_id::<AggregateId>(raw, "property id"))
        .transpose()?;

    let customer: Customer = ctx
        .services
        .load(tenant_id, customer_id.0, |_, id| Customer::empty(CustomerId::new(id)))
        .map_err(dispatch_error_to_response)?;
    if customer.tenant_id().is_none() {
        return Err(not_found(format!("customer {customer_id}")));
    }
    if !customer.is_active() {
        return Err(validation(format!("customer {customer_id} is deactivated")));
    }

    let invoice_date = body.invoice_date.unwrap_or_else(today);
    let due_date = match body.due_date {
        Some(d) => d,
        None => invoice_date
            .checked_add_days(Days::new(DEFAULT_CREDIT_DAYS))
            .ok_or_else(|| validation("invoice date is out of range"))?,
    };
    let place_of_supply = body
        .place_of_supply
        .filter(|p| !p.trim().is_empty())
        .or_else(|| customer.state().map(|s| s.name().to_string()));

    let invoice_id = InvoiceId::generate();
    let create = InvoiceCommand::CreateInvoice(CreateInvoice {
        tenant_id,
        invoice_id,
        number: ctx.services.numbers.next(tenant_id, INVOICE_PREFIX),
        customer_id: customer_id.0,
        customer_name: customer.name().to_string(),
        customer_gstin: customer.gstin().map(str::to_string),
        place_of_supply,
        company_state: ctx.services.config.company_state.name().to_string(),
        invoice_date,
        due_date,
        property_id,
        items: body.items,
        occurred_at: Utc::now(),
    });
    let mut committed = dispatch_invoice(&ctx, invoice_id, create, "invoicing.invoices.create")?;

    if body.issue {
        let issue = InvoiceCommand::IssueInvoice(IssueInvoice {
            tenant_id,
            invoice_id,
            occurred_at: Utc::now(),
        });
        committed.extend(dispatch_invoice(&ctx, invoice_id, issue, "invoicing.invoices.issue")?);
    }

    posted_with_status(&ctx, StatusCode::CREATED, invoice_id, &committed)
}

async fn list_invoices(ctx: RequestCtx, Query(q): Query<dto::InvoiceListQuery>) -> ApiResult {
    require(&ctx, "invoicing.read")?;
    let tenant_id = ctx.tenant_id();
    let today = today();
    let invoices = &ctx.services.read_models.invoices;
    let list = if q.overdue {
        invoices.overdue(tenant_id, today)
    } else if let Some(raw) = q.customer_id.as_deref() {
        let customer_id: AggregateId = parse_id(raw, "customer id")?;
        invoices
            .for_customer(tenant_id, customer_id)
            .into_iter()
            .filter(|i| q.status.is_none_or(|s| i.status == s))
            .collect()
    } else {
        invoices.list(tenant_id, q.status)
    };
    let views: Vec<InvoiceView> = list.into_iter().map(|i| InvoiceView::new(i, today)).collect();
    Ok(json(serde_json::json!({ "items": views })))
}

async fn receivables_summary(ctx: RequestCtx, Query(q): Query<dto::AsOfQuery>) -> ApiResult {
    require(&ctx, "invoicing.read")?;
    let today = q.today.unwrap_or_else(today);
    Ok(json(ctx.services.read_models.invoices.summary(ctx.tenant_id(), today)))
}

async fn get_invoice(ctx: RequestCtx, Path(id): Path<String>) -> ApiResult {
    require(&ctx, "invoicing.read")?;
    let invoice_id: InvoiceId = parse_id(&id, "invoice id")?;
    ctx.services
        .read_models
        .invoices
        .get(ctx.tenant_id(), &invoice_id)
        .map(|i| json(InvoiceView::new(i, today())))
        .ok_or_else(|| not_found(format!("invoice {invoice_id}")))
}

async fn revise_draft(
    ctx: RequestCtx,
    Path(id): Path<String>,
    Body(body): Body<dto::ReviseInvoiceRequest>,
) -> ApiResult {
    let invoice_id: InvoiceId = parse_id(&id, "invoice id")?;
    let cmd = InvoiceCommand::ReviseDraft(ReviseDraft {
        tenant_id: ctx.tenant_id(),
        invoice_id,
        due_date: body.due_date,
        items: body.items,
        occurred_at: Utc::now(),
    });
    let committed = dispatch_invoice(&ctx, invoice_id, cmd, "invoicing.invoices.create")?;
    Ok(accepted(invoice_id, &committed))
}

async fn issue_invoice(ctx: RequestCtx, Path(id): Path<String>) -> ApiResult {
    let invoice_id: InvoiceId = parse_id(&id, "invoice id")?;
    let cmd = InvoiceCommand::IssueInvoice(IssueInvoice {
        tenant_id: ctx.tenant_id(),
        invoice_id,
        occurred_at: Utc::now(),
    });
    dispatch_and_post(&ctx, invoice_id, cmd, "invoicing.invoices.issue")
}

async fn record_payment(
    ctx: RequestCtx,
    Path(id): Path<String>,
    Body(body): Body<dto::RecordPaymentRequest>,
) -> ApiResult {
    let invoice_id: InvoiceId = parse_id(&id, "invoice id")?;
    let cmd = InvoiceCommand::RecordPayment(RecordPayment {
        tenant_id: ctx.tenant_id(),
        invoice_id,
        amount: body.amount,
        mode: body.mode,
        reference: body.reference,
        paid_on: body.paid_on.unwrap_or_else(today),
        occurred_at: Utc::now(),
    });
    dispatch_and_post(&ctx, invoice_id, cmd, "invoicing.invoices.pay")
}

async fn cancel_invoice(
    ctx: RequestCtx,
    Path(id): Path<String>,
    body: Option<Body<dto::ReasonRequest>>,
) -> ApiResult {
    let invoice_id: InvoiceId = parse_id(&id, "invoice id")?;
    let cmd = InvoiceCommand::CancelInvoice(CancelInvoice {
        tenant_id: ctx.tenant_id(),
        invoice_id,
        reason: body.and_then(|Body(b)| b.reason),
        occurred_at: Utc::now(),
    });
    let committed = dispatch_invoice(&ctx, invoice_id, cmd, "invoicing.invoices.cancel")?;
    Ok(accepted(invoice_id, &committed))
}

/// Re-run voucher posting over the invoice's whole history. Vouchers that
/// already exist are left alone, so this only fills gaps left by a failed post.
async fn repost_invoice(ctx: RequestCtx, Path(id): Path<String>) -> ApiResult {
    require(&ctx, "accounting.vouchers.post")?;
    let invoice_id: InvoiceId = parse_id(&id, "invoice id")?;
    let history = ctx
        .services
        .dispatcher
        .store()
        .load_stream(ctx.tenant_id(), invoice_id.0)
        .map_err(store_error_to_response)?;
    if history.is_empty() {
        return Err(not_found(format!("invoice {invoice_id}")));
    }
    posted_response(&ctx, invoice_id, &history)
}
