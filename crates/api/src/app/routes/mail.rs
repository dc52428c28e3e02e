use axum::routing::{get, post};
use axum::Router;

use estateerp_infra::workflows::{Broadcast, send_broadcast, send_payment_reminders};

use super::common::{items, json, require, today};
use crate::app::dto::{self, Body};
use crate::app::errors::{ApiResult, workflow_error_to_response};
use crate::context::RequestCtx;

pub fn router() -> Router {
    Router::new()
        .route("/broadcast", post(broadcast))
        .route("/reminders", post(reminders))
        .route("/outbox", get(outbox))
}

async fn broadcast(ctx: RequestCtx, Body(body): Body<Broadcast>) -> ApiResult {
    require(&ctx, "mail.broadcast.send")?;
    let services = &ctx.services;
    let report = send_broadcast(
        &services.read_models.leads,
        &services.read_models.customers,
        services.mailer.as_ref(),
        &services.config.mail_from,
        ctx.tenant_id(),
        &body,
    )
    .map_err(workflow_error_to_response)?;
    Ok(json(report))
}

/// Remind customers of overdue invoices. The body is optional.
async fn reminders(ctx: RequestCtx, body: Option<Body<dto::RemindersRequest>>) -> ApiResult {
    require(&ctx, "mail.reminders.send")?;
    require(&ctx, "invoicing.read")?;
    let body = body.map(|Body(b)| b).unwrap_or_default();
    let services = &ctx.services;
    let report = send_payment_reminders(
        &services.read_models.invoices,
        &services.read_models.customers,
        services.mailer.as_ref(),
        &services.config.mail_from,
        ctx.tenant_id(),
        body.today.unwrap_or_else(today),
        body.grace_days.unwrap_or(services.config.reminder_grace_days),
    )
    .map_err(workflow_error_to_response)?;
    Ok(json(report))
}

async fn outbox(ctx: RequestCtx) -> ApiResult {
    require(&ctx, "mail.read")?;
    Ok(items(ctx.services.mailer.outbox(ctx.tenant_id())))
}
