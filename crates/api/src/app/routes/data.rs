use axum::extract::Query;
use axum::routing::{get, post};
use axum::Router;

use estateerp_infra::data::{
    BackupDocument, EventLogFilter, export_event_log, export_leads, export_tenant, import_leads,
    restore_tenant,
};
use estateerp_infra::event_store::EventStore;

use super::common::{csv_body, json, require};
use crate::app::dto::{self, Body};
use crate::app::errors::{ApiResult, data_error_to_response, store_error_to_response};
use crate::context::RequestCtx;

pub fn router() -> Router {
    Router::new()
        .route("/backup", get(backup))
        .route("/restore", post(restore))
        .route("/leads.csv", get(leads_csv).post(import_leads_csv))
        .route("/events.csv", get(events_csv))
}

/// Every event of the caller's tenant, in commit order.
async fn backup(ctx: RequestCtx) -> ApiResult {
    require(&ctx, "data.backup.export")?;
    let document = export_tenant(ctx.services.dispatcher.store(), ctx.tenant_id())
        .map_err(data_error_to_response)?;
    Ok(json(document))
}

async fn restore(ctx: RequestCtx, Body(document): Body<BackupDocument>) -> ApiResult {
    require(&ctx, "data.backup.restore")?;
    let report = restore_tenant(&ctx.services.dispatcher, ctx.tenant_id(), &document)
        .map_err(data_error_to_response)?;
    Ok(json(report))
}

async fn leads_csv(ctx: RequestCtx) -> ApiResult {
    require(&ctx, "crm.read")?;
    let leads = ctx.services.read_models.leads.list(ctx.tenant_id(), None);
    let text = export_leads(&leads).map_err(data_error_to_response)?;
    Ok(csv_body(text))
}

/// Duplicates are checked against the leads the read model already holds.
async fn import_leads_csv(ctx: RequestCtx, text: String) -> ApiResult {
    require(&ctx, "data.leads.import")?;
    require(&ctx, "crm.leads.create")?;
    let existing = ctx.services.read_models.leads.list(ctx.tenant_id(), None);
    let report = import_leads(&ctx.services.dispatcher, ctx.tenant_id(), &existing, &text)
        .map_err(data_error_to_response)?;
    Ok(json(report))
}

async fn events_csv(ctx: RequestCtx, Query(q): Query<dto::EventLogQuery>) -> ApiResult {
    require(&ctx, "data.events.export")?;
    let events = ctx
        .services
        .dispatcher
        .store()
        .load_tenant(ctx.tenant_id())
        .map_err(store_error_to_response)?;
    let filter = EventLogFilter {
        aggregate_type: q.aggregate_type,
        from: q.from,
        to: q.to,
    };
    let text = export_event_log(&events, &filter).map_err(data_error_to_response)?;
    Ok(csv_body(text))
}
