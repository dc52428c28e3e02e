use axum::extract::{Path, Query};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::Router;
use chrono::Utc;

use estateerp_crm::{
    AddFollowUp, AssignLead, CaptureLead, ChangeLeadStatus, ConvertLead, Customer, CustomerCommand,
    CustomerDetails, CustomerId, DeactivateCustomer, Lead, LeadCommand, LeadId, LeadStatus,
    RegisterCustomer, UpdateCustomer,
};
use estateerp_infra::event_store::StoredEvent;
use estateerp_infra::streams;

use super::common::{accepted, authorized, created, items, json, parse_id, require, today};
use crate::app::dto::{self, Body};
use crate::app::errors::{ApiResult, dispatch_error_to_response, json_error, not_found};
use crate::context::RequestCtx;

pub fn router() -> Router {
    Router::new()
        .route("/customers", post(register_customer).get(list_customers))
        .route("/customers/:id", get(get_customer).put(update_customer))
        .route("/customers/:id/deactivate", post(deactivate_customer))
        .route("/leads", post(capture_lead).get(list_leads))
        .route("/leads/follow-ups", get(due_follow_ups))
        .route("/leads/:id", get(get_lead))
        .route("/leads/:id/status", post(change_lead_status))
        .route("/leads/:id/assign", post(assign_lead))
        .route("/leads/:id/follow-ups", post(add_follow_up))
        .route("/leads/:id/convert", post(convert_lead))
}

fn register(
    ctx: &RequestCtx,
    details: CustomerDetails,
) -> Result<(CustomerId, Vec<StoredEvent>), axum::response::Response> {
    let tenant_id = ctx.tenant_id();
    let customer_id = CustomerId::generate();
    let cmd = authorized(
        ctx,
        CustomerCommand::RegisterCustomer(RegisterCustomer {
            tenant_id,
            customer_id,
            details,
            occurred_at: Utc::now(),
        }),
        "crm.customers.create",
    )?;
    let committed = ctx
        .services
        .dispatch::<Customer>(tenant_id, customer_id.0, streams::CUSTOMER, cmd, |_, id| {
            Customer::empty(CustomerId::new(id))
        })
        .map_err(dispatch_error_to_response)?;
    Ok((customer_id, committed))
}

async fn register_customer(ctx: RequestCtx, Body(body): Body<dto::CustomerRequest>) -> ApiResult {
    let (customer_id, committed) = register(&ctx, body.into())?;
    Ok(created(customer_id, &committed))
}

async fn list_customers(ctx: RequestCtx) -> ApiResult {
    require(&ctx, "crm.read")?;
    Ok(items(ctx.services.read_models.customers.list(ctx.tenant_id())))
}

async fn get_customer(ctx: RequestCtx, Path(id): Path<String>) -> ApiResult {
    require(&ctx, "crm.read")?;
    let customer_id: CustomerId = parse_id(&id, "customer id")?;
    let customer = ctx
        .services
        .read_models
        .customers
        .get(ctx.tenant_id(), &customer_id)
        .ok_or_else(|| not_found(format!("customer {customer_id}")))?;
    let invoices = ctx.services.read_models.invoices.for_customer(ctx.tenant_id(), customer_id.0);
    Ok(json(serde_json::json!({ "customer": customer, "invoices": invoices })))
}

async fn update_customer(
    ctx: RequestCtx,
    Path(id): Path<String>,
    Body(body): Body<dto::CustomerRequest>,
) -> ApiResult {
    let tenant_id = ctx.tenant_id();
    let customer_id: CustomerId = parse_id(&id, "customer id")?;
    let cmd = authorized(
        &ctx,
        CustomerCommand::UpdateCustomer(UpdateCustomer {
            tenant_id,
            customer_id,
            details: body.into(),
            occurred_at: Utc::now(),
        }),
        "crm.customers.update",
    )?;
    let committed = ctx
        .services
        .dispatch::<Customer>(tenant_id, customer_id.0, streams::CUSTOMER, cmd, |_, id| {
            Customer::empty(CustomerId::new(id))
        })
        .map_err(dispatch_error_to_response)?;
    Ok(accepted(customer_id, &committed))
}

async fn deactivate_customer(ctx: RequestCtx, Path(id): Path<String>) -> ApiResult {
    let tenant_id = ctx.tenant_id();
    let customer_id: CustomerId = parse_id(&id, "customer id")?;
    let cmd = authorized(
        &ctx,
        CustomerCommand::DeactivateCustomer(DeactivateCustomer {
            tenant_id,
            customer_id,
            occurred_at: Utc::now(),
        }),
        "crm.customers.update",
    )?;
    let committed = ctx
        .services
        .dispatch::<Customer>(tenant_id, customer_id.0, streams::CUSTOMER, cmd, |_, id| {
            Customer::empty(CustomerId::new(id))
        })
        .map_err(dispatch_error_to_response)?;
    Ok(accepted(customer_id, &committed))
}

fn dispatch_lead(ctx: &RequestCtx, lead_id: LeadId, cmd: LeadCommand, permission: &'static str) -> ApiResult {
    let cmd = authorized(ctx, cmd, permission)?;
    let committed = ctx
        .services
        .dispatch::<Lead>(ctx.tenant_id(), lead_id.0, streams::LEAD, cmd, |_, id| Lead::empty(LeadId::new(id)))
        .map_err(dispatch_error_to_response)?;
    Ok(accepted(lead_id, &committed))
}

async fn capture_lead(ctx: RequestCtx, Body(body): Body<dto::CaptureLeadRequest>) -> ApiResult {
    let tenant_id = ctx.tenant_id();
    let lead_id = LeadId::generate();
    let cmd = authorized(
        &ctx,
        LeadCommand::CaptureLead(CaptureLead {
            tenant_id,
            lead_id,
            name: body.name,
            phone: body.phone,
            email: body.email,
            source: body.source,
            interest: body.interest,
            budget: body.budget,
            status: None,
            occurred_at: Utc::now(),
        }),
        "crm.leads.create",
    )?;
    let committed = ctx
        .services
        .dispatch::<Lead>(tenant_id, lead_id.0, streams::LEAD, cmd, |_, id| Lead::empty(LeadId::new(id)))
        .map_err(dispatch_error_to_response)?;
    Ok(created(lead_id, &committed))
}

async fn list_leads(ctx: RequestCtx, Query(q): Query<dto::LeadListQuery>) -> ApiResult {
    require(&ctx, "crm.read")?;
    Ok(items(ctx.services.read_models.leads.list(ctx.tenant_id(), q.status)))
}

async fn due_follow_ups(ctx: RequestCtx, Query(q): Query<dto::FollowUpQuery>) -> ApiResult {
    require(&ctx, "crm.read")?;
    let on = q.on.unwrap_or_else(today);
    Ok(items(ctx.services.read_models.leads.due_follow_ups(ctx.tenant_id(), on)))
}

async fn get_lead(ctx: RequestCtx, Path(id): Path<String>) -> ApiResult {
    require(&ctx, "crm.read")?;
    let lead_id: LeadId = parse_id(&id, "lead id")?;
    ctx.services
        .read_models
        .leads
        .get(ctx.tenant_id(), &lead_id)
        .map(json)
        .ok_or_else(|| not_found(format!("lead {lead_id}")))
}

async fn change_lead_status(
    ctx: RequestCtx,
    Path(id): Path<String>,
    Body(body): Body<dto::ChangeLeadStatusRequest>,
) -> ApiResult {
    let lead_id: LeadId = parse_id(&id, "lead id")?;
    let cmd = LeadCommand::ChangeLeadStatus(ChangeLeadStatus {
        tenant_id: ctx.tenant_id(),
        lead_id,
        status: body.status,
        note: body.note,
        occurred_at: Utc::now(),
    });
    dispatch_lead(&ctx, lead_id, cmd, "crm.leads.update")
}

async fn assign_lead(
    ctx: RequestCtx,
    Path(id): Path<String>,
    Body(body): Body<dto::AssignLeadRequest>,
) -> ApiResult {
    let lead_id: LeadId = parse_id(&id, "lead id")?;
    let cmd = LeadCommand::AssignLead(AssignLead {
        tenant_id: ctx.tenant_id(),
        lead_id,
        agent: body.agent,
        occurred_at: Utc::now(),
    });
    dispatch_lead(&ctx, lead_id, cmd, "crm.leads.update")
}

async fn add_follow_up(
    ctx: RequestCtx,
    Path(id): Path<String>,
    Body(body): Body<dto::AddFollowUpRequest>,
) -> ApiResult {
    let lead_id: LeadId = parse_id(&id, "lead id")?;
    let cmd = LeadCommand::AddFollowUp(AddFollowUp {
        tenant_id: ctx.tenant_id(),
        lead_id,
        note: body.note,
        next_follow_up: body.next_follow_up,
        occurred_at: Utc::now(),
    });
    dispatch_lead(&ctx, lead_id, cmd, "crm.leads.update")
}

/// Link a lead in negotiation to a customer, registering the customer from the
/// lead's contact details when no id is given.
async fn convert_lead(
    ctx: RequestCtx,
    Path(id): Path<String>,
    body: Option<Body<dto::ConvertLeadRequest>>,
) -> ApiResult {
    let tenant_id = ctx.tenant_id();
    let lead_id: LeadId = parse_id(&id, "lead id")?;
    let body = body.map(|Body(b)| b).unwrap_or_default();

    let lead: Lead = ctx
        .services
        .load(tenant_id, lead_id.0, |_, id| Lead::empty(LeadId::new(id)))
        .map_err(dispatch_error_to_response)?;
    if lead.tenant_id().is_none() {
        return Err(not_found(format!("lead {lead_id}")));
    }
    if lead.status() != LeadStatus::Negotiation {
        return Err(json_error(
            StatusCode::UNPROCESSABLE_ENTITY,
            "invariant_violation",
            format!("only a lead in negotiation can be converted (lead is {})", lead.status().as_str()),
        ));
    }

    let customer_id = match body.customer_id {
        Some(raw) => parse_id::<CustomerId>(&raw, "customer id")?,
        None => register(
            &ctx,
            CustomerDetails {
                name: lead.name().to_string(),
                email: lead.email().map(str::to_string),
                phone: lead.phone().map(str::to_string),
                gstin: body.gstin,
                address: body.address,
                state: body.state,
            },
        )?
        .0,
    };

    let cmd = LeadCommand::ConvertLead(ConvertLead {
        tenant_id,
        lead_id,
        customer_id,
        occurred_at: Utc::now(),
    });
    let cmd = authorized(&ctx, cmd, "crm.leads.update")?;
    let committed = ctx
        .services
        .dispatch::<Lead>(tenant_id, lead_id.0, streams::LEAD, cmd, |_, id| Lead::empty(LeadId::new(id)))
        .map_err(dispatch_error_to_response)?;
    Ok(json(serde_json::json!({
        "id": lead_id.to_string(),
        "customer_id": customer_id.to_string(),
        "events_committed": committed.len(),
    })))
}
