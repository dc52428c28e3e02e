use axum::extract::{Path, Query};
use axum::routing::{get, post};
use axum::Router;
use chrono::Utc;

use estateerp_crm::{Customer, CustomerId};
use estateerp_property::{
    BookProperty, CancelBooking, ChangeProjectPhase, CreateProject, HoldProperty, ListProperty,
    Project, ProjectCommand, ProjectId, Property, PropertyCommand, PropertyId, RegisterSale,
    ReleaseProperty,
};
use estateerp_infra::streams;

use super::common::{accepted, authorized, created, items, json, parse_id, require, today};
use crate::app::dto::{self, Body};
use crate::app::errors::{ApiResult, dispatch_error_to_response, not_found};
use crate::context::RequestCtx;

pub fn router() -> Router {
    Router::new()
        .route("/projects", post(create_project).get(list_projects))
        .route("/projects/:id", get(get_project))
        .route("/projects/:id/phase", post(change_phase))
        .route("/units", post(list_unit).get(list_units))
        .route("/units/:id", get(get_unit))
        .route("/units/:id/hold", post(hold_unit))
        .route("/units/:id/release", post(release_unit))
        .route("/units/:id/book", post(book_unit))
        .route("/units/:id/cancel-booking", post(cancel_booking))
        .route("/units/:id/register-sale", post(register_sale))
}

fn dispatch_unit(
    ctx: &RequestCtx,
    property_id: PropertyId,
    cmd: PropertyCommand,
    permission: &'static str,
) -> ApiResult {
    let cmd = authorized(ctx, cmd, permission)?;
    let committed = ctx
        .services
        .dispatch::<Property>(ctx.tenant_id(), property_id.0, streams::PROPERTY, cmd, |_, id| {
            Property::empty(PropertyId::new(id))
        })
        .map_err(dispatch_error_to_response)?;
    Ok(accepted(property_id, &committed))
}

async fn create_project(ctx: RequestCtx, Body(body): Body<dto::CreateProjectRequest>) -> ApiResult {
    let tenant_id = ctx.tenant_id();
    let project_id = ProjectId::generate();
    let cmd = authorized(
        &ctx,
        ProjectCommand::CreateProject(CreateProject {
            tenant_id,
            project_id,
            code: body.code,
            name: body.name,
            location: body.location,
            state: body.state,
            launch_date: body.launch_date,
            occurred_at: Utc::now(),
        }),
        "property.projects.create",
    )?;
    let committed = ctx
        .services
        .dispatch::<Project>(tenant_id, project_id.0, streams::PROJECT, cmd, |_, id| {
            Project::empty(ProjectId::new(id))
        })
        .map_err(dispatch_error_to_response)?;
    Ok(created(project_id, &committed))
}

async fn list_projects(ctx: RequestCtx) -> ApiResult {
    require(&ctx, "property.read")?;
    Ok(items(ctx.services.read_models.properties.projects(ctx.tenant_id())))
}

/// The project with its unit inventory by status.
async fn get_project(ctx: RequestCtx, Path(id): Path<String>) -> ApiResult {
    require(&ctx, "property.read")?;
    let project_id: ProjectId = parse_id(&id, "project id")?;
    let properties = &ctx.services.read_models.properties;
    let project = properties
        .project(ctx.tenant_id(), &project_id)
        .ok_or_else(|| not_found(format!("project {project_id}")))?;
    let summary = properties.summary(ctx.tenant_id(), project_id);
    Ok(json(serde_json::json!({ "project": project, "inventory": summary })))
}

async fn change_phase(
    ctx: RequestCtx,
    Path(id): Path<String>,
    Body(body): Body<dto::ChangePhaseRequest>,
) -> ApiResult {
    let tenant_id = ctx.tenant_id();
    let project_id: ProjectId = parse_id(&id, "project id")?;
    let cmd = authorized(
        &ctx,
        ProjectCommand::ChangeProjectPhase(ChangeProjectPhase {
            tenant_id,
            project_id,
            phase: body.phase,
            occurred_at: Utc::now(),
        }),
        "property.projects.update",
    )?;
    let committed = ctx
        .services
        .dispatch::<Project>(tenant_id, project_id.0, streams::PROJECT, cmd, |_, id| {
            Project::empty(ProjectId::new(id))
        })
        .map_err(dispatch_error_to_response)?;
    Ok(accepted(project_id, &committed))
}

async fn list_unit(ctx: RequestCtx, Body(body): Body<dto::ListUnitRequest>) -> ApiResult {
    let tenant_id = ctx.tenant_id();
    let project_id: ProjectId = parse_id(&body.project_id, "project id")?;
    let project: Project = ctx
        .services
        .load(tenant_id, project_id.0, |_, id| Project::empty(ProjectId::new(id)))
        .map_err(dispatch_error_to_response)?;
    if project.tenant_id().is_none() {
        return Err(not_found(format!("project {project_id}")));
    }

    let property_id = PropertyId::generate();
    let cmd = authorized(
        &ctx,
        PropertyCommand::ListProperty(ListProperty {
            tenant_id,
            property_id,
            project_id,
            unit_no: body.unit_no,
            kind: body.kind,
            floor: body.floor,
            area_sqft: body.area_sqft,
            rate_per_sqft: body.rate_per_sqft,
            occurred_at: Utc::now(),
        }),
        "property.units.create",
    )?;
    let committed = ctx
        .services
        .dispatch::<Property>(tenant_id, property_id.0, streams::PROPERTY, cmd, |_, id| {
            Property::empty(PropertyId::new(id))
        })
        .map_err(dispatch_error_to_response)?;
    Ok(created(property_id, &committed))
}

async fn list_units(ctx: RequestCtx, Query(q): Query<dto::UnitListQuery>) -> ApiResult {
    require(&ctx, "property.read")?;
    let project_id = q
        .project_id
        .as_deref()
        .map(|raw| parse_id::<ProjectId>(raw, "project id"))
        .transpose()?;
    Ok(items(ctx.services.read_models.properties.units(ctx.tenant_id(), project_id, q.status)))
}

async fn get_unit(ctx: RequestCtx, Path(id): Path<String>) -> ApiResult {
    require(&ctx, "property.read")?;
    let property_id: PropertyId = parse_id(&id, "unit id")?;
    ctx.services
        .read_models
        .properties
        .unit(ctx.tenant_id(), &property_id)
        .map(json)
        .ok_or_else(|| not_found(format!("unit {property_id}")))
}

async fn hold_unit(
    ctx: RequestCtx,
    Path(id): Path<String>,
    body: Option<Body<dto::ReasonRequest>>,
) -> ApiResult {
    let property_id: PropertyId = parse_id(&id, "unit id")?;
    let reason = body.and_then(|Body(b)| b.reason);
    let cmd = PropertyCommand::HoldProperty(HoldProperty {
        tenant_id: ctx.tenant_id(),
        property_id,
        reason,
        occurred_at: Utc::now(),
    });
    dispatch_unit(&ctx, property_id, cmd, "property.units.update")
}

async fn release_unit(ctx: RequestCtx, Path(id): Path<String>) -> ApiResult {
    let property_id: PropertyId = parse_id(&id, "unit id")?;
    let cmd = PropertyCommand::ReleaseProperty(ReleaseProperty {
        tenant_id: ctx.tenant_id(),
        property_id,
        occurred_at: Utc::now(),
    });
    dispatch_unit(&ctx, property_id, cmd, "property.units.update")
}

/// Book for an existing, active customer. The agreed price defaults to the
/// list price (area × rate).
async fn book_unit(
    ctx: RequestCtx,
    Path(id): Path<String>,
    Body(body): Body<dto::BookUnitRequest>,
) -> ApiResult {
    let tenant_id = ctx.tenant_id();
    let property_id: PropertyId = parse_id(&id, "unit id")?;
    let customer_id: CustomerId = parse_id(&body.customer_id, "customer id")?;

    let customer: Customer = ctx
        .services
        .load(tenant_id, customer_id.0, |_, id| Customer::empty(CustomerId::new(id)))
        .map_err(dispatch_error_to_response)?;
    if customer.tenant_id().is_none() {
        return Err(not_found(format!("customer {customer_id}")));
    }
    if !customer.is_active() {
        return Err(crate::app::errors::validation(format!(
            "customer {customer_id} is deactivated"
        )));
    }

    let agreed_price = match body.agreed_price {
        Some(price) => price,
        None => {
            let unit: Property = ctx
                .services
                .load(tenant_id, property_id.0, |_, id| Property::empty(PropertyId::new(id)))
                .map_err(dispatch_error_to_response)?;
            unit.list_price()
        }
    };

    let cmd = PropertyCommand::BookProperty(BookProperty {
        tenant_id,
        property_id,
        customer_id,
        agreed_price,
        booking_amount: body.booking_amount,
        booked_on: body.booked_on.unwrap_or_else(today),
        occurred_at: Utc::now(),
    });
    dispatch_unit(&ctx, property_id, cmd, "property.units.book")
}

async fn cancel_booking(
    ctx: RequestCtx,
    Path(id): Path<String>,
    body: Option<Body<dto::ReasonRequest>>,
) -> ApiResult {
    let property_id: PropertyId = parse_id(&id, "unit id")?;
    let cmd = PropertyCommand::CancelBooking(CancelBooking {
        tenant_id: ctx.tenant_id(),
        property_id,
        reason: body.and_then(|Body(b)| b.reason),
        occurred_at: Utc::now(),
    });
    dispatch_unit(&ctx, property_id, cmd, "property.units.book")
}

async fn register_sale(
    ctx: RequestCtx,
    Path(id): Path<String>,
    Body(body): Body<dto::RegisterSaleRequest>,
) -> ApiResult {
    let property_id: PropertyId = parse_id(&id, "unit id")?;
    let cmd = PropertyCommand::RegisterSale(RegisterSale {
        tenant_id: ctx.tenant_id(),
        property_id,
        registered_on: body.registered_on.unwrap_or_else(today),
        registration_no: body.registration_no,
        occurred_at: Utc::now(),
    });
    dispatch_unit(&ctx, property_id, cmd, "property.units.sell")
}
