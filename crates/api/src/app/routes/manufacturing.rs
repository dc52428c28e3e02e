use axum::extract::{Path, Query};
use axum::routing::{get, post};
use axum::Router;
use chrono::Utc;

use estateerp_infra::streams;
use estateerp_infra::workflows::complete_production;
use estateerp_inventory::{
    BillOfMaterial, BomCommand, BomComponent, BomId, CancelProduction, CreateBom, DeactivateBom,
    InventoryItem, InventoryItemId, PlanProduction, ProductionCommand, ProductionOrder,
    ProductionOrderId, ReviseBom, StartProduction,
};

use super::common::{accepted, authorized, created, items, json, parse_id, require};
use crate::app::dto::{self, Body};
use crate::app::errors::{
    ApiResult, dispatch_error_to_response, json_error, not_found, validation,
    workflow_error_to_response,
};
use crate::context::RequestCtx;

pub fn router() -> Router {
    Router::new()
        .route("/boms", post(create_bom).get(list_boms))
        .route("/boms/:id", get(get_bom).put(revise_bom))
        .route("/boms/:id/deactivate", post(deactivate_bom))
        .route("/orders", post(plan_production).get(list_orders))
        .route("/orders/:id", get(get_order))
        .route("/orders/:id/start", post(start_production))
        .route("/orders/:id/complete", post(finish_production))
        .route("/orders/:id/cancel", post(cancel_production))
}

/// Parse component ids and check each names an item of this tenant.
fn components(
    ctx: &RequestCtx,
    raw: Vec<dto::ComponentRequest>,
) -> Result<Vec<BomComponent>, axum::response::Response> {
    raw.into_iter()
        .map(|c| {
            let item_id: InventoryItemId = parse_id(&c.item_id, "component item id")?;
            ensure_item(ctx, item_id)?;
            Ok(BomComponent {
                item_id,
                quantity: c.quantity,
            })
        })
        .collect()
}

fn ensure_item(ctx: &RequestCtx, item_id: InventoryItemId) -> Result<(), axum::response::Response> {
    let item: InventoryItem = ctx
        .services
        .load(ctx.tenant_id(), item_id.0, |_, id| InventoryItem::empty(InventoryItemId::new(id)))
        .map_err(dispatch_error_to_response)?;
    if item.tenant_id().is_none() {
        return Err(validation(format!("unknown item {item_id}")));
    }
    Ok(())
}

fn dispatch_bom(ctx: &RequestCtx, bom_id: BomId, cmd: BomCommand, permission: &'static str) -> ApiResult {
    let cmd = authorized(ctx, cmd, permission)?;
    let committed = ctx
        .services
        .dispatch::<BillOfMaterial>(ctx.tenant_id(), bom_id.0, streams::BOM, cmd, |_, id| {
            BillOfMaterial::empty(BomId::new(id))
        })
        .map_err(dispatch_error_to_response)?;
    Ok(accepted(bom_id, &committed))
}

fn dispatch_order(
    ctx: &RequestCtx,
    order_id: ProductionOrderId,
    cmd: ProductionCommand,
    permission: &'static str,
) -> ApiResult {
    let cmd = authorized(ctx, cmd, permission)?;
    let committed = ctx
        .services
        .dispatch::<ProductionOrder>(ctx.tenant_id(), order_id.0, streams::PRODUCTION_ORDER, cmd, |_, id| {
            ProductionOrder::empty(ProductionOrderId::new(id))
        })
        .map_err(dispatch_error_to_response)?;
    Ok(accepted(order_id, &committed))
}

async fn create_bom(ctx: RequestCtx, Body(body): Body<dto::CreateBomRequest>) -> ApiResult {
    require(&ctx, "manufacturing.boms.create")?;
    let tenant_id = ctx.tenant_id();
    let finished_item: InventoryItemId = parse_id(&body.finished_item, "finished item id")?;
    ensure_item(&ctx, finished_item)?;
    let components = components(&ctx, body.components)?;

    let bom_id = BomId::generate();
    let cmd = authorized(
        &ctx,
        BomCommand::CreateBom(CreateBom {
            tenant_id,
            bom_id,
            name: body.name,
            finished_item,
            output_quantity: body.output_quantity,
            components,
            occurred_at: Utc::now(),
        }),
        "manufacturing.boms.create",
    )?;
    let committed = ctx
        .services
        .dispatch::<BillOfMaterial>(tenant_id, bom_id.0, streams::BOM, cmd, |_, id| {
            BillOfMaterial::empty(BomId::new(id))
        })
        .map_err(dispatch_error_to_response)?;
    Ok(created(bom_id, &committed))
}

async fn list_boms(ctx: RequestCtx, Query(q): Query<dto::BomListQuery>) -> ApiResult {
    require(&ctx, "manufacturing.read")?;
    Ok(items(ctx.services.read_models.manufacturing.boms(ctx.tenant_id(), q.active_only)))
}

async fn get_bom(ctx: RequestCtx, Path(id): Path<String>) -> ApiResult {
    require(&ctx, "manufacturing.read")?;
    let bom_id: BomId = parse_id(&id, "bom id")?;
    ctx.services
        .read_models
        .manufacturing
        .bom(ctx.tenant_id(), &bom_id)
        .map(json)
        .ok_or_else(|| not_found(format!("bill of material {bom_id}")))
}

async fn revise_bom(
    ctx: RequestCtx,
    Path(id): Path<String>,
    Body(body): Body<dto::ReviseBomRequest>,
) -> ApiResult {
    require(&ctx, "manufacturing.boms.update")?;
    let bom_id: BomId = parse_id(&id, "bom id")?;
    let components = components(&ctx, body.components)?;
    let cmd = BomCommand::ReviseBom(ReviseBom {
        tenant_id: ctx.tenant_id(),
        bom_id,
        output_quantity: body.output_quantity,
        components,
        occurred_at: Utc::now(),
    });
    dispatch_bom(&ctx, bom_id, cmd, "manufacturing.boms.update")
}

async fn deactivate_bom(ctx: RequestCtx, Path(id): Path<String>) -> ApiResult {
    let bom_id: BomId = parse_id(&id, "bom id")?;
    let cmd = BomCommand::DeactivateBom(DeactivateBom {
        tenant_id: ctx.tenant_id(),
        bom_id,
        occurred_at: Utc::now(),
    });
    dispatch_bom(&ctx, bom_id, cmd, "manufacturing.boms.update")
}

/// Plan against the current revision of an active BOM.
async fn plan_production(ctx: RequestCtx, Body(body): Body<dto::PlanProductionRequest>) -> ApiResult {
    require(&ctx, "manufacturing.orders.plan")?;
    let tenant_id = ctx.tenant_id();
    let bom_id: BomId = parse_id(&body.bom_id, "bom id")?;
    let bom: BillOfMaterial = ctx
        .services
        .load(tenant_id, bom_id.0, |_, id| BillOfMaterial::empty(BomId::new(id)))
        .map_err(dispatch_error_to_response)?;
    let finished_item = bom
        .finished_item()
        .ok_or_else(|| not_found(format!("bill of material {bom_id}")))?;
    if !bom.is_active() {
        return Err(json_error(
            axum::http::StatusCode::UNPROCESSABLE_ENTITY,
            "invariant_violation",
            format!("bill of material {bom_id} is inactive"),
        ));
    }

    let order_id = ProductionOrderId::generate();
    let cmd = authorized(
        &ctx,
        ProductionCommand::PlanProduction(PlanProduction {
            tenant_id,
            order_id,
            bom_id,
            bom_revision: bom.revision(),
            finished_item,
            output_quantity: bom.output_quantity(),
            components: bom.components().to_vec(),
            quantity: body.quantity,
            warehouse: body.warehouse,
            occurred_at: Utc::now(),
        }),
        "manufacturing.orders.plan",
    )?;
    let committed = ctx
        .services
        .dispatch::<ProductionOrder>(tenant_id, order_id.0, streams::PRODUCTION_ORDER, cmd, |_, id| {
            ProductionOrder::empty(ProductionOrderId::new(id))
        })
        .map_err(dispatch_error_to_response)?;
    Ok(created(order_id, &committed))
}

async fn list_orders(ctx: RequestCtx, Query(q): Query<dto::OrderListQuery>) -> ApiResult {
    require(&ctx, "manufacturing.read")?;
    Ok(items(ctx.services.read_models.manufacturing.orders(ctx.tenant_id(), q.status)))
}

async fn get_order(ctx: RequestCtx, Path(id): Path<String>) -> ApiResult {
    require(&ctx, "manufacturing.read")?;
    let order_id: ProductionOrderId = parse_id(&id, "order id")?;
    ctx.services
        .read_models
        .manufacturing
        .order(ctx.tenant_id(), &order_id)
        .map(json)
        .ok_or_else(|| not_found(format!("production order {order_id}")))
}

async fn start_production(ctx: RequestCtx, Path(id): Path<String>) -> ApiResult {
    let order_id: ProductionOrderId = parse_id(&id, "order id")?;
    let cmd = ProductionCommand::StartProduction(StartProduction {
        tenant_id: ctx.tenant_id(),
        order_id,
        occurred_at: Utc::now(),
    });
    dispatch_order(&ctx, order_id, cmd, "manufacturing.orders.run")
}

/// Consume components and receive the finished good, then complete the order.
async fn finish_production(
    ctx: RequestCtx,
    Path(id): Path<String>,
    Body(body): Body<dto::CompleteProductionRequest>,
) -> ApiResult {
    require(&ctx, "manufacturing.orders.run")?;
    require(&ctx, "inventory.stock.move")?;
    let order_id: ProductionOrderId = parse_id(&id, "order id")?;
    let committed = complete_production(
        &ctx.services.dispatcher,
        ctx.tenant_id(),
        order_id,
        body.produced_quantity,
        body.batch,
    )
    .map_err(workflow_error_to_response)?;
    Ok(accepted(order_id, &committed))
}

async fn cancel_production(
    ctx: RequestCtx,
    Path(id): Path<String>,
    body: Option<Body<dto::ReasonRequest>>,
) -> ApiResult {
    let order_id: ProductionOrderId = parse_id(&id, "order id")?;
    let cmd = ProductionCommand::CancelProduction(CancelProduction {
        tenant_id: ctx.tenant_id(),
        order_id,
        reason: body.and_then(|Body(b)| b.reason),
        occurred_at: Utc::now(),
    });
    dispatch_order(&ctx, order_id, cmd, "manufacturing.orders.run")
}
