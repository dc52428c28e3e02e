use axum::extract::{Path, Query};
use axum::routing::{get, post};
use axum::Router;
use chrono::Utc;

use estateerp_infra::streams;
use estateerp_inventory::{
    CreateItem, InventoryCommand, InventoryItem, InventoryItemId, RecordMovement, TransferStock,
};

use super::common::{accepted, authorized, created, items, json, parse_id, require};
use crate::app::dto::{self, Body};
use crate::app::errors::{ApiResult, dispatch_error_to_response, not_found};
use crate::context::RequestCtx;

pub fn router() -> Router {
    Router::new()
        .route("/items", post(create_item).get(list_items))
        .route("/items/reorder", get(below_reorder))
        .route("/items/:id", get(get_item))
        .route("/items/:id/movements", post(record_movement).get(list_movements))
        .route("/items/:id/transfer", post(transfer_stock))
        .route("/stock", get(stock_levels))
}

fn dispatch_item(
    ctx: &RequestCtx,
    item_id: InventoryItemId,
    cmd: InventoryCommand,
    permission: &'static str,
) -> ApiResult {
    let cmd = authorized(ctx, cmd, permission)?;
    let committed = ctx
        .services
        .dispatch::<InventoryItem>(ctx.tenant_id(), item_id.0, streams::INVENTORY_ITEM, cmd, |_, id| {
            InventoryItem::empty(InventoryItemId::new(id))
        })
        .map_err(dispatch_error_to_response)?;
    Ok(accepted(item_id, &committed))
}

async fn create_item(ctx: RequestCtx, Body(body): Body<dto::CreateItemRequest>) -> ApiResult {
    let tenant_id = ctx.tenant_id();
    let item_id = InventoryItemId::generate();
    let cmd = authorized(
        &ctx,
        InventoryCommand::CreateItem(CreateItem {
            tenant_id,
            item_id,
            sku: body.sku,
            name: body.name,
            unit: body.unit,
            hsn: body.hsn,
            gst_rate: body.gst_rate,
            reorder_level: body.reorder_level,
            occurred_at: Utc::now(),
        }),
        "inventory.items.create",
    )?;
    let committed = ctx
        .services
        .dispatch::<InventoryItem>(tenant_id, item_id.0, streams::INVENTORY_ITEM, cmd, |_, id| {
            InventoryItem::empty(InventoryItemId::new(id))
        })
        .map_err(dispatch_error_to_response)?;
    Ok(created(item_id, &committed))
}

async fn list_items(ctx: RequestCtx) -> ApiResult {
    require(&ctx, "inventory.read")?;
    Ok(items(ctx.services.read_models.stock.items(ctx.tenant_id())))
}

/// Items whose total stock is at or below their reorder level.
async fn below_reorder(ctx: RequestCtx) -> ApiResult {
    require(&ctx, "inventory.read")?;
    Ok(items(ctx.services.read_models.stock.below_reorder(ctx.tenant_id())))
}

async fn get_item(ctx: RequestCtx, Path(id): Path<String>) -> ApiResult {
    require(&ctx, "inventory.read")?;
    let item_id: InventoryItemId = parse_id(&id, "item id")?;
    let stock = &ctx.services.read_models.stock;
    let item = stock
        .item(ctx.tenant_id(), &item_id)
        .ok_or_else(|| not_found(format!("item {item_id}")))?;
    let levels = stock.levels(ctx.tenant_id(), Some(item_id), None);
    Ok(json(serde_json::json!({ "item": item, "stock": levels })))
}

async fn record_movement(
    ctx: RequestCtx,
    Path(id): Path<String>,
    Body(body): Body<dto::MovementRequest>,
) -> ApiResult {
    let item_id: InventoryItemId = parse_id(&id, "item id")?;
    let cmd = InventoryCommand::RecordMovement(RecordMovement {
        tenant_id: ctx.tenant_id(),
        item_id,
        direction: body.direction,
        warehouse: body.warehouse,
        batch: body.batch,
        quantity: body.quantity,
        reference: body.reference,
        reason: body.reason,
        occurred_at: Utc::now(),
    });
    dispatch_item(&ctx, item_id, cmd, "inventory.stock.move")
}

async fn list_movements(ctx: RequestCtx, Path(id): Path<String>) -> ApiResult {
    require(&ctx, "inventory.read")?;
    let item_id: InventoryItemId = parse_id(&id, "item id")?;
    Ok(items(ctx.services.read_models.stock.movements(ctx.tenant_id(), &item_id)))
}

async fn transfer_stock(
    ctx: RequestCtx,
    Path(id): Path<String>,
    Body(body): Body<dto::TransferRequest>,
) -> ApiResult {
    let item_id: InventoryItemId = parse_id(&id, "item id")?;
    let cmd = InventoryCommand::TransferStock(TransferStock {
        tenant_id: ctx.tenant_id(),
        item_id,
        from_warehouse: body.from_warehouse,
        to_warehouse: body.to_warehouse,
        batch: body.batch,
        quantity: body.quantity,
        occurred_at: Utc::now(),
    });
    dispatch_item(&ctx, item_id, cmd, "inventory.stock.move")
}

async fn stock_levels(ctx: RequestCtx, Query(q): Query<dto::StockQuery>) -> ApiResult {
    require(&ctx, "inventory.read")?;
    let item_id = q
        .item_id
        .as_deref()
        .map(|raw| parse_id::<InventoryItemId>(raw, "item id"))
        .transpose()?;
    Ok(items(ctx.services.read_models.stock.levels(
        ctx.tenant_id(),
        item_id,
        q.warehouse.as_deref(),
    )))
}
