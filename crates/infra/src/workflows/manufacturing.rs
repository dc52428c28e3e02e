//! Production completion: consume components, receive the finished good, then
//! complete the order. Movements already made are reversed when a later step
//! fails.

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use tracing::{info, warn};

use estateerp_core::TenantId;
use estateerp_events::{EventBus, EventEnvelope};
use estateerp_inventory::{
    CompleteProduction, InventoryCommand, InventoryItem, InventoryItemId, MovementDirection,
    ProductionCommand, ProductionOrder, ProductionOrderId, ProductionStatus, RecordMovement,
    StockKey,
};

use super::WorkflowError;
use crate::command_dispatcher::{CommandDispatcher, DispatchError};
use crate::event_store::{EventStore, StoredEvent};
use crate::streams;

/// One movement made on behalf of an order, kept for compensation.
#[derive(Debug, Clone)]
struct Made {
    item_id: InventoryItemId,
    direction: MovementDirection,
    key: StockKey,
    quantity: i64,
}

fn load_item<S, B>(
    dispatcher: &CommandDispatcher<S, B>,
    tenant_id: TenantId,
    item_id: InventoryItemId,
) -> Result<InventoryItem, WorkflowError>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    let item: InventoryItem =
        dispatcher.load(tenant_id, item_id.0, |_, id| InventoryItem::empty(InventoryItemId::new(id)))?;
    if item.tenant_id().is_none() {
        return Err(WorkflowError::NotFound(format!("inventory item {item_id}")));
    }
    Ok(item)
}

/// Split `quantity` over the item's batches in `warehouse`, in batch order.
fn draw_from_batches(item: &InventoryItem, warehouse: &str, quantity: i64) -> Vec<(StockKey, i64)> {
    let mut remaining = quantity;
    let mut plan = Vec::new();
    for (key, available) in item.stock().iter().filter(|(k, _)| k.warehouse == warehouse) {
        if remaining == 0 {
            break;
        }
        let take = remaining.min(*available);
        if take > 0 {
            plan.push((key.clone(), take));
            remaining -= take;
        }
    }
    plan
}

fn move_stock<S, B>(
    dispatcher: &CommandDispatcher<S, B>,
    tenant_id: TenantId,
    movement: &Made,
    reference: &str,
    reason: &str,
    occurred_at: DateTime<Utc>,
) -> Result<Vec<StoredEvent>, DispatchError>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    dispatcher.dispatch::<InventoryItem>(
        tenant_id,
        movement.item_id.0,
        streams::INVENTORY_ITEM,
        InventoryCommand::RecordMovement(RecordMovement {
            tenant_id,
            item_id: movement.item_id,
            direction: movement.direction,
            warehouse: movement.key.warehouse.clone(),
            batch: Some(movement.key.batch.clone()),
            quantity: movement.quantity,
            reference: Some(reference.to_string()),
            reason: Some(reason.to_string()),
            occurred_at,
        }),
        |_, id| InventoryItem::empty(InventoryItemId::new(id)),
    )
}

fn compensate<S, B>(
    dispatcher: &CommandDispatcher<S, B>,
    tenant_id: TenantId,
    order_id: ProductionOrderId,
    made: &[Made],
) where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    let reference = format!("production:{order_id}");
    for m in made.iter().rev() {
        let reversal = Made {
            direction: m.direction.reverse(),
            ..m.clone()
        };
        if let Err(err) = move_stock(dispatcher, tenant_id, &reversal, &reference, "reversal", Utc::now()) {
            warn!(
                tenant_id = %tenant_id,
                order_id = %order_id,
                item_id = %m.item_id,
                error = %err,
                "failed to reverse production movement"
            );
        }
    }
}

/// Complete an in-progress order against the stock of its warehouse.
///
/// Components are drawn from the warehouse's batches in batch order; the
/// finished good is received into `batch` (blank means the default batch).
pub fn complete_production<S, B>(
    dispatcher: &CommandDispatcher<S, B>,
    tenant_id: TenantId,
    order_id: ProductionOrderId,
    produced_quantity: i64,
    batch: Option<String>,
) -> Result<Vec<StoredEvent>, WorkflowError>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    let order: ProductionOrder =
        dispatcher.load(tenant_id, order_id.0, |_, id| ProductionOrder::empty(ProductionOrderId::new(id)))?;
    if !order.is_created() {
        return Err(WorkflowError::NotFound(format!("production order {order_id}")));
    }
    if order.status() != ProductionStatus::InProgress {
        return Err(DispatchError::InvariantViolation(
            "only orders in progress can be completed".to_string(),
        )
        .into());
    }
    if produced_quantity <= 0 {
        return Err(WorkflowError::Validation("produced quantity must be positive".to_string()));
    }
    let finished_item = order
        .finished_item()
        .ok_or_else(|| WorkflowError::NotFound(format!("finished item of order {order_id}")))?;
    let warehouse = order.warehouse().to_string();
    let finished_key = StockKey::normalize(&warehouse, batch.as_deref())
        .map_err(|e| WorkflowError::Validation(e.to_string()))?;

    let mut plan = Vec::new();
    for req in order.requirements() {
        let item = load_item(dispatcher, tenant_id, req.item_id)?;
        let available = item.quantity_in_warehouse(&warehouse);
        if available < req.quantity {
            return Err(WorkflowError::Validation(format!(
                "insufficient stock of {} in {warehouse}: available {available}, required {}",
                item.sku(),
                req.quantity
            )));
        }
        for (key, quantity) in draw_from_batches(&item, &warehouse, req.quantity) {
            plan.push(Made {
                item_id: req.item_id,
                direction: MovementDirection::Out,
                key,
                quantity,
            });
        }
    }
    plan.push(Made {
        item_id: finished_item,
        direction: MovementDirection::In,
        key: finished_key.clone(),
        quantity: produced_quantity,
    });

    let reference = format!("production:{order_id}");
    let occurred_at = Utc::now();
    let mut made = Vec::with_capacity(plan.len());
    for movement in plan {
        let reason = match movement.direction {
            MovementDirection::Out => "consumed",
            MovementDirection::In => "produced",
        };
        if let Err(err) = move_stock(dispatcher, tenant_id, &movement, &reference, reason, occurred_at) {
            compensate(dispatcher, tenant_id, order_id, &made);
            return Err(err.into());
        }
        made.push(movement);
    }

    let completed = dispatcher.dispatch::<ProductionOrder>(
        tenant_id,
        order_id.0,
        streams::PRODUCTION_ORDER,
        ProductionCommand::CompleteProduction(CompleteProduction {
            tenant_id,
            order_id,
            produced_quantity,
            batch: Some(finished_key.batch),
            occurred_at,
        }),
        |_, id| ProductionOrder::empty(ProductionOrderId::new(id)),
    );
    match completed {
        Ok(events) => {
            info!(
                tenant_id = %tenant_id,
                order_id = %order_id,
                movements = made.len(),
                produced_quantity,
                "production completed"
            );
            Ok(events)
        }
        Err(err) => {
            compensate(dispatcher, tenant_id, order_id, &made);
            Err(err.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::testing::{TestDispatcher, dispatcher};
    use estateerp_inventory::{
        BomComponent, BomId, CreateItem, PlanProduction, StartProduction,
    };

    fn create_item(d: &TestDispatcher, t: TenantId, sku: &str) -> InventoryItemId {
        let id = InventoryItemId::generate();
        d.dispatch::<InventoryItem>(
            t,
            id.0,
            streams::INVENTORY_ITEM,
            InventoryCommand::CreateItem(CreateItem {
                tenant_id: t,
                item_id: id,
                sku: sku.to_string(),
                name: sku.to_string(),
                unit: "nos".to_string(),
                hsn: None,
                gst_rate: 1800,
                reorder_level: 0,
                occurred_at: Utc::now(),
            }),
            |_, a| InventoryItem::empty(InventoryItemId::new(a)),
        )
        .unwrap();
        id
    }

    fn receive(d: &TestDispatcher, t: TenantId, item: InventoryItemId, batch: &str, qty: i64) {
        move_stock(
            d,
            t,
            &Made {
                item_id: item,
                direction: MovementDirection::In,
                key: StockKey::normalize("SITE-A", Some(batch)).unwrap(),
                quantity: qty,
            },
            "grn",
            "purchase",
            Utc::now(),
        )
        .unwrap();
    }

    fn started_order(
        d: &TestDispatcher,
        t: TenantId,
        finished: InventoryItemId,
        components: Vec<BomComponent>,
        quantity: i64,
    ) -> ProductionOrderId {
        let id = ProductionOrderId::generate();
        let make = |_: TenantId, a| ProductionOrder::empty(ProductionOrderId::new(a));
        d.dispatch::<ProductionOrder>(
            t,
            id.0,
            streams::PRODUCTION_ORDER,
            ProductionCommand::PlanProduction(PlanProduction {
                tenant_id: t,
                order_id: id,
                bom_id: BomId::generate(),
                bom_revision: 1,
                finished_item: finished,
                output_quantity: 1,
                components,
                quantity,
                warehouse: "SITE-A".to_string(),
                occurred_at: Utc::now(),
            }),
            make,
        )
        .unwrap();
        d.dispatch::<ProductionOrder>(
            t,
            id.0,
            streams::PRODUCTION_ORDER,
            ProductionCommand::StartProduction(StartProduction {
                tenant_id: t,
                order_id: id,
                occurred_at: Utc::now(),
            }),
            make,
        )
        .unwrap();
        id
    }

    fn component(item_id: InventoryItemId, quantity: i64) -> BomComponent {
        BomComponent { item_id, quantity }
    }

    fn stock_of(d: &TestDispatcher, t: TenantId, item: InventoryItemId) -> InventoryItem {
        load_item(d, t, item).unwrap()
    }

    #[test]
    fn completion_consumes_components_across_batches_and_receives_output() {
        let d = dispatcher();
        let t = TenantId::new();
        let cement = create_item(&d, t, "CEMENT");
        let steel = create_item(&d, t, "STEEL");
        let slab = create_item(&d, t, "PRECAST-SLAB");
        receive(&d, t, cement, "B1", 6);
        receive(&d, t, cement, "B2", 10);
        receive(&d, t, steel, "B1", 5);

        let order = started_order(&d, t, slab, vec![component(cement, 4), component(steel, 1)], 3);
        complete_production(&d, t, order, 3, Some("LOT-9".to_string())).unwrap();

        let cement_now = stock_of(&d, t, cement);
        let b1 = StockKey::normalize("SITE-A", Some("B1")).unwrap();
        let b2 = StockKey::normalize("SITE-A", Some("B2")).unwrap();
        assert_eq!(cement_now.quantity_at(&b1), 0);
        assert_eq!(cement_now.quantity_at(&b2), 4);
        assert_eq!(stock_of(&d, t, steel).quantity_in_warehouse("SITE-A"), 2);
        let lot = StockKey::normalize("SITE-A", Some("LOT-9")).unwrap();
        assert_eq!(stock_of(&d, t, slab).quantity_at(&lot), 3);

        let order: ProductionOrder = d
            .load(t, order.0, |_, a| ProductionOrder::empty(ProductionOrderId::new(a)))
            .unwrap();
        assert_eq!(order.status(), ProductionStatus::Completed);
    }

    #[test]
    fn shortage_is_reported_before_any_movement() {
        let d = dispatcher();
        let t = TenantId::new();
        let cement = create_item(&d, t, "CEMENT");
        let slab = create_item(&d, t, "PRECAST-SLAB");
        receive(&d, t, cement, "B1", 5);

        let order = started_order(&d, t, slab, vec![component(cement, 4)], 2);
        let err = complete_production(&d, t, order, 2, None).unwrap_err();
        assert!(matches!(err, WorkflowError::Validation(_)));
        assert_eq!(stock_of(&d, t, cement).quantity_in_warehouse("SITE-A"), 5);
        assert_eq!(stock_of(&d, t, slab).total_quantity(), 0);
    }

    #[test]
    fn failed_completion_reverses_movements() {
        let d = dispatcher();
        let t = TenantId::new();
        let cement = create_item(&d, t, "CEMENT");
        receive(&d, t, cement, "B1", 10);
        // the finished item does not exist, so receiving it fails after the
        // component was already consumed
        let ghost = InventoryItemId::generate();

        let order = started_order(&d, t, ghost, vec![component(cement, 2)], 1);
        let err = complete_production(&d, t, order, 1, None).unwrap_err();
        assert!(matches!(err, WorkflowError::Dispatch(DispatchError::NotFound)));

        let cement_now = stock_of(&d, t, cement);
        assert_eq!(cement_now.quantity_in_warehouse("SITE-A"), 10);
        let order: ProductionOrder = d
            .load(t, order.0, |_, a| ProductionOrder::empty(ProductionOrderId::new(a)))
            .unwrap();
        assert_eq!(order.status(), ProductionStatus::InProgress);
    }
}
