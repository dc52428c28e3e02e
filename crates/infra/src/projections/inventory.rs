//! Stock read models: quantities per (item, warehouse, batch), item totals and
//! the movement history of each item.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;

use estateerp_core::{RateBps, TenantId};
use estateerp_events::EventEnvelope;
use estateerp_inventory::{InventoryEvent, InventoryItemId, MovementDirection, StockKey};

use super::{Projection, ProjectionError, StreamCursors, decode, ensure_scope};
use crate::read_model::{InMemoryTenantStore, TenantStore};
use crate::streams;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemReadModel {
    pub item_id: InventoryItemId,
    pub sku: String,
    pub name: String,
    pub unit: String,
    pub hsn: Option<String>,
    pub gst_rate: RateBps,
    pub reorder_level: i64,
    pub total_quantity: i64,
    pub below_reorder: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StockLevel {
    pub item_id: InventoryItemId,
    pub sku: String,
    pub warehouse: String,
    pub batch: String,
    pub quantity: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MovementLine {
    pub at: DateTime<Utc>,
    pub direction: MovementDirection,
    pub warehouse: String,
    pub batch: String,
    pub quantity: i64,
    pub balance_after: i64,
    pub reference: Option<String>,
    pub reason: Option<String>,
}

#[derive(Debug, Default)]
pub struct StockProjection {
    items: InMemoryTenantStore<InventoryItemId, ItemReadModel>,
    levels: InMemoryTenantStore<(InventoryItemId, StockKey), StockLevel>,
    movements: InMemoryTenantStore<InventoryItemId, Vec<MovementLine>>,
    cursors: StreamCursors,
}

impl StockProjection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn item(&self, tenant_id: TenantId, item_id: &InventoryItemId) -> Option<ItemReadModel> {
        self.items.get(tenant_id, item_id)
    }

    /// Items by SKU.
    pub fn items(&self, tenant_id: TenantId) -> Vec<ItemReadModel> {
        let mut out = self.items.list(tenant_id);
        out.sort_by(|a, b| a.sku.cmp(&b.sku));
        out
    }

    pub fn below_reorder(&self, tenant_id: TenantId) -> Vec<ItemReadModel> {
        let mut out = self.items(tenant_id);
        out.retain(|i| i.below_reorder);
        out
    }

    pub fn quantity(&self, tenant_id: TenantId, item_id: InventoryItemId, key: &StockKey) -> i64 {
        self.levels
            .get(tenant_id, &(item_id, key.clone()))
            .map(|l| l.quantity)
            .unwrap_or(0)
    }

    /// Non-zero stock tuples, optionally for one item or one warehouse.
    pub fn levels(
        &self,
        tenant_id: TenantId,
        item_id: Option<InventoryItemId>,
        warehouse: Option<&str>,
    ) -> Vec<StockLevel> {
        let mut out: Vec<_> = self
            .levels
            .list(tenant_id)
            .into_iter()
            .filter(|l| l.quantity != 0)
            .filter(|l| item_id.is_none_or(|i| l.item_id == i))
            .filter(|l| warehouse.is_none_or(|w| l.warehouse == w))
            .collect();
        out.sort_by(|a, b| {
            (&a.sku, &a.warehouse, &a.batch).cmp(&(&b.sku, &b.warehouse, &b.batch))
        });
        out
    }

    pub fn movements(&self, tenant_id: TenantId, item_id: &InventoryItemId) -> Vec<MovementLine> {
        self.movements.get(tenant_id, item_id).unwrap_or_default()
    }

    fn set_level(&self, tenant_id: TenantId, item_id: InventoryItemId, key: StockKey, quantity: i64) {
        let sku = self.item(tenant_id, &item_id).map(|i| i.sku).unwrap_or_default();
        self.levels.upsert(
            tenant_id,
            (item_id, key.clone()),
            StockLevel {
                item_id,
                sku,
                warehouse: key.warehouse,
                batch: key.batch,
                quantity,
            },
        );
    }

    fn refresh_total(&self, tenant_id: TenantId, item_id: InventoryItemId) {
        let total: i64 = self
            .levels(tenant_id, Some(item_id), None)
            .iter()
            .map(|l| l.quantity)
            .sum();
        self.items.update(tenant_id, item_id, |slot| {
            if let Some(item) = slot {
                item.total_quantity = total;
                item.below_reorder = total < item.reorder_level;
            }
        });
    }

    fn record(&self, tenant_id: TenantId, item_id: InventoryItemId, line: MovementLine) {
        self.movements.update(tenant_id, item_id, |slot| {
            slot.get_or_insert_with(Vec::new).push(line);
        });
    }
}

impl Projection for StockProjection {
    fn name(&self) -> &'static str {
        "inventory.stock"
    }

    fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        if envelope.aggregate_type() != streams::INVENTORY_ITEM || !self.cursors.admit(envelope)? {
            return Ok(());
        }
        let ev: InventoryEvent = decode(envelope)?;
        let tenant_id = envelope.tenant_id();

        match ev {
            InventoryEvent::ItemCreated(e) => {
                ensure_scope(envelope, e.tenant_id, e.item_id.0)?;
                self.items.upsert(
                    tenant_id,
                    e.item_id,
                    ItemReadModel {
                        item_id: e.item_id,
                        sku: e.sku,
                        name: e.name,
                        unit: e.unit,
                        hsn: e.hsn,
                        gst_rate: e.gst_rate,
                        reorder_level: e.reorder_level,
                        total_quantity: 0,
                        below_reorder: e.reorder_level > 0,
                    },
                );
            }
            InventoryEvent::StockMoved(e) => {
                ensure_scope(envelope, e.tenant_id, e.item_id.0)?;
                self.set_level(tenant_id, e.item_id, e.key.clone(), e.balance_after);
                self.record(
                    tenant_id,
                    e.item_id,
                    MovementLine {
                        at: e.occurred_at,
                        direction: e.direction,
                        warehouse: e.key.warehouse,
                        batch: e.key.batch,
                        quantity: e.quantity,
                        balance_after: e.balance_after,
                        reference: e.reference,
                        reason: e.reason,
                    },
                );
                self.refresh_total(tenant_id, e.item_id);
            }
            InventoryEvent::StockTransferred(e) => {
                ensure_scope(envelope, e.tenant_id, e.item_id.0)?;
                let from_after = self.quantity(tenant_id, e.item_id, &e.from) - e.quantity;
                let to_after = self.quantity(tenant_id, e.item_id, &e.to) + e.quantity;
                self.set_level(tenant_id, e.item_id, e.from.clone(), from_after);
                self.set_level(tenant_id, e.item_id, e.to.clone(), to_after);
                let reference = Some(format!("transfer {} -> {}", e.from.warehouse, e.to.warehouse));
                self.record(
                    tenant_id,
                    e.item_id,
                    MovementLine {
                        at: e.occurred_at,
                        direction: MovementDirection::Out,
                        warehouse: e.from.warehouse,
                        batch: e.from.batch,
                        quantity: e.quantity,
                        balance_after: from_after,
                        reference: reference.clone(),
                        reason: None,
                    },
                );
                self.record(
                    tenant_id,
                    e.item_id,
                    MovementLine {
                        at: e.occurred_at,
                        direction: MovementDirection::In,
                        warehouse: e.to.warehouse,
                        batch: e.to.batch,
                        quantity: e.quantity,
                        balance_after: to_after,
                        reference,
                        reason: None,
                    },
                );
                self.refresh_total(tenant_id, e.item_id);
            }
        }

        self.cursors.advance(envelope);
        Ok(())
    }

    fn clear_tenant(&self, tenant_id: TenantId) {
        self.items.clear_tenant(tenant_id);
        self.levels.clear_tenant(tenant_id);
        self.movements.clear_tenant(tenant_id);
        self.cursors.clear_tenant(tenant_id);
    }
}
