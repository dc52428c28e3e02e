use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;

use estateerp_core::TenantId;
use estateerp_events::EventEnvelope;
use estateerp_inventory::{
    BomComponent, BomEvent, BomId, InventoryItemId, ProductionEvent, ProductionOrderId,
    ProductionStatus, Requirement,
};

use super::{Projection, ProjectionError, StreamCursors, decode, ensure_scope};
use crate::read_model::{InMemoryTenantStore, TenantStore};
use crate::streams;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BomReadModel {
    pub bom_id: BomId,
    pub name: String,
    pub finished_item: InventoryItemId,
    pub output_quantity: i64,
    pub components: Vec<BomComponent>,
    pub revision: u32,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProductionOrderReadModel {
    pub order_id: ProductionOrderId,
    pub bom_id: BomId,
    pub bom_revision: u32,
    pub finished_item: InventoryItemId,
    pub quantity: i64,
    pub warehouse: String,
    pub requirements: Vec<Requirement>,
    pub status: ProductionStatus,
    pub produced_quantity: Option<i64>,
    pub batch: Option<String>,
    pub cancel_reason: Option<String>,
    pub planned_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// Bills of material and production orders.
#[derive(Debug, Default)]
pub struct ManufacturingProjection {
    boms: InMemoryTenantStore<BomId, BomReadModel>,
    orders: InMemoryTenantStore<ProductionOrderId, ProductionOrderReadModel>,
    cursors: StreamCursors,
}

impl ManufacturingProjection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bom(&self, tenant_id: TenantId, bom_id: &BomId) -> Option<BomReadModel> {
        self.boms.get(tenant_id, bom_id)
    }

    pub fn boms(&self, tenant_id: TenantId, active_only: bool) -> Vec<BomReadModel> {
        let mut out: Vec<_> = self
            .boms
            .list(tenant_id)
            .into_iter()
            .filter(|b| b.active || !active_only)
            .collect();
        out.sort_by(|a, b| a.name.cmp(&b.name).then(a.bom_id.cmp(&b.bom_id)));
        out
    }

    pub fn order(&self, tenant_id: TenantId, order_id: &ProductionOrderId) -> Option<ProductionOrderReadModel> {
        self.orders.get(tenant_id, order_id)
    }

    /// Orders, newest plan first.
    pub fn orders(&self, tenant_id: TenantId, status: Option<ProductionStatus>) -> Vec<ProductionOrderReadModel> {
        let mut out: Vec<_> = self
            .orders
            .list(tenant_id)
            .into_iter()
            .filter(|o| status.is_none_or(|s| o.status == s))
            .collect();
        out.sort_by(|a, b| b.planned_at.cmp(&a.planned_at).then(a.order_id.cmp(&b.order_id)));
        out
    }

    fn apply_bom(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        let tenant_id = envelope.tenant_id();
        match decode::<BomEvent>(envelope)? {
            BomEvent::BomCreated(e) => {
                ensure_scope(envelope, e.tenant_id, e.bom_id.0)?;
                self.boms.upsert(
                    tenant_id,
                    e.bom_id,
                    BomReadModel {
                        bom_id: e.bom_id,
                        name: e.name,
                        finished_item: e.finished_item,
                        output_quantity: e.output_quantity,
                        components: e.components,
                        revision: 1,
                        active: true,
                    },
                );
            }
            BomEvent::BomRevised(e) => {
                ensure_scope(envelope, e.tenant_id, e.bom_id.0)?;
                self.boms.update(tenant_id, e.bom_id, |slot| {
                    if let Some(bom) = slot {
                        bom.revision = e.revision;
                        bom.output_quantity = e.output_quantity;
                        bom.components = e.components;
                    }
                });
            }
            BomEvent::BomDeactivated(e) => {
                ensure_scope(envelope, e.tenant_id, e.bom_id.0)?;
                self.boms.update(tenant_id, e.bom_id, |slot| {
                    if let Some(bom) = slot {
                        bom.active = false;
                    }
                });
            }
        }
        Ok(())
    }

    fn apply_order(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        let tenant_id = envelope.tenant_id();
        match decode::<ProductionEvent>(envelope)? {
            ProductionEvent::ProductionPlanned(e) => {
                ensure_scope(envelope, e.tenant_id, e.order_id.0)?;
                self.orders.upsert(
                    tenant_id,
                    e.order_id,
                    ProductionOrderReadModel {
                        order_id: e.order_id,
                        bom_id: e.bom_id,
                        bom_revision: e.bom_revision,
                        finished_item: e.finished_item,
                        quantity: e.quantity,
                        warehouse: e.warehouse,
                        requirements: e.requirements,
                        status: ProductionStatus::Planned,
                        produced_quantity: None,
                        batch: None,
                        cancel_reason: None,
                        planned_at: e.occurred_at,
                        finished_at: None,
                    },
                );
            }
            ProductionEvent::ProductionStarted(e) => {
                ensure_scope(envelope, e.tenant_id, e.order_id.0)?;
                self.orders.update(tenant_id, e.order_id, |slot| {
                    if let Some(order) = slot {
                        order.status = ProductionStatus::InProgress;
                    }
                });
            }
            ProductionEvent::ProductionCompleted(e) => {
                ensure_scope(envelope, e.tenant_id, e.order_id.0)?;
                self.orders.update(tenant_id, e.order_id, |slot| {
                    if let Some(order) = slot {
                        order.status = ProductionStatus::Completed;
                        order.produced_quantity = Some(e.produced_quantity);
                        order.batch = Some(e.batch);
                        order.finished_at = Some(e.occurred_at);
                    }
                });
            }
            ProductionEvent::ProductionCancelled(e) => {
                ensure_scope(envelope, e.tenant_id, e.order_id.0)?;
                self.orders.update(tenant_id, e.order_id, |slot| {
                    if let Some(order) = slot {
                        order.status = ProductionStatus::Cancelled;
                        order.cancel_reason = e.reason;
                        order.finished_at = Some(e.occurred_at);
                    }
                });
            }
        }
        Ok(())
    }
}

impl Projection for ManufacturingProjection {
    fn name(&self) -> &'static str {
        "manufacturing"
    }

    fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        let bom = envelope.aggregate_type() == streams::BOM;
        if !(bom || envelope.aggregate_type() == streams::PRODUCTION_ORDER) {
            return Ok(());
        }
        if !self.cursors.admit(envelope)? {
            return Ok(());
        }
        if bom {
            self.apply_bom(envelope)?;
        } else {
            self.apply_order(envelope)?;
        }
        self.cursors.advance(envelope);
        Ok(())
    }

    fn clear_tenant(&self, tenant_id: TenantId) {
        self.boms.clear_tenant(tenant_id);
        self.orders.clear_tenant(tenant_id);
        self.cursors.clear_tenant(tenant_id);
    }
}
