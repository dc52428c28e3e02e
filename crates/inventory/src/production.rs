use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use estateerp_core::{Aggregate, AggregateRoot, DomainError, TenantId, define_aggregate_id};
use estateerp_events::Event;

use crate::bom::{BomComponent, BomId};
use crate::item::{DEFAULT_BATCH, InventoryItemId};

define_aggregate_id!(
    /// Production order identifier.
    ProductionOrderId
);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductionStatus {
    Planned,
    InProgress,
    Completed,
    Cancelled,
}

/// Component quantity a production order consumes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requirement {
    pub item_id: InventoryItemId,
    pub quantity: i64,
}

/// Component needs for `quantity` units: BOMs run in whole batches of
/// `output_quantity`, so the batch count is rounded up.
pub fn compute_requirements(
    components: &[BomComponent],
    output_quantity: i64,
    quantity: i64,
) -> Result<Vec<Requirement>, DomainError> {
    if output_quantity <= 0 {
        return Err(DomainError::validation("output quantity must be positive"));
    }
    if quantity <= 0 {
        return Err(DomainError::validation("production quantity must be positive"));
    }
    let batches = (quantity + output_quantity - 1) / output_quantity;
    components
        .iter()
        .map(|c| {
            let quantity = c
                .quantity
                .checked_mul(batches)
                .ok_or_else(|| DomainError::invariant("requirement overflow"))?;
            Ok(Requirement {
                item_id: c.item_id,
                quantity,
            })
        })
        .collect()
}

/// Aggregate root: ProductionOrder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductionOrder {
    id: ProductionOrderId,
    tenant_id: Option<TenantId>,
    bom_id: Option<BomId>,
    finished_item: Option<InventoryItemId>,
    quantity: i64,
    warehouse: String,
    requirements: Vec<Requirement>,
    status: ProductionStatus,
    produced_quantity: i64,
    version: u64,
    created: bool,
}

impl ProductionOrder {
    pub fn empty(id: ProductionOrderId) -> Self {
        Self {
            id,
            tenant_id: None,
            bom_id: None,
            finished_item: None,
            quantity: 0,
            warehouse: String::new(),
            requirements: Vec::new(),
            status: ProductionStatus::Planned,
            produced_quantity: 0,
            version: 0,
            created: false,
        }
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    pub fn finished_item(&self) -> Option<InventoryItemId> {
        self.finished_item
    }

    pub fn quantity(&self) -> i64 {
        self.quantity
    }

    pub fn warehouse(&self) -> &str {
        &self.warehouse
    }

    pub fn requirements(&self) -> &[Requirement] {
        &self.requirements
    }

    pub fn status(&self) -> ProductionStatus {
        self.status
    }
}

impl AggregateRoot for ProductionOrder {
    type Id = ProductionOrderId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Plan against a snapshot of the BOM taken by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanProduction {
    pub tenant_id: TenantId,
    pub order_id: ProductionOrderId,
    pub bom_id: BomId,
    pub bom_revision: u32,
    pub finished_item: InventoryItemId,
    pub output_quantity: i64,
    pub components: Vec<BomComponent>,
    pub quantity: i64,
    pub warehouse: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartProduction {
    pub tenant_id: TenantId,
    pub order_id: ProductionOrderId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompleteProduction {
    pub tenant_id: TenantId,
    pub order_id: ProductionOrderId,
    pub produced_quantity: i64,
    pub batch: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelProduction {
    pub tenant_id: TenantId,
    pub order_id: ProductionOrderId,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProductionCommand {
    PlanProduction(PlanProduction),
    StartProduction(StartProduction),
    CompleteProduction(CompleteProduction),
    CancelProduction(CancelProduction),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductionPlanned {
    pub tenant_id: TenantId,
    pub order_id: ProductionOrderId,
    pub bom_id: BomId,
    pub bom_revision: u32,
    pub finished_item: InventoryItemId,
    pub quantity: i64,
    pub warehouse: String,
    pub requirements: Vec<Requirement>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductionStarted {
    pub tenant_id: TenantId,
    pub order_id: ProductionOrderId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductionCompleted {
    pub tenant_id: TenantId,
    pub order_id: ProductionOrderId,
    pub produced_quantity: i64,
    pub batch: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductionCancelled {
    pub tenant_id: TenantId,
    pub order_id: ProductionOrderId,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProductionEvent {
    ProductionPlanned(ProductionPlanned),
    ProductionStarted(ProductionStarted),
    ProductionCompleted(ProductionCompleted),
    ProductionCancelled(ProductionCancelled),
}

impl Event for ProductionEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ProductionEvent::ProductionPlanned(_) => "manufacturing.order.planned",
            ProductionEvent::ProductionStarted(_) => "manufacturing.order.started",
            ProductionEvent::ProductionCompleted(_) => "manufacturing.order.completed",
            ProductionEvent::ProductionCancelled(_) => "manufacturing.order.cancelled",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            ProductionEvent::ProductionPlanned(e) => e.occurred_at,
            ProductionEvent::ProductionStarted(e) => e.occurred_at,
            ProductionEvent::ProductionCompleted(e) => e.occurred_at,
            ProductionEvent::ProductionCancelled(e) => e.occurred_at,
        }
    }
}

impl Aggregate for ProductionOrder {
    type Command = ProductionCommand;
    type Event = ProductionEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            ProductionEvent::ProductionPlanned(e) => {
                self.id = e.order_id;
                self.tenant_id = Some(e.tenant_id);
                self.bom_id = Some(e.bom_id);
                self.finished_item = Some(e.finished_item);
                self.quantity = e.quantity;
                self.warehouse = e.warehouse.clone();
                self.requirements = e.requirements.clone();
                self.status = ProductionStatus::Planned;
                self.created = true;
            }
            ProductionEvent::ProductionStarted(_) => {
                self.status = ProductionStatus::InProgress;
            }
            ProductionEvent::ProductionCompleted(e) => {
                self.produced_quantity = e.produced_quantity;
                self.status = ProductionStatus::Completed;
            }
            ProductionEvent::ProductionCancelled(_) => {
                self.status = ProductionStatus::Cancelled;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            ProductionCommand::PlanProduction(cmd) => self.handle_plan(cmd),
            ProductionCommand::StartProduction(cmd) => self.handle_start(cmd),
            ProductionCommand::CompleteProduction(cmd) => self.handle_complete(cmd),
            ProductionCommand::CancelProduction(cmd) => self.handle_cancel(cmd),
        }
    }
}

impl ProductionOrder {
    fn ensure_existing(&self, tenant_id: TenantId, order_id: ProductionOrderId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        if self.id != order_id {
            return Err(DomainError::invariant("order_id mismatch"));
        }
        Ok(())
    }

    fn handle_plan(&self, cmd: &PlanProduction) -> Result<Vec<ProductionEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("production order already exists"));
        }
        let warehouse = cmd.warehouse.trim();
        if warehouse.is_empty() {
            return Err(DomainError::validation("warehouse cannot be empty"));
        }
        if cmd.components.is_empty() {
            return Err(DomainError::validation("bill of material has no components"));
        }
        let requirements = compute_requirements(&cmd.components, cmd.output_quantity, cmd.quantity)?;

        Ok(vec![ProductionEvent::ProductionPlanned(ProductionPlanned {
            tenant_id: cmd.tenant_id,
            order_id: cmd.order_id,
            bom_id: cmd.bom_id,
            bom_revision: cmd.bom_revision,
            finished_item: cmd.finished_item,
            quantity: cmd.quantity,
            warehouse: warehouse.to_string(),
            requirements,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_start(&self, cmd: &StartProduction) -> Result<Vec<ProductionEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.order_id)?;
        if self.status != ProductionStatus::Planned {
            return Err(DomainError::invariant("only planned orders can be started"));
        }
        Ok(vec![ProductionEvent::ProductionStarted(ProductionStarted {
            tenant_id: cmd.tenant_id,
            order_id: cmd.order_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_complete(&self, cmd: &CompleteProduction) -> Result<Vec<ProductionEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.order_id)?;
        if self.status != ProductionStatus::InProgress {
            return Err(DomainError::invariant("only orders in progress can be completed"));
        }
        if cmd.produced_quantity <= 0 {
            return Err(DomainError::validation("produced quantity must be positive"));
        }
        let batch = cmd
            .batch
            .as_deref()
            .map(str::trim)
            .filter(|b| !b.is_empty())
            .unwrap_or(DEFAULT_BATCH);

        Ok(vec![ProductionEvent::ProductionCompleted(ProductionCompleted {
            tenant_id: cmd.tenant_id,
            order_id: cmd.order_id,
            produced_quantity: cmd.produced_quantity,
            batch: batch.to_string(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_cancel(&self, cmd: &CancelProduction) -> Result<Vec<ProductionEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.order_id)?;
        match self.status {
            ProductionStatus::Planned | ProductionStatus::InProgress => {}
            ProductionStatus::Completed => {
                return Err(DomainError::invariant("completed orders cannot be cancelled"));
            }
            ProductionStatus::Cancelled => {
                return Err(DomainError::conflict("order is already cancelled"));
            }
        }
        Ok(vec![ProductionEvent::ProductionCancelled(ProductionCancelled {
            tenant_id: cmd.tenant_id,
            order_id: cmd.order_id,
            reason: cmd.reason.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use estateerp_events::execute;

    #[test]
    fn requirements_round_up_to_whole_batches() {
        let cement = InventoryItemId::generate();
        let sand = InventoryItemId::generate();
        let components = vec![
            BomComponent { item_id: cement, quantity: 8 },
            BomComponent { item_id: sand, quantity: 3 },
        ];

        // 25 units from batches of 10 -> 3 batches.
        let req = compute_requirements(&components, 10, 25).unwrap();
        assert_eq!(req[0], Requirement { item_id: cement, quantity: 24 });
        assert_eq!(req[1], Requirement { item_id: sand, quantity: 9 });

        let exact = compute_requirements(&components, 10, 20).unwrap();
        assert_eq!(exact[0].quantity, 16);
        assert!(compute_requirements(&components, 10, 0).is_err());
    }

    #[test]
    fn lifecycle_planned_started_completed() {
        let tenant_id = TenantId::new();
        let order_id = ProductionOrderId::generate();
        let mut order = ProductionOrder::empty(order_id);
        execute(
            &mut order,
            &ProductionCommand::PlanProduction(PlanProduction {
                tenant_id,
                order_id,
                bom_id: BomId::generate(),
                bom_revision: 1,
                finished_item: InventoryItemId::generate(),
                output_quantity: 1,
                components: vec![BomComponent { item_id: InventoryItemId::generate(), quantity: 2 }],
                quantity: 5,
                warehouse: " PLANT ".to_string(),
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        assert_eq!(order.warehouse(), "PLANT");

        let complete = ProductionCommand::CompleteProduction(CompleteProduction {
            tenant_id,
            order_id,
            produced_quantity: 5,
            batch: None,
            occurred_at: Utc::now(),
        });
        assert!(order.handle(&complete).is_err());

        execute(
            &mut order,
            &ProductionCommand::StartProduction(StartProduction {
                tenant_id,
                order_id,
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        let events = execute(&mut order, &complete).unwrap();
        assert!(matches!(&events[0], ProductionEvent::ProductionCompleted(c) if c.batch == DEFAULT_BATCH));
        assert_eq!(order.status(), ProductionStatus::Completed);

        let cancel = ProductionCommand::CancelProduction(CancelProduction {
            tenant_id,
            order_id,
            reason: None,
            occurred_at: Utc::now(),
        });
        assert!(order.handle(&cancel).is_err());
    }
}
