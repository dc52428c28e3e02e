use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use estateerp_core::{Aggregate, AggregateRoot, DomainError, TenantId, define_aggregate_id};
use estateerp_events::Event;

use crate::item::InventoryItemId;

define_aggregate_id!(
    /// Bill of material identifier.
    BomId
);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BomComponent {
    pub item_id: InventoryItemId,
    /// Quantity consumed per `output_quantity` of the finished item.
    pub quantity: i64,
}

/// Aggregate root: BillOfMaterial.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BillOfMaterial {
    id: BomId,
    tenant_id: Option<TenantId>,
    name: String,
    finished_item: Option<InventoryItemId>,
    output_quantity: i64,
    components: Vec<BomComponent>,
    revision: u32,
    active: bool,
    version: u64,
    created: bool,
}

impl BillOfMaterial {
    pub fn empty(id: BomId) -> Self {
        Self {
            id,
            tenant_id: None,
            name: String::new(),
            finished_item: None,
            output_quantity: 0,
            components: Vec::new(),
            revision: 0,
            active: false,
            version: 0,
            created: false,
        }
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn finished_item(&self) -> Option<InventoryItemId> {
        self.finished_item
    }

    pub fn output_quantity(&self) -> i64 {
        self.output_quantity
    }

    pub fn components(&self) -> &[BomComponent] {
        &self.components
    }

    pub fn revision(&self) -> u32 {
        self.revision
    }

    pub fn is_active(&self) -> bool {
        self.active
    }
}

impl AggregateRoot for BillOfMaterial {
    type Id = BomId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateBom {
    pub tenant_id: TenantId,
    pub bom_id: BomId,
    pub name: String,
    pub finished_item: InventoryItemId,
    pub output_quantity: i64,
    pub components: Vec<BomComponent>,
    pub occurred_at: DateTime<Utc>,
}

/// Replaces the component list; bumps the revision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviseBom {
    pub tenant_id: TenantId,
    pub bom_id: BomId,
    pub output_quantity: Option<i64>,
    pub components: Vec<BomComponent>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeactivateBom {
    pub tenant_id: TenantId,
    pub bom_id: BomId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BomCommand {
    CreateBom(CreateBom),
    ReviseBom(ReviseBom),
    DeactivateBom(DeactivateBom),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BomCreated {
    pub tenant_id: TenantId,
    pub bom_id: BomId,
    pub name: String,
    pub finished_item: InventoryItemId,
    pub output_quantity: i64,
    pub components: Vec<BomComponent>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BomRevised {
    pub tenant_id: TenantId,
    pub bom_id: BomId,
    pub revision: u32,
    pub output_quantity: i64,
    pub components: Vec<BomComponent>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BomDeactivated {
    pub tenant_id: TenantId,
    pub bom_id: BomId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BomEvent {
    BomCreated(BomCreated),
    BomRevised(BomRevised),
    BomDeactivated(BomDeactivated),
}

impl Event for BomEvent {
    fn event_type(&self) -> &'static str {
        match self {
            BomEvent::BomCreated(_) => "manufacturing.bom.created",
            BomEvent::BomRevised(_) => "manufacturing.bom.revised",
            BomEvent::BomDeactivated(_) => "manufacturing.bom.deactivated",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            BomEvent::BomCreated(e) => e.occurred_at,
            BomEvent::BomRevised(e) => e.occurred_at,
            BomEvent::BomDeactivated(e) => e.occurred_at,
        }
    }
}

impl Aggregate for BillOfMaterial {
    type Command = BomCommand;
    type Event = BomEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            BomEvent::BomCreated(e) => {
                self.id = e.bom_id;
                self.tenant_id = Some(e.tenant_id);
                self.name = e.name.clone();
                self.finished_item = Some(e.finished_item);
                self.output_quantity = e.output_quantity;
                self.components = e.components.clone();
                self.revision = 1;
                self.active = true;
                self.created = true;
            }
            BomEvent::BomRevised(e) => {
                self.revision = e.revision;
                self.output_quantity = e.output_quantity;
                self.components = e.components.clone();
            }
            BomEvent::BomDeactivated(_) => {
                self.active = false;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            BomCommand::CreateBom(cmd) => self.handle_create(cmd),
            BomCommand::ReviseBom(cmd) => self.handle_revise(cmd),
            BomCommand::DeactivateBom(cmd) => self.handle_deactivate(cmd),
        }
    }
}

fn validate_components(
    finished_item: InventoryItemId,
    output_quantity: i64,
    components: &[BomComponent],
) -> Result<(), DomainError> {
    if output_quantity <= 0 {
        return Err(DomainError::validation("output quantity must be positive"));
    }
    if components.is_empty() {
        return Err(DomainError::validation("a bill of material needs at least one component"));
    }
    let mut seen = HashSet::new();
    for c in components {
        if c.quantity <= 0 {
            return Err(DomainError::validation("component quantity must be positive"));
        }
        if c.item_id == finished_item {
            return Err(DomainError::validation(
                "the finished item cannot be its own component",
            ));
        }
        if !seen.insert(c.item_id) {
            return Err(DomainError::validation(format!(
                "component {} is listed twice",
                c.item_id
            )));
        }
    }
    Ok(())
}

impl BillOfMaterial {
    fn ensure_existing(&self, tenant_id: TenantId, bom_id: BomId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        if self.id != bom_id {
            return Err(DomainError::invariant("bom_id mismatch"));
        }
        Ok(())
    }

    fn handle_create(&self, cmd: &CreateBom) -> Result<Vec<BomEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("bill of material already exists"));
        }
        if cmd.name.trim().is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }
        validate_components(cmd.finished_item, cmd.output_quantity, &cmd.components)?;

        Ok(vec![BomEvent::BomCreated(BomCreated {
            tenant_id: cmd.tenant_id,
            bom_id: cmd.bom_id,
            name: cmd.name.trim().to_string(),
            finished_item: cmd.finished_item,
            output_quantity: cmd.output_quantity,
            components: cmd.components.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_revise(&self, cmd: &ReviseBom) -> Result<Vec<BomEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.bom_id)?;
        if !self.active {
            return Err(DomainError::invariant("inactive bills of material cannot be revised"));
        }
        let finished_item = self
            .finished_item
            .ok_or_else(|| DomainError::invariant("bill of material has no finished item"))?;
        let output_quantity = cmd.output_quantity.unwrap_or(self.output_quantity);
        validate_components(finished_item, output_quantity, &cmd.components)?;

        Ok(vec![BomEvent::BomRevised(BomRevised {
            tenant_id: cmd.tenant_id,
            bom_id: cmd.bom_id,
            revision: self.revision + 1,
            output_quantity,
            components: cmd.components.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_deactivate(&self, cmd: &DeactivateBom) -> Result<Vec<BomEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.bom_id)?;
        if !self.active {
            return Err(DomainError::conflict("bill of material is already inactive"));
        }
        Ok(vec![BomEvent::BomDeactivated(BomDeactivated {
            tenant_id: cmd.tenant_id,
            bom_id: cmd.bom_id,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use estateerp_events::execute;

    fn component(item_id: InventoryItemId, quantity: i64) -> BomComponent {
        BomComponent { item_id, quantity }
    }

    fn create_cmd(tenant_id: TenantId, bom_id: BomId, finished: InventoryItemId, components: Vec<BomComponent>) -> BomCommand {
        BomCommand::CreateBom(CreateBom {
            tenant_id,
            bom_id,
            name: "M20 concrete, 1 cu.m".to_string(),
            finished_item: finished,
            output_quantity: 1,
            components,
            occurred_at: Utc::now(),
        })
    }

    #[test]
    fn rejects_self_reference_and_duplicates() {
        let finished = InventoryItemId::generate();
        let cement = InventoryItemId::generate();
        let bom_id = BomId::generate();
        let bom = BillOfMaterial::empty(bom_id);
        let tenant_id = TenantId::new();

        let own = create_cmd(tenant_id, bom_id, finished, vec![component(finished, 1)]);
        assert!(bom.handle(&own).is_err());

        let dup = create_cmd(
            tenant_id,
            bom_id,
            finished,
            vec![component(cement, 7), component(cement, 1)],
        );
        assert!(bom.handle(&dup).is_err());
    }

    #[test]
    fn revision_increments_and_inactive_boms_are_frozen() {
        let tenant_id = TenantId::new();
        let bom_id = BomId::generate();
        let finished = InventoryItemId::generate();
        let cement = InventoryItemId::generate();
        let sand = InventoryItemId::generate();
        let mut bom = BillOfMaterial::empty(bom_id);

        execute(&mut bom, &create_cmd(tenant_id, bom_id, finished, vec![component(cement, 8)])).unwrap();
        execute(
            &mut bom,
            &BomCommand::ReviseBom(ReviseBom {
                tenant_id,
                bom_id,
                output_quantity: None,
                components: vec![component(cement, 7), component(sand, 2)],
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        assert_eq!(bom.revision(), 2);
        assert_eq!(bom.components().len(), 2);

        execute(
            &mut bom,
            &BomCommand::DeactivateBom(DeactivateBom {
                tenant_id,
                bom_id,
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        let revise = BomCommand::ReviseBom(ReviseBom {
            tenant_id,
            bom_id,
            output_quantity: None,
            components: vec![component(cement, 6)],
            occurred_at: Utc::now(),
        });
        assert!(bom.handle(&revise).is_err());
    }
}
