use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use estateerp_core::money::validate_gst_rate;
use estateerp_core::{Aggregate, AggregateRoot, DomainError, RateBps, TenantId, define_aggregate_id};
use estateerp_events::Event;

define_aggregate_id!(
    /// Inventory item identifier (tenant-scoped via `tenant_id` fields in events/commands).
    InventoryItemId
);

/// Batch used when a movement names none.
pub const DEFAULT_BATCH: &str = "DEFAULT";

/// Where a quantity sits: one warehouse, one batch.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StockKey {
    pub warehouse: String,
    pub batch: String,
}

impl StockKey {
    /// Trim both parts; a blank batch becomes [`DEFAULT_BATCH`].
    pub fn normalize(warehouse: &str, batch: Option<&str>) -> Result<Self, DomainError> {
        let warehouse = warehouse.trim();
        if warehouse.is_empty() {
            return Err(DomainError::validation("warehouse cannot be empty"));
        }
        let batch = batch.map(str::trim).filter(|b| !b.is_empty()).unwrap_or(DEFAULT_BATCH);
        Ok(Self {
            warehouse: warehouse.to_string(),
            batch: batch.to_string(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MovementDirection {
    In,
    Out,
}

impl MovementDirection {
    pub fn signed(self, quantity: i64) -> i64 {
        match self {
            MovementDirection::In => quantity,
            MovementDirection::Out => -quantity,
        }
    }

    pub fn reverse(self) -> Self {
        match self {
            MovementDirection::In => MovementDirection::Out,
            MovementDirection::Out => MovementDirection::In,
        }
    }
}

/// Aggregate root: InventoryItem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InventoryItem {
    id: InventoryItemId,
    tenant_id: Option<TenantId>,
    sku: String,
    name: String,
    stock: BTreeMap<StockKey, i64>,
    version: u64,
    created: bool,
}

impl InventoryItem {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: InventoryItemId) -> Self {
        Self {
            id,
            tenant_id: None,
            sku: String::new(),
            name: String::new(),
            stock: BTreeMap::new(),
            version: 0,
            created: false,
        }
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn sku(&self) -> &str {
        &self.sku
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn quantity_at(&self, key: &StockKey) -> i64 {
        self.stock.get(key).copied().unwrap_or(0)
    }

    /// Quantity across all batches of one warehouse.
    pub fn quantity_in_warehouse(&self, warehouse: &str) -> i64 {
        let warehouse = warehouse.trim();
        self.stock
            .iter()
            .filter(|(k, _)| k.warehouse == warehouse)
            .map(|(_, q)| *q)
            .sum()
    }

    pub fn total_quantity(&self) -> i64 {
        self.stock.values().sum()
    }

    pub fn stock(&self) -> &BTreeMap<StockKey, i64> {
        &self.stock
    }
}

impl AggregateRoot for InventoryItem {
    type Id = InventoryItemId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateItem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateItem {
    pub tenant_id: TenantId,
    pub item_id: InventoryItemId,
    pub sku: String,
    pub name: String,
    pub unit: String,
    pub hsn: Option<String>,
    pub gst_rate: RateBps,
    pub reorder_level: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RecordMovement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordMovement {
    pub tenant_id: TenantId,
    pub item_id: InventoryItemId,
    pub direction: MovementDirection,
    pub warehouse: String,
    pub batch: Option<String>,
    pub quantity: i64,
    pub reference: Option<String>,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: TransferStock (same batch, between warehouses).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferStock {
    pub tenant_id: TenantId,
    pub item_id: InventoryItemId,
    pub from_warehouse: String,
    pub to_warehouse: String,
    pub batch: Option<String>,
    pub quantity: i64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InventoryCommand {
    CreateItem(CreateItem),
    RecordMovement(RecordMovement),
    TransferStock(TransferStock),
}

/// Event: ItemCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemCreated {
    pub tenant_id: TenantId,
    pub item_id: InventoryItemId,
    pub sku: String,
    pub name: String,
    pub unit: String,
    pub hsn: Option<String>,
    pub gst_rate: RateBps,
    pub reorder_level: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: StockMoved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockMoved {
    pub tenant_id: TenantId,
    pub item_id: InventoryItemId,
    pub direction: MovementDirection,
    pub key: StockKey,
    pub quantity: i64,
    pub balance_after: i64,
    pub reference: Option<String>,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: StockTransferred.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockTransferred {
    pub tenant_id: TenantId,
    pub item_id: InventoryItemId,
    pub from: StockKey,
    pub to: StockKey,
    pub quantity: i64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InventoryEvent {
    ItemCreated(ItemCreated),
    StockMoved(StockMoved),
    StockTransferred(StockTransferred),
}

impl Event for InventoryEvent {
    fn event_type(&self) -> &'static str {
        match self {
            InventoryEvent::ItemCreated(_) => "inventory.item.created",
            InventoryEvent::StockMoved(_) => "inventory.item.stock_moved",
            InventoryEvent::StockTransferred(_) => "inventory.item.stock_transferred",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            InventoryEvent::ItemCreated(e) => e.occurred_at,
            InventoryEvent::StockMoved(e) => e.occurred_at,
            InventoryEvent::StockTransferred(e) => e.occurred_at,
        }
    }
}

impl Aggregate for InventoryItem {
    type Command = InventoryCommand;
    type Event = InventoryEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            InventoryEvent::ItemCreated(e) => {
                self.id = e.item_id;
                self.tenant_id = Some(e.tenant_id);
                self.sku = e.sku.clone();
                self.name = e.name.clone();
                self.stock.clear();
                self.created = true;
            }
            InventoryEvent::StockMoved(e) => {
                *self.stock.entry(e.key.clone()).or_insert(0) += e.direction.signed(e.quantity);
            }
            InventoryEvent::StockTransferred(e) => {
                *self.stock.entry(e.from.clone()).or_insert(0) -= e.quantity;
                *self.stock.entry(e.to.clone()).or_insert(0) += e.quantity;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            InventoryCommand::CreateItem(cmd) => self.handle_create(cmd),
            InventoryCommand::RecordMovement(cmd) => self.handle_movement(cmd),
            InventoryCommand::TransferStock(cmd) => self.handle_transfer(cmd),
        }
    }
}

impl InventoryItem {
    fn ensure_tenant(&self, tenant_id: TenantId) -> Result<(), DomainError> {
        if !self.created {
            return Ok(());
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        Ok(())
    }

    fn ensure_existing(&self, tenant_id: TenantId, item_id: InventoryItemId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_tenant(tenant_id)?;
        if self.id != item_id {
            return Err(DomainError::invariant("item_id mismatch"));
        }
        Ok(())
    }

    fn handle_create(&self, cmd: &CreateItem) -> Result<Vec<InventoryEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("item already exists"));
        }
        if cmd.sku.trim().is_empty() {
            return Err(DomainError::validation("sku cannot be empty"));
        }
        if cmd.name.trim().is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }
        if cmd.reorder_level < 0 {
            return Err(DomainError::validation("reorder level cannot be negative"));
        }
        validate_gst_rate(cmd.gst_rate)?;
        let unit = match cmd.unit.trim() {
            "" => "nos".to_string(),
            u => u.to_string(),
        };

        Ok(vec![InventoryEvent::ItemCreated(ItemCreated {
            tenant_id: cmd.tenant_id,
            item_id: cmd.item_id,
            sku: cmd.sku.trim().to_ascii_uppercase(),
            name: cmd.name.trim().to_string(),
            unit,
            hsn: cmd.hsn.as_deref().map(str::trim).filter(|h| !h.is_empty()).map(str::to_string),
            gst_rate: cmd.gst_rate,
            reorder_level: cmd.reorder_level,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_movement(&self, cmd: &RecordMovement) -> Result<Vec<InventoryEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.item_id)?;
        if cmd.quantity <= 0 {
            return Err(DomainError::validation("quantity must be positive"));
        }
        let key = StockKey::normalize(&cmd.warehouse, cmd.batch.as_deref())?;
        let current = self.quantity_at(&key);

        let balance_after = match cmd.direction {
            MovementDirection::In => current
                .checked_add(cmd.quantity)
                .ok_or_else(|| DomainError::invariant("stock quantity overflow"))?,
            MovementDirection::Out => {
                if cmd.quantity > current {
                    return Err(DomainError::invariant(format!(
                        "insufficient stock in {}/{}: available {current}, requested {}",
                        key.warehouse, key.batch, cmd.quantity
                    )));
                }
                current - cmd.quantity
            }
        };

        Ok(vec![InventoryEvent::StockMoved(StockMoved {
            tenant_id: cmd.tenant_id,
            item_id: cmd.item_id,
            direction: cmd.direction,
            key,
            quantity: cmd.quantity,
            balance_after,
            reference: cmd.reference.clone(),
            reason: cmd.reason.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_transfer(&self, cmd: &TransferStock) -> Result<Vec<InventoryEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.item_id)?;
        if cmd.quantity <= 0 {
            return Err(DomainError::validation("quantity must be positive"));
        }
        let from = StockKey::normalize(&cmd.from_warehouse, cmd.batch.as_deref())?;
        let to = StockKey::normalize(&cmd.to_warehouse, cmd.batch.as_deref())?;
        if from == to {
            return Err(DomainError::validation("source and destination warehouse are the same"));
        }
        let available = self.quantity_at(&from);
        if cmd.quantity > available {
            return Err(DomainError::invariant(format!(
                "insufficient stock in {}/{}: available {available}, requested {}",
                from.warehouse, from.batch, cmd.quantity
            )));
        }

        Ok(vec![InventoryEvent::StockTransferred(StockTransferred {
            tenant_id: cmd.tenant_id,
            item_id: cmd.item_id,
            from,
            to,
            quantity: cmd.quantity,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use estateerp_events::execute;
    use proptest::prelude::*;

    fn created() -> (InventoryItem, TenantId, InventoryItemId) {
        let tenant_id = TenantId::new();
        let item_id = InventoryItemId::generate();
        let mut item = InventoryItem::empty(item_id);
        execute(
            &mut item,
            &InventoryCommand::CreateItem(CreateItem {
                tenant_id,
                item_id,
                sku: "cem-53".to_string(),
                name: "Cement OPC 53".to_string(),
                unit: "bag".to_string(),
                hsn: Some("2523".to_string()),
                gst_rate: 2800,
                reorder_level: 100,
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        (item, tenant_id, item_id)
    }

    #[test]
    fn item_gst_rate_must_be_a_slab() {
        let item_id = InventoryItemId::generate();
        let err = InventoryItem::empty(item_id)
            .handle(&InventoryCommand::CreateItem(CreateItem {
                tenant_id: TenantId::new(),
                item_id,
                sku: "TMT-12".to_string(),
                name: "TMT bar 12mm".to_string(),
                unit: "kg".to_string(),
                hsn: None,
                gst_rate: 1500,
                reorder_level: 0,
                occurred_at: Utc::now(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    fn movement(
        tenant_id: TenantId,
        item_id: InventoryItemId,
        direction: MovementDirection,
        warehouse: &str,
        batch: Option<&str>,
        quantity: i64,
    ) -> InventoryCommand {
        InventoryCommand::RecordMovement(RecordMovement {
            tenant_id,
            item_id,
            direction,
            warehouse: warehouse.to_string(),
            batch: batch.map(str::to_string),
            quantity,
            reference: None,
            reason: None,
            occurred_at: Utc::now(),
        })
    }

    #[test]
    fn blank_batch_lands_in_default_batch() {
        let (mut item, tenant_id, item_id) = created();
        execute(
            &mut item,
            &movement(tenant_id, item_id, MovementDirection::In, " WH-1 ", Some("  "), 40),
        )
        .unwrap();
        let key = StockKey::normalize("WH-1", None).unwrap();
        assert_eq!(key.batch, DEFAULT_BATCH);
        assert_eq!(item.quantity_at(&key), 40);
        assert_eq!(item.sku(), "CEM-53");
    }

    #[test]
    fn outward_movement_cannot_exceed_tuple_quantity() {
        let (mut item, tenant_id, item_id) = created();
        execute(
            &mut item,
            &movement(tenant_id, item_id, MovementDirection::In, "WH-1", Some("B1"), 10),
        )
        .unwrap();
        execute(
            &mut item,
            &movement(tenant_id, item_id, MovementDirection::In, "WH-1", Some("B2"), 10),
        )
        .unwrap();

        // 20 in the warehouse, but only 10 in batch B1.
        let err = item
            .handle(&movement(tenant_id, item_id, MovementDirection::Out, "WH-1", Some("B1"), 11))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
        assert_eq!(item.quantity_in_warehouse("WH-1"), 20);
    }

    #[test]
    fn transfer_moves_quantity_between_warehouses() {
        let (mut item, tenant_id, item_id) = created();
        execute(
            &mut item,
            &movement(tenant_id, item_id, MovementDirection::In, "WH-1", None, 30),
        )
        .unwrap();
        execute(
            &mut item,
            &InventoryCommand::TransferStock(TransferStock {
                tenant_id,
                item_id,
                from_warehouse: "WH-1".to_string(),
                to_warehouse: "SITE-A".to_string(),
                batch: None,
                quantity: 12,
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        assert_eq!(item.quantity_in_warehouse("WH-1"), 18);
        assert_eq!(item.quantity_in_warehouse("SITE-A"), 12);
        assert_eq!(item.total_quantity(), 30);
    }

    #[derive(Debug, Clone)]
    struct Step {
        inward: bool,
        warehouse: usize,
        batch: usize,
        quantity: i64,
    }

    fn step() -> impl Strategy<Value = Step> {
        (any::<bool>(), 0usize..2, 0usize..3, 1i64..500).prop_map(|(inward, warehouse, batch, quantity)| Step {
            inward,
            warehouse,
            batch,
            quantity,
        })
    }

    proptest! {
        #![proptest_config(ProptestConfig { cases: 256, ..ProptestConfig::default() })]

        /// Per (warehouse, batch): quantity == initial + Σ accepted in − Σ accepted out.
        #[test]
        fn quantity_equals_initial_plus_in_minus_out(
            initial in 0i64..1_000,
            steps in prop::collection::vec(step(), 0..40),
        ) {
            const WAREHOUSES: [&str; 2] = ["WH-1", "SITE-A"];
            const BATCHES: [Option<&str>; 3] = [None, Some("B1"), Some("B2")];

            let (mut item, tenant_id, item_id) = created();
            let mut expected: BTreeMap<StockKey, i64> = BTreeMap::new();

            if initial > 0 {
                for w in WAREHOUSES {
                    for b in BATCHES {
                        execute(&mut item, &movement(tenant_id, item_id, MovementDirection::In, w, b, initial)).unwrap();
                        expected.insert(StockKey::normalize(w, b).unwrap(), initial);
                    }
                }
            }

            for s in steps {
                let direction = if s.inward { MovementDirection::In } else { MovementDirection::Out };
                let (w, b) = (WAREHOUSES[s.warehouse], BATCHES[s.batch]);
                let key = StockKey::normalize(w, b).unwrap();
                let before = expected.get(&key).copied().unwrap_or(0);

                match execute(&mut item, &movement(tenant_id, item_id, direction, w, b, s.quantity)) {
                    Ok(_) => {
                        expected.insert(key, before + direction.signed(s.quantity));
                    }
                    Err(_) => prop_assert!(!s.inward && s.quantity > before),
                }
            }

            for (key, qty) in &expected {
                prop_assert_eq!(item.quantity_at(key), *qty);
                prop_assert!(*qty >= 0);
            }
        }
    }
}
