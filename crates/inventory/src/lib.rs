//! Inventory and manufacturing domain module (event-sourced).
//!
//! Stock is tracked per (item, warehouse, batch). Bills of material and
//! production orders live here too since they only reference inventory items.

pub mod bom;
pub mod item;
pub mod production;

pub use bom::{
    BillOfMaterial, BomCommand, BomComponent, BomCreated, BomDeactivated, BomEvent, BomId,
    BomRevised, CreateBom, DeactivateBom, ReviseBom,
};
pub use item::{
    CreateItem, DEFAULT_BATCH, InventoryCommand, InventoryEvent, InventoryItem, InventoryItemId,
    ItemCreated, MovementDirection, RecordMovement, StockKey, StockMoved, StockTransferred,
    TransferStock,
};
pub use production::{
    CancelProduction, CompleteProduction, PlanProduction, ProductionCancelled,
    ProductionCommand, ProductionCompleted, ProductionEvent, ProductionOrder, ProductionOrderId,
    ProductionPlanned, ProductionStarted, ProductionStatus, Requirement, StartProduction,
    compute_requirements,
};
