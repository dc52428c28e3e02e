//! Append-only event store boundary.
//!
//! The trait is storage-agnostic; `InMemoryEventStore` backs tests and local
//! runs, `PostgresEventStore` backs persistent deployments.

pub mod in_memory;
pub mod postgres;
pub mod r#trait;

pub use in_memory::InMemoryEventStore;
pub use postgres::PostgresEventStore;
pub use r#trait::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};
