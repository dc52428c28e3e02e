//! Event-sourcing mechanics shared by the ERP modules.
//!
//! Domain crates implement [`Event`] for their event enums; infra wraps them in
//! [`EventEnvelope`]s and fans them out over an [`EventBus`] to projections.

pub mod bus;
pub mod envelope;
pub mod event;
pub mod handler;
pub mod in_memory_bus;
pub mod tenant;

pub use bus::{EventBus, Subscription};
pub use envelope::{EventEnvelope, StreamPosition};
pub use event::Event;
pub use handler::execute;
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
pub use tenant::TenantScoped;
