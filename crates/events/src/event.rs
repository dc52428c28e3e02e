use chrono::{DateTime, Utc};

/// A fact recorded by an aggregate. Immutable once appended.
pub trait Event: Clone + core::fmt::Debug + Send + Sync + 'static {
    /// Stable dotted name, e.g. `"invoicing.invoice.issued"`.
    fn event_type(&self) -> &'static str;

    /// Payload schema version.
    fn version(&self) -> u32;

    /// Business time of the fact (not the append time).
    fn occurred_at(&self) -> DateTime<Utc>;
}
