use core::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use estateerp_core::{AggregateId, TenantId};

/// Where a committed event sits: one tenant's stream of one aggregate.
///
/// `sequence_number` is 1-based inside the `(tenant_id, aggregate_id)` stream.
/// `aggregate_type` routes the event to its read models (e.g.
/// `"accounting.voucher"`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StreamPosition {
    pub tenant_id: TenantId,
    pub aggregate_id: AggregateId,
    pub aggregate_type: String,
    pub sequence_number: u64,
}

impl StreamPosition {
    pub fn new(
        tenant_id: TenantId,
        aggregate_id: AggregateId,
        aggregate_type: impl Into<String>,
        sequence_number: u64,
    ) -> Self {
        Self {
            tenant_id,
            aggregate_id,
            aggregate_type: aggregate_type.into(),
            sequence_number,
        }
    }
}

impl fmt::Display for StreamPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}#{}",
            self.tenant_id, self.aggregate_type, self.aggregate_id, self.sequence_number
        )
    }
}

/// A committed event as it travels on the bus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEnvelope<E> {
    event_id: Uuid,
    position: StreamPosition,
    event_type: String,
    occurred_at: DateTime<Utc>,
    payload: E,
}

impl<E> EventEnvelope<E> {
    pub fn new(
        event_id: Uuid,
        position: StreamPosition,
        event_type: impl Into<String>,
        occurred_at: DateTime<Utc>,
        payload: E,
    ) -> Self {
        Self {
            event_id,
            position,
            event_type: event_type.into(),
            occurred_at,
            payload,
        }
    }

    pub fn event_id(&self) -> Uuid {
        self.event_id
    }

    pub fn position(&self) -> &StreamPosition {
        &self.position
    }

    pub fn tenant_id(&self) -> TenantId {
        self.position.tenant_id
    }

    pub fn aggregate_id(&self) -> AggregateId {
        self.position.aggregate_id
    }

    pub fn aggregate_type(&self) -> &str {
        &self.position.aggregate_type
    }

    pub fn sequence_number(&self) -> u64 {
        self.position.sequence_number
    }

    /// e.g. `"invoicing.invoice.issued"`.
    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }

    pub fn payload(&self) -> &E {
        &self.payload
    }
}
