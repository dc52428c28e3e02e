use std::collections::HashMap;
use std::sync::RwLock;

use serde_json::Value as JsonValue;

use estateerp_core::{AggregateId, TenantId};
use estateerp_events::EventEnvelope;

use super::ProjectionError;

/// Last applied sequence number per `(tenant, aggregate)` stream.
///
/// `admit` decides whether an envelope is new (apply it), a replay (skip it) or
/// out of order (error); `advance` records it once the read model is updated.
#[derive(Debug, Default)]
pub struct StreamCursors {
    inner: RwLock<HashMap<(TenantId, AggregateId), u64>>,
}

impl StreamCursors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last(&self, tenant_id: TenantId, aggregate_id: AggregateId) -> u64 {
        match self.inner.read() {
            Ok(map) => map.get(&(tenant_id, aggregate_id)).copied().unwrap_or(0),
            Err(_) => 0,
        }
    }

    /// `Ok(true)` to apply, `Ok(false)` for an already-applied envelope.
    ///
    /// A stream first seen mid-way is accepted so a projection can be attached
    /// to a running bus; once a cursor exists, gaps are errors.
    pub fn admit(&self, envelope: &EventEnvelope<JsonValue>) -> Result<bool, ProjectionError> {
        let last = self.last(envelope.tenant_id(), envelope.aggregate_id());
        let seq = envelope.sequence_number();
        if seq == 0 {
            return Err(ProjectionError::NonMonotonicSequence { last, found: seq });
        }
        if seq <= last {
            return Ok(false);
        }
        if last != 0 && seq != last + 1 {
            return Err(ProjectionError::NonMonotonicSequence { last, found: seq });
        }
        Ok(true)
    }

    pub fn advance(&self, envelope: &EventEnvelope<JsonValue>) {
        if let Ok(mut map) = self.inner.write() {
            map.insert(
                (envelope.tenant_id(), envelope.aggregate_id()),
                envelope.sequence_number(),
            );
        }
    }

    pub fn clear_tenant(&self, tenant_id: TenantId) {
        if let Ok(mut map) = self.inner.write() {
            map.retain(|(t, _), _| *t != tenant_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use estateerp_events::StreamPosition;
    use serde_json::json;
    use uuid::Uuid;

    fn env(tenant_id: TenantId, aggregate_id: AggregateId, seq: u64) -> EventEnvelope<JsonValue> {
        EventEnvelope::new(
            Uuid::now_v7(),
            StreamPosition::new(tenant_id, aggregate_id, "crm.lead", seq),
            "crm.lead.captured",
            Utc::now(),
            json!({}),
        )
    }

    #[test]
    fn replays_are_skipped_and_gaps_rejected() {
        let cursors = StreamCursors::new();
        let (t, a) = (TenantId::new(), AggregateId::new());

        assert!(cursors.admit(&env(t, a, 1)).unwrap());
        cursors.advance(&env(t, a, 1));
        assert!(!cursors.admit(&env(t, a, 1)).unwrap());
        assert!(cursors.admit(&env(t, a, 2)).unwrap());
        assert!(matches!(
            cursors.admit(&env(t, a, 4)),
            Err(ProjectionError::NonMonotonicSequence { last: 1, found: 4 })
        ));
        assert!(cursors.admit(&env(t, a, 0)).is_err());

        cursors.clear_tenant(t);
        assert_eq!(cursors.last(t, a), 0);
    }
}
