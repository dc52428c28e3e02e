use std::collections::HashMap;
use std::sync::RwLock;

use estateerp_core::{AggregateId, ExpectedVersion, TenantId};

use super::r#trait::{EventStore, EventStoreError, StoredEvent, UncommittedEvent, validate_batch};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
struct StreamKey {
    tenant_id: TenantId,
    aggregate_id: AggregateId,
}

#[derive(Debug, Default)]
struct Inner {
    streams: HashMap<StreamKey, Vec<StoredEvent>>,
    /// Commit order: (stream, index into the stream).
    log: Vec<(StreamKey, usize)>,
}

/// In-memory append-only event store for tests and local development.
#[derive(Debug, Default)]
pub struct InMemoryEventStore {
    inner: RwLock<Inner>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn current_version(stream: &[StoredEvent]) -> u64 {
        stream.last().map(|e| e.sequence_number).unwrap_or(0)
    }

    fn collect(&self, filter: impl Fn(&StreamKey) -> bool) -> Result<Vec<StoredEvent>, EventStoreError> {
        let inner = self
            .inner
            .read()
            .map_err(|_| EventStoreError::Backend("lock poisoned".to_string()))?;

        Ok(inner
            .log
            .iter()
            .filter(|(key, _)| filter(key))
            .filter_map(|(key, idx)| inner.streams.get(key).and_then(|s| s.get(*idx)).cloned())
            .collect())
    }
}

impl EventStore for InMemoryEventStore {
    fn append(
        &self,
        events: Vec<UncommittedEvent>,
        expected_version: ExpectedVersion,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        validate_batch(&events)?;
        let Some(first) = events.first() else {
            return Ok(vec![]);
        };

        let key = StreamKey {
            tenant_id: first.tenant_id,
            aggregate_id: first.aggregate_id,
        };
        let aggregate_type = first.aggregate_type.clone();

        let mut inner = self
            .inner
            .write()
            .map_err(|_| EventStoreError::Backend("lock poisoned".to_string()))?;
        let inner = &mut *inner;

        let stream = inner.streams.entry(key).or_default();
        let current = Self::current_version(stream);

        if !expected_version.matches(current) {
            return Err(EventStoreError::Concurrency(format!(
                "expected {expected_version:?}, found {current}"
            )));
        }

        if let Some(existing) = stream.first() {
            if existing.aggregate_type != aggregate_type {
                return Err(EventStoreError::AggregateTypeMismatch(format!(
                    "stream aggregate_type is '{}', attempted append with '{}'",
                    existing.aggregate_type, aggregate_type
                )));
            }
        }

        let mut next = current + 1;
        let mut committed = Vec::with_capacity(events.len());
        for e in events {
            let stored = StoredEvent {
                event_id: e.event_id,
                tenant_id: e.tenant_id,
                aggregate_id: e.aggregate_id,
                aggregate_type: e.aggregate_type,
                sequence_number: next,
                event_type: e.event_type,
                event_version: e.event_version,
                occurred_at: e.occurred_at,
                payload: e.payload,
            };
            next += 1;
            inner.log.push((key, stream.len()));
            stream.push(stored.clone());
            committed.push(stored);
        }

        Ok(committed)
    }

    fn load_stream(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        let key = StreamKey {
            tenant_id,
            aggregate_id,
        };

        let inner = self
            .inner
            .read()
            .map_err(|_| EventStoreError::Backend("lock poisoned".to_string()))?;

        Ok(inner.streams.get(&key).cloned().unwrap_or_default())
    }

    fn load_tenant(&self, tenant_id: TenantId) -> Result<Vec<StoredEvent>, EventStoreError> {
        self.collect(|key| key.tenant_id == tenant_id)
    }

    fn load_all(&self) -> Result<Vec<StoredEvent>, EventStoreError> {
        self.collect(|_| true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;
    use uuid::Uuid;

    fn event(tenant_id: TenantId, aggregate_id: AggregateId, n: u32) -> UncommittedEvent {
        UncommittedEvent {
            event_id: Uuid::now_v7(),
            tenant_id,
            aggregate_id,
            aggregate_type: "crm.lead".to_string(),
            event_type: "crm.lead.captured".to_string(),
            event_version: 1,
            occurred_at: Utc::now(),
            payload: json!({ "n": n }),
        }
    }

    #[test]
    fn sequence_numbers_continue_per_stream() {
        let store = InMemoryEventStore::new();
        let tenant = TenantId::new();
        let a = AggregateId::new();

        let first = store
            .append(vec![event(tenant, a, 1), event(tenant, a, 2)], ExpectedVersion::Exact(0))
            .unwrap();
        assert_eq!(first.iter().map(|e| e.sequence_number).collect::<Vec<_>>(), vec![1, 2]);

        let stale = store.append(vec![event(tenant, a, 3)], ExpectedVersion::Exact(1));
        assert!(matches!(stale, Err(EventStoreError::Concurrency(_))));

        let next = store.append(vec![event(tenant, a, 3)], ExpectedVersion::Exact(2)).unwrap();
        assert_eq!(next[0].sequence_number, 3);
    }

    #[test]
    fn mixed_tenant_batches_are_rejected() {
        let store = InMemoryEventStore::new();
        let a = AggregateId::new();
        let res = store.append(
            vec![event(TenantId::new(), a, 1), event(TenantId::new(), a, 2)],
            ExpectedVersion::Any,
        );
        assert!(matches!(res, Err(EventStoreError::TenantIsolation(_))));
    }

    #[test]
    fn tenant_load_keeps_commit_order_and_isolation() {
        let store = InMemoryEventStore::new();
        let t1 = TenantId::new();
        let t2 = TenantId::new();
        let (a, b, c) = (AggregateId::new(), AggregateId::new(), AggregateId::new());

        store.append(vec![event(t1, a, 1)], ExpectedVersion::Any).unwrap();
        store.append(vec![event(t2, c, 2)], ExpectedVersion::Any).unwrap();
        store.append(vec![event(t1, b, 3)], ExpectedVersion::Any).unwrap();
        store.append(vec![event(t1, a, 4)], ExpectedVersion::Any).unwrap();

        let loaded: Vec<_> = store
            .load_tenant(t1)
            .unwrap()
            .into_iter()
            .map(|e| e.payload["n"].as_u64().unwrap())
            .collect();
        assert_eq!(loaded, vec![1, 3, 4]);
        assert_eq!(store.load_all().unwrap().len(), 4);
    }
}
