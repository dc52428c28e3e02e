//! JSON backup of a tenant's event log, and restore into an empty tenant.
//!
//! Every event keeps its id, stream and sequence number, so a restored tenant
//! is indistinguishable from the original. Read models are rebuilt by
//! republishing the restored events.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::info;
use uuid::Uuid;

use estateerp_core::{AggregateId, ExpectedVersion, TenantId};
use estateerp_events::{EventBus, EventEnvelope};

use super::DataError;
use crate::command_dispatcher::CommandDispatcher;
use crate::event_store::{EventStore, StoredEvent};

pub const BACKUP_FORMAT: &str = "estateerp.backup.v1";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupDocument {
    pub format: String,
    pub exported_at: DateTime<Utc>,
    pub tenant_id: TenantId,
    /// Commit order.
    pub events: Vec<StoredEvent>,
}

impl BackupDocument {
    pub fn to_json(&self) -> Result<String, DataError> {
        serde_json::to_string_pretty(self).map_err(|e| DataError::Json(e.to_string()))
    }

    pub fn from_json(text: &str) -> Result<Self, DataError> {
        serde_json::from_str(text).map_err(|e| DataError::Json(e.to_string()))
    }

    /// Format, tenant and per-stream sequence checks.
    pub fn validate(&self) -> Result<(), DataError> {
        if self.format != BACKUP_FORMAT {
            return Err(DataError::Invalid(format!(
                "unsupported backup format '{}', expected '{BACKUP_FORMAT}'",
                self.format
            )));
        }
        let mut last: HashMap<AggregateId, u64> = HashMap::new();
        for (idx, e) in self.events.iter().enumerate() {
            if e.tenant_id != self.tenant_id {
                return Err(DataError::Invalid(format!(
                    "event {idx} belongs to another tenant"
                )));
            }
            let prev = last.entry(e.aggregate_id).or_insert(0);
            if e.sequence_number != *prev + 1 {
                return Err(DataError::Invalid(format!(
                    "stream {} jumps from {} to {} at event {idx}",
                    e.aggregate_id, prev, e.sequence_number
                )));
            }
            *prev = e.sequence_number;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RestoreReport {
    pub streams: usize,
    pub events: usize,
}

pub fn export_tenant<S: EventStore>(store: &S, tenant_id: TenantId) -> Result<BackupDocument, DataError> {
    let events = store.load_tenant(tenant_id)?;
    info!(tenant_id = %tenant_id, events = events.len(), "tenant exported");
    Ok(BackupDocument {
        format: BACKUP_FORMAT.to_string(),
        exported_at: Utc::now(),
        tenant_id,
        events,
    })
}

/// Re-append a backup into `tenant_id`, which must have no events yet, then
/// republish the events in their original order.
pub fn restore_tenant<S, B>(
    dispatcher: &CommandDispatcher<S, B>,
    tenant_id: TenantId,
    document: &BackupDocument,
) -> Result<RestoreReport, DataError>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    if document.tenant_id != tenant_id {
        return Err(DataError::Invalid(
            "backup was taken from another tenant".to_string(),
        ));
    }
    document.validate()?;

    let existing = dispatcher.store().load_tenant(tenant_id)?;
    if !existing.is_empty() {
        return Err(DataError::TenantNotEmpty(existing.len()));
    }

    let mut streams: BTreeMap<AggregateId, Vec<&StoredEvent>> = BTreeMap::new();
    for e in &document.events {
        streams.entry(e.aggregate_id).or_default().push(e);
    }

    let mut committed: HashMap<Uuid, StoredEvent> = HashMap::with_capacity(document.events.len());
    for events in streams.values() {
        let batch = events.iter().map(|e| e.to_uncommitted()).collect();
        for stored in dispatcher.store().append(batch, ExpectedVersion::Exact(0))? {
            committed.insert(stored.event_id, stored);
        }
    }

    let ordered: Vec<StoredEvent> = document
        .events
        .iter()
        .filter_map(|e| committed.remove(&e.event_id))
        .collect();
    dispatcher.publish(&ordered)?;

    info!(
        tenant_id = %tenant_id,
        streams = streams.len(),
        events = ordered.len(),
        "tenant restored"
    );
    Ok(RestoreReport {
        streams: streams.len(),
        events: ordered.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use estateerp_crm::{CaptureLead, Lead, LeadCommand, LeadId};
    use estateerp_events::InMemoryEventBus;

    use crate::event_store::InMemoryEventStore;
    use crate::streams;

    type Dispatcher =
        CommandDispatcher<Arc<InMemoryEventStore>, Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>>;

    fn dispatcher() -> Dispatcher {
        CommandDispatcher::new(Arc::new(InMemoryEventStore::new()), Arc::new(InMemoryEventBus::new()))
    }

    fn capture(d: &Dispatcher, t: TenantId, name: &str) -> LeadId {
        let id = LeadId::generate();
        d.dispatch::<Lead>(
            t,
            id.0,
            streams::LEAD,
            LeadCommand::CaptureLead(CaptureLead {
                tenant_id: t,
                lead_id: id,
                name: name.to_string(),
                phone: Some("9820098200".to_string()),
                email: None,
                source: None,
                interest: None,
                budget: None,
                status: None,
                occurred_at: Utc::now(),
            }),
            |_, a| Lead::empty(LeadId::new(a)),
        )
        .unwrap();
        id
    }

    #[test]
    fn backup_restores_into_a_fresh_store_with_ids_preserved() {
        let source = dispatcher();
        let t = TenantId::new();
        capture(&source, t, "Asha");
        capture(&source, t, "Bilal");
        capture(&source, TenantId::new(), "Other tenant");

        let doc = export_tenant(source.store(), t).unwrap();
        assert_eq!(doc.events.len(), 2);
        let parsed = BackupDocument::from_json(&doc.to_json().unwrap()).unwrap();
        assert_eq!(parsed, doc);

        let target = dispatcher();
        let sub = target.bus().subscribe();
        let report = restore_tenant(&target, t, &parsed).unwrap();
        assert_eq!(report, RestoreReport { streams: 2, events: 2 });

        let restored = target.store().load_tenant(t).unwrap();
        let ids: Vec<_> = restored.iter().map(|e| e.event_id).collect();
        let original: Vec<_> = doc.events.iter().map(|e| e.event_id).collect();
        assert_eq!(ids.len(), 2);
        assert!(original.iter().all(|id| ids.contains(id)));

        let first = sub.recv_timeout(Duration::from_secs(1)).unwrap();
        assert_eq!(first.event_id(), doc.events[0].event_id);
    }

    #[test]
    fn restore_refuses_a_tenant_with_data() {
        let d = dispatcher();
        let t = TenantId::new();
        capture(&d, t, "Asha");
        let doc = export_tenant(d.store(), t).unwrap();

        let err = restore_tenant(&d, t, &doc).unwrap_err();
        assert!(matches!(err, DataError::TenantNotEmpty(1)));
    }

    #[test]
    fn tampered_documents_are_rejected() {
        let d = dispatcher();
        let t = TenantId::new();
        capture(&d, t, "Asha");
        let mut doc = export_tenant(d.store(), t).unwrap();

        let mut wrong_format = doc.clone();
        wrong_format.format = "something-else".to_string();
        assert!(matches!(wrong_format.validate(), Err(DataError::Invalid(_))));

        doc.events[0].sequence_number = 2;
        assert!(matches!(restore_tenant(&dispatcher(), t, &doc), Err(DataError::Invalid(_))));
        assert!(matches!(
            restore_tenant(&dispatcher(), TenantId::new(), &doc),
            Err(DataError::Invalid(_))
        ));
    }
}
