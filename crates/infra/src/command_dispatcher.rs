//! Command execution pipeline for event-sourced aggregates.
//!
//! ```text
//! command
//!   -> load stream (tenant-scoped)
//!   -> validate stream (tenant, aggregate, monotonic sequence)
//!   -> rehydrate aggregate
//!   -> handle (pure decision)
//!   -> append with ExpectedVersion::Exact(loaded version)
//!   -> publish committed envelopes
//! ```
//!
//! No IO of its own; store and bus are injected.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use thiserror::Error;
use uuid::Uuid;

use estateerp_core::{Aggregate, AggregateId, DomainError, ExpectedVersion, TenantId};
use estateerp_events::{EventBus, EventEnvelope};

use crate::event_store::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};

#[derive(Debug, Error)]
pub enum DispatchError {
    /// Stale stream version (another writer got there first).
    #[error("concurrency conflict: {0}")]
    Concurrency(String),
    /// Business-level conflict (duplicate, already in that state).
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("tenant isolation violation: {0}")]
    TenantIsolation(String),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("invariant violated: {0}")]
    InvariantViolation(String),
    #[error("unauthorized")]
    Unauthorized,
    #[error("not found")]
    NotFound,
    /// Historical payloads do not decode into the aggregate's event type.
    #[error("failed to deserialize stored event: {0}")]
    Deserialize(String),
    #[error(transparent)]
    Store(EventStoreError),
    /// Publication failed after a successful append; events are persisted.
    #[error("event publication failed: {0}")]
    Publish(String),
}

impl From<EventStoreError> for DispatchError {
    fn from(value: EventStoreError) -> Self {
        match value {
            EventStoreError::Concurrency(msg) => DispatchError::Concurrency(msg),
            EventStoreError::TenantIsolation(msg) => DispatchError::TenantIsolation(msg),
            other => DispatchError::Store(other),
        }
    }
}

impl From<DomainError> for DispatchError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) => DispatchError::Validation(msg),
            DomainError::InvariantViolation(msg) => DispatchError::InvariantViolation(msg),
            DomainError::Conflict(msg) => DispatchError::Conflict(msg),
            DomainError::Unauthorized => DispatchError::Unauthorized,
            DomainError::NotFound => DispatchError::NotFound,
            DomainError::InvalidId(msg) => DispatchError::Validation(msg),
        }
    }
}

/// Reusable command execution engine.
///
/// Events are persisted before they are published; if publishing fails the
/// caller gets `DispatchError::Publish` and the events stay in the store.
/// Consumers are idempotent, so republishing is safe.
#[derive(Debug)]
pub struct CommandDispatcher<S, B> {
    store: S,
    bus: B,
}

impl<S, B> CommandDispatcher<S, B> {
    pub fn new(store: S, bus: B) -> Self {
        Self { store, bus }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }
}

impl<S, B> CommandDispatcher<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    /// Run `command` against the aggregate's current state.
    ///
    /// Returns the committed events; an empty vector when the command was a
    /// no-op for the current state.
    pub fn dispatch<A>(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
        aggregate_type: impl Into<String>,
        command: A::Command,
        make_aggregate: impl FnOnce(TenantId, AggregateId) -> A,
    ) -> Result<Vec<StoredEvent>, DispatchError>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: estateerp_events::Event + Serialize + DeserializeOwned,
    {
        let history = self.store.load_stream(tenant_id, aggregate_id)?;
        validate_loaded_stream(tenant_id, aggregate_id, &history)?;
        let expected = ExpectedVersion::Exact(stream_version(&history));

        let mut aggregate = make_aggregate(tenant_id, aggregate_id);
        apply_history::<A>(&mut aggregate, &history)?;

        let decided = aggregate.handle(&command).map_err(DispatchError::from)?;
        if decided.is_empty() {
            return Ok(vec![]);
        }

        let aggregate_type = aggregate_type.into();
        let uncommitted = decided
            .iter()
            .map(|ev| {
                UncommittedEvent::from_typed(
                    tenant_id,
                    aggregate_id,
                    aggregate_type.clone(),
                    Uuid::now_v7(),
                    ev,
                )
            })
            .collect::<Result<Vec<_>, _>>()?;

        let committed = self.store.append(uncommitted, expected)?;
        self.publish(&committed)?;

        Ok(committed)
    }

    /// Rehydrate an aggregate without handling a command.
    pub fn load<A>(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
        make_aggregate: impl FnOnce(TenantId, AggregateId) -> A,
    ) -> Result<A, DispatchError>
    where
        A: Aggregate,
        A::Event: DeserializeOwned,
    {
        let history = self.store.load_stream(tenant_id, aggregate_id)?;
        validate_loaded_stream(tenant_id, aggregate_id, &history)?;
        let mut aggregate = make_aggregate(tenant_id, aggregate_id);
        apply_history::<A>(&mut aggregate, &history)?;
        Ok(aggregate)
    }

    /// Publish already-committed events (dispatch and restore).
    pub fn publish(&self, committed: &[StoredEvent]) -> Result<(), DispatchError> {
        for stored in committed {
            self.bus
                .publish(stored.to_envelope())
                .map_err(|e| DispatchError::Publish(format!("{e:?}")))?;
        }
        Ok(())
    }
}

fn stream_version(stream: &[StoredEvent]) -> u64 {
    stream.last().map(|e| e.sequence_number).unwrap_or(0)
}

/// Tenant isolation is re-checked here even though the store filters by tenant.
fn validate_loaded_stream(
    tenant_id: TenantId,
    aggregate_id: AggregateId,
    stream: &[StoredEvent],
) -> Result<(), DispatchError> {
    let mut last = 0u64;
    for (idx, e) in stream.iter().enumerate() {
        if e.tenant_id != tenant_id {
            return Err(DispatchError::TenantIsolation(format!(
                "loaded stream contains wrong tenant_id at index {idx}"
            )));
        }
        if e.aggregate_id != aggregate_id {
            return Err(DispatchError::TenantIsolation(format!(
                "loaded stream contains wrong aggregate_id at index {idx}"
            )));
        }
        if e.sequence_number <= last {
            return Err(DispatchError::Store(EventStoreError::InvalidAppend(format!(
                "non-monotonic sequence_number in loaded stream (last={last}, found={})",
                e.sequence_number
            ))));
        }
        last = e.sequence_number;
    }
    Ok(())
}

fn apply_history<A>(aggregate: &mut A, history: &[StoredEvent]) -> Result<(), DispatchError>
where
    A: Aggregate,
    A::Event: DeserializeOwned,
{
    for stored in history {
        let ev: A::Event = serde_json::from_value(stored.payload.clone())
            .map_err(|e| DispatchError::Deserialize(e.to_string()))?;
        aggregate.apply(&ev);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::sync::Arc;

    use estateerp_core::AggregateRoot;
    use estateerp_crm::{CaptureLead, Lead, LeadCommand, LeadId};
    use estateerp_events::InMemoryEventBus;

    use crate::event_store::InMemoryEventStore;
    use crate::streams;

    type Dispatcher =
        CommandDispatcher<Arc<InMemoryEventStore>, Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>>;

    fn capture(tenant_id: TenantId, lead_id: LeadId, name: &str) -> LeadCommand {
        LeadCommand::CaptureLead(CaptureLead {
            tenant_id,
            lead_id,
            name: name.to_string(),
            phone: Some("9820012345".to_string()),
            email: None,
            source: Some("walk-in".to_string()),
            interest: None,
            budget: None,
            status: None,
            occurred_at: Utc::now(),
        })
    }

    fn dispatcher() -> Dispatcher {
        CommandDispatcher::new(
            Arc::new(InMemoryEventStore::new()),
            Arc::new(InMemoryEventBus::new()),
        )
    }

    #[test]
    fn dispatch_appends_then_publishes() {
        let d = dispatcher();
        let sub = d.bus().subscribe();
        let tenant = TenantId::new();
        let lead_id = LeadId::generate();

        let committed = d
            .dispatch::<Lead>(
                tenant,
                lead_id.0,
                streams::LEAD,
                capture(tenant, lead_id, "Asha Patil"),
                |_, id| Lead::empty(LeadId::new(id)),
            )
            .unwrap();
        assert_eq!(committed.len(), 1);
        assert_eq!(committed[0].sequence_number, 1);

        let env = sub.try_recv().unwrap();
        assert_eq!(env.aggregate_type(), streams::LEAD);
        assert_eq!(env.tenant_id(), tenant);

        let lead: Lead = d.load(tenant, lead_id.0, |_, id| Lead::empty(LeadId::new(id))).unwrap();
        assert_eq!(lead.version(), 1);
        assert_eq!(lead.name(), "Asha Patil");
    }

    #[test]
    fn duplicate_create_maps_to_conflict() {
        let d = dispatcher();
        let tenant = TenantId::new();
        let lead_id = LeadId::generate();
        let make = |_: TenantId, id: AggregateId| Lead::empty(LeadId::new(id));

        d.dispatch::<Lead>(tenant, lead_id.0, streams::LEAD, capture(tenant, lead_id, "A"), make)
            .unwrap();
        let err = d
            .dispatch::<Lead>(tenant, lead_id.0, streams::LEAD, capture(tenant, lead_id, "A"), make)
            .unwrap_err();
        assert!(matches!(err, DispatchError::Conflict(_)));
    }

    #[test]
    fn streams_are_invisible_to_other_tenants() {
        let d = dispatcher();
        let owner = TenantId::new();
        let lead_id = LeadId::generate();
        let make = |_: TenantId, id: AggregateId| Lead::empty(LeadId::new(id));
        d.dispatch::<Lead>(owner, lead_id.0, streams::LEAD, capture(owner, lead_id, "A"), make)
            .unwrap();

        let other: Lead = d.load(TenantId::new(), lead_id.0, make).unwrap();
        assert_eq!(other.version(), 0);
    }
}
