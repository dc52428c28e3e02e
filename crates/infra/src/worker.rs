//! Background consumer that keeps the read models in step with the bus.

use std::io;
use std::sync::{Arc, mpsc};
use std::thread;
use std::time::Duration;

use serde_json::Value as JsonValue;
use tracing::{debug, warn};

use estateerp_core::TenantId;
use estateerp_events::{EventBus, EventEnvelope, Subscription, TenantScoped};

use crate::projections::ReadModels;

const TICK: Duration = Duration::from_millis(250);

/// Stops and joins a running worker.
#[derive(Debug)]
pub struct WorkerHandle {
    shutdown: mpsc::Sender<()>,
    join: Option<thread::JoinHandle<()>>,
}

impl WorkerHandle {
    pub fn shutdown(mut self) {
        let _ = self.shutdown.send(());
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

#[derive(Debug)]
pub struct ProjectionWorker;

impl ProjectionWorker {
    /// Subscribe to `bus` and run `handler` for every message on a named thread.
    ///
    /// With `tenant_id` set, messages of other tenants are dropped. The handler
    /// must tolerate redelivery.
    pub fn spawn<M, B, H, E>(
        name: &'static str,
        bus: &B,
        tenant_id: Option<TenantId>,
        mut handler: H,
    ) -> io::Result<WorkerHandle>
    where
        M: TenantScoped + Send + 'static,
        B: EventBus<M>,
        H: FnMut(M) -> Result<(), E> + Send + 'static,
        E: core::fmt::Debug + Send + 'static,
    {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let sub: Subscription<M> = bus.subscribe();

        let join = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || worker_loop(name, sub, shutdown_rx, tenant_id, &mut handler))?;

        Ok(WorkerHandle {
            shutdown: shutdown_tx,
            join: Some(join),
        })
    }

    /// Feed every committed envelope into the application's read models.
    pub fn spawn_read_models<B>(bus: &B, read_models: Arc<ReadModels>) -> io::Result<WorkerHandle>
    where
        B: EventBus<EventEnvelope<JsonValue>>,
    {
        Self::spawn("read-models", bus, None, move |env: EventEnvelope<JsonValue>| {
            debug!(position = %env.position(), event_type = env.event_type(), "applying envelope");
            read_models.apply(&env);
            Ok::<(), std::convert::Infallible>(())
        })
    }
}

fn worker_loop<M, H, E>(
    name: &'static str,
    sub: Subscription<M>,
    shutdown_rx: mpsc::Receiver<()>,
    tenant_id: Option<TenantId>,
    handler: &mut H,
) where
    M: TenantScoped,
    H: FnMut(M) -> Result<(), E>,
    E: core::fmt::Debug,
{
    loop {
        if shutdown_rx.try_recv().is_ok() {
            break;
        }

        match sub.recv_timeout(TICK) {
            Ok(msg) => {
                if tenant_id.is_some_and(|t| msg.tenant_id() != t) {
                    continue;
                }
                if let Err(err) = handler(msg) {
                    warn!(worker = name, error = ?err, "worker handler failed");
                }
            }
            Err(mpsc::RecvTimeoutError::Timeout) => continue,
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    use chrono::Utc;
    use estateerp_crm::{CaptureLead, Lead, LeadCommand, LeadId};
    use estateerp_events::{InMemoryEventBus, StreamPosition};

    use crate::command_dispatcher::CommandDispatcher;
    use crate::event_store::InMemoryEventStore;
    use crate::numbering::NumberSeries;
    use crate::streams;

    #[test]
    fn worker_applies_published_events_to_read_models() {
        let bus = Arc::new(InMemoryEventBus::<EventEnvelope<JsonValue>>::new());
        let read_models = Arc::new(ReadModels::new(Arc::new(NumberSeries::new())));
        let handle = ProjectionWorker::spawn_read_models(&bus, read_models.clone()).unwrap();

        let dispatcher = CommandDispatcher::new(Arc::new(InMemoryEventStore::new()), bus.clone());
        let tenant = TenantId::new();
        let lead_id = LeadId::generate();
        dispatcher
            .dispatch::<Lead>(
                tenant,
                lead_id.0,
                streams::LEAD,
                LeadCommand::CaptureLead(CaptureLead {
                    tenant_id: tenant,
                    lead_id,
                    name: "Ravi Kulkarni".to_string(),
                    phone: None,
                    email: Some("ravi@example.in".to_string()),
                    source: None,
                    interest: Some("2BHK".to_string()),
                    budget: Some(75_00_000_00),
                    status: None,
                    occurred_at: Utc::now(),
                }),
                |_, id| Lead::empty(LeadId::new(id)),
            )
            .unwrap();

        let deadline = Instant::now() + Duration::from_secs(2);
        while read_models.leads.get(tenant, &lead_id).is_none() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        let lead = read_models.leads.get(tenant, &lead_id).unwrap();
        assert_eq!(lead.name, "Ravi Kulkarni");

        handle.shutdown();
    }

    #[test]
    fn tenant_filter_drops_foreign_messages() {
        let bus = InMemoryEventBus::<EventEnvelope<JsonValue>>::new();
        let mine = TenantId::new();
        let (tx, rx) = mpsc::channel();
        let handle = ProjectionWorker::spawn("filtered", &bus, Some(mine), move |env: EventEnvelope<JsonValue>| {
            tx.send(env.tenant_id()).map_err(|_| "closed")
        })
        .unwrap();

        let env = |t| {
            EventEnvelope::new(
                uuid::Uuid::now_v7(),
                StreamPosition::new(t, estateerp_core::AggregateId::new(), streams::LEAD, 1),
                "crm.lead.captured",
                Utc::now(),
                JsonValue::Null,
            )
        };
        bus.publish(env(TenantId::new())).unwrap();
        bus.publish(env(mine)).unwrap();

        assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), mine);
        handle.shutdown();
    }
}
