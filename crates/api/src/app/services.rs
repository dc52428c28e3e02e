//! Infrastructure wiring behind the routes: event store and bus, dispatcher,
//! read models with their projection worker, number series and mailer.

use std::sync::{Arc, Mutex};

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::info;

use estateerp_auth::RolePolicy;
use estateerp_core::{Aggregate, AggregateId, DomainError, TenantId};
use estateerp_events::{EventEnvelope, InMemoryEventBus};
use estateerp_infra::command_dispatcher::{CommandDispatcher, DispatchError};
use estateerp_infra::config::AppConfig;
use estateerp_infra::event_store::{
    EventStore, EventStoreError, InMemoryEventStore, PostgresEventStore, StoredEvent,
};
use estateerp_infra::mail::OutboxMailer;
use estateerp_infra::numbering::NumberSeries;
use estateerp_infra::projections::ReadModels;
use estateerp_infra::worker::{ProjectionWorker, WorkerHandle};

pub type Store = Arc<dyn EventStore>;
pub type Bus = Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>;
pub type Dispatcher = CommandDispatcher<Store, Bus>;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Store(#[from] EventStoreError),
    #[error("failed to start the projection worker: {0}")]
    Worker(#[from] std::io::Error),
}

pub struct AppServices {
    pub config: AppConfig,
    pub policy: RolePolicy,
    pub dispatcher: Dispatcher,
    pub read_models: Arc<ReadModels>,
    pub numbers: Arc<NumberSeries>,
    pub mailer: Arc<OutboxMailer>,
    worker: Mutex<Option<WorkerHandle>>,
}

impl AppServices {
    pub fn dispatch<A>(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
        aggregate_type: &'static str,
        command: A::Command,
        make_aggregate: impl FnOnce(TenantId, AggregateId) -> A,
    ) -> Result<Vec<StoredEvent>, DispatchError>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: estateerp_events::Event + Serialize + DeserializeOwned,
    {
        self.dispatcher
            .dispatch::<A>(tenant_id, aggregate_id, aggregate_type, command, make_aggregate)
    }

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
        self.dispatcher.load(tenant_id, aggregate_id, make_aggregate)
    }

    /// Stop the projection worker. Later calls are no-ops.
    pub fn shutdown(&self) {
        let handle = match self.worker.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(handle) = handle {
            handle.shutdown();
            info!("projection worker stopped");
        }
    }
}

/// Open the configured event store, rebuild read models from its history and
/// start feeding them from the bus.
pub async fn build_services(config: AppConfig) -> Result<AppServices, StartupError> {
    let (store, history): (Store, Vec<StoredEvent>) = match config.database_url.as_deref() {
        Some(url) if config.use_persistent_stores => {
            let pg = PostgresEventStore::connect(url).await?;
            let history = pg.load_all_async().await?;
            info!(events = history.len(), "using the Postgres event store");
            (Arc::new(pg), history)
        }
        _ => {
            info!("using the in-memory event store");
            (Arc::new(InMemoryEventStore::new()), Vec::new())
        }
    };

    let bus: Bus = Arc::new(InMemoryEventBus::new());
    let numbers = Arc::new(NumberSeries::new());
    let read_models = Arc::new(ReadModels::new(numbers.clone()));
    read_models.rebuild(&history);
    let worker = ProjectionWorker::spawn_read_models(&bus, read_models.clone())?;

    Ok(AppServices {
        config,
        policy: RolePolicy::default(),
        dispatcher: CommandDispatcher::new(store, bus),
        read_models,
        numbers,
        mailer: Arc::new(OutboxMailer::new()),
        worker: Mutex::new(Some(worker)),
    })
}
