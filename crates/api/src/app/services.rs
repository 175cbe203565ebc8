use std::{convert::Infallible, io, sync::Arc, sync::Mutex, time::Duration};

use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio_stream::{StreamExt, wrappers::BroadcastStream};

use branchpos_core::{AccountId, AggregateId};
use branchpos_events::{EventEnvelope, InMemoryEventBus};
use branchpos_infra::{
    command_dispatcher::{CommandDispatcher, Committed, DispatchError, UnitOfWork},
    event_store::{EventStore, EventStoreError, InMemoryEventStore, PostgresEventStore, StoredEvent},
    jobs::{ReservationExpirySweeper, SweepReport},
    projections::{ProjectionError, ReadModels},
    streams::EventSourced,
    workers::{ProjectionWorker, WorkerHandle},
};

use crate::config::{AppConfig, StoreBackend};

pub type SharedStore = Arc<dyn EventStore>;
pub type SharedBus = Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>;
pub type Dispatcher = CommandDispatcher<SharedStore, SharedBus>;

/// Realtime message broadcasted via SSE.
#[derive(Debug, Clone, serde::Serialize)]
pub struct RealtimeMessage {
    pub account_id: AccountId,
    pub topic: String,
    pub payload: JsonValue,
}

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("event store unavailable: {0}")]
    Store(#[from] EventStoreError),

    #[error("read model rebuild failed: {0}")]
    Projection(#[from] ProjectionError),

    #[error("failed to start background worker: {0}")]
    Worker(#[from] io::Error),
}

/// Everything the handlers share: the write path (dispatcher), the read
/// side, the expiry sweeper and the realtime fan-out.
pub struct AppServices {
    dispatcher: Arc<Dispatcher>,
    read_models: Arc<ReadModels>,
    sweeper: Arc<ReservationExpirySweeper<SharedStore, SharedBus>>,
    realtime_tx: broadcast::Sender<RealtimeMessage>,
    workers: Mutex<Vec<WorkerHandle>>,
}

pub async fn build_services(config: &AppConfig) -> Result<AppServices, StartupError> {
    let (store, history): (SharedStore, Vec<StoredEvent>) = match &config.store {
        StoreBackend::InMemory => {
            let store: SharedStore = Arc::new(InMemoryEventStore::new());
            (store, Vec::new())
        }
        StoreBackend::Postgres { database_url } => {
            let pg = PostgresEventStore::connect(database_url).await?;
            let history = pg.load_all_async().await?;
            let store: SharedStore = Arc::new(pg);
            (store, history)
        }
    };
    let bus: SharedBus = Arc::new(InMemoryEventBus::new());

    // Read models live in memory; rebuild them from the log before serving.
    let read_models = Arc::new(ReadModels::new());
    read_models.rebuild(&history)?;

    let dispatcher = Arc::new(
        CommandDispatcher::new(Arc::clone(&store), Arc::clone(&bus))
            .with_max_attempts(config.transaction_max_attempts),
    );

    // Realtime channel (SSE): lossy broadcast, account-filtered in handlers.
    let (realtime_tx, _realtime_rx) = broadcast::channel::<RealtimeMessage>(256);

    let mut workers = Vec::new();

    // Background subscriber: bus -> read models -> realtime.
    {
        let read_models = Arc::clone(&read_models);
        let store = Arc::clone(&store);
        let realtime_tx = realtime_tx.clone();
        workers.push(ProjectionWorker::spawn(
            "read-models",
            &bus,
            None,
            move |env: EventEnvelope<JsonValue>| -> Result<(), ProjectionError> {
                read_models.apply_or_catch_up(&env, &store)?;

                // Lossy; no backpressure on the write path.
                let _ = realtime_tx.send(RealtimeMessage {
                    account_id: env.account_id(),
                    topic: env.projection_topic(),
                    payload: serde_json::json!({
                        "kind": "projection_update",
                        "aggregate_type": env.aggregate_type(),
                        "event_type": env.event_type(),
                        "aggregate_id": env.aggregate_id().to_string(),
                        "sequence_number": env.sequence_number(),
                    }),
                });
                Ok(())
            },
        )?);
    }

    let sweeper = Arc::new(ReservationExpirySweeper::new(
        Arc::clone(&dispatcher),
        Arc::clone(&read_models),
    ));
    if let Some(interval) = config.reservation_sweep_interval {
        workers.push(Arc::clone(&sweeper).spawn(interval)?);
        tracing::info!(interval_secs = interval.as_secs(), "reservation expiry sweeper started");
    }

    tracing::info!(
        replayed_events = history.len(),
        persistent = matches!(config.store, StoreBackend::Postgres { .. }),
        "services ready"
    );

    Ok(AppServices {
        dispatcher,
        read_models,
        sweeper,
        realtime_tx,
        workers: Mutex::new(workers),
    })
}

impl AppServices {
    /// Run a unit of work (see [`CommandDispatcher::transact`]).
    pub fn transact<T>(
        &self,
        account_id: AccountId,
        work: impl FnMut(&mut UnitOfWork<'_>) -> Result<T, DispatchError>,
    ) -> Result<Committed<T>, DispatchError> {
        self.dispatcher.transact(account_id, work)
    }

    pub fn dispatch<A>(
        &self,
        account_id: AccountId,
        aggregate_id: AggregateId,
        command: A::Command,
    ) -> Result<Committed<A>, DispatchError>
    where
        A: EventSourced,
        A::Event: branchpos_events::Event + serde::Serialize + DeserializeOwned,
    {
        self.dispatcher.dispatch::<A>(account_id, aggregate_id, command)
    }

    /// Current state of one aggregate, straight from its stream.
    ///
    /// Used where a decision must not trust a possibly lagging read model
    /// (e.g. which branch a sale belongs to before authorizing a return).
    pub fn load<A>(&self, account_id: AccountId, aggregate_id: AggregateId) -> Result<A, DispatchError>
    where
        A: EventSourced,
        A::Event: DeserializeOwned,
    {
        self.dispatcher
            .transact(account_id, |uow| uow.load::<A>(aggregate_id))
            .map(|c| c.value)
    }

    pub fn read_models(&self) -> &ReadModels {
        &self.read_models
    }

    /// Expire this account's overdue reservations now.
    pub fn sweep_reservations(&self, account_id: AccountId) -> SweepReport {
        self.sweeper.sweep_account(account_id, Utc::now())
    }

    pub fn realtime_tx(&self) -> &broadcast::Sender<RealtimeMessage> {
        &self.realtime_tx
    }

    /// Stop background workers and wait for them.
    pub fn shutdown(&self) {
        let workers = match self.workers.lock() {
            Ok(mut w) => std::mem::take(&mut *w),
            Err(_) => return,
        };
        for worker in workers {
            worker.shutdown();
        }
        tracing::info!("background workers stopped");
    }
}

pub fn account_sse_stream(
    services: Arc<AppServices>,
    account_id: AccountId,
) -> Sse<impl tokio_stream::Stream<Item = Result<SseEvent, Infallible>>> {
    let rx = services.realtime_tx().subscribe();
    let stream = BroadcastStream::new(rx).filter_map(move |msg| match msg {
        Ok(m) if m.account_id == account_id => {
            let data = serde_json::to_string(&m.payload).unwrap_or_else(|_| "{}".to_string());
            Some(Ok(SseEvent::default().event(m.topic).data(data)))
        }
        _ => None,
    });

    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
}
