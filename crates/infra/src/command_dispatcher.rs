//! Command execution pipeline (application-level orchestration).
//!
//! ```text
//! Command(s)
//!   ↓
//! 1. Load each touched stream (account-scoped) and record its version
//!   ↓
//! 2. Rehydrate the aggregate and handle the command (pure)
//!   ↓
//! 3. Stage the decided events per stream
//!   ↓
//! 4. Commit every staged stream in one atomic `append_batch`
//!   ↓
//! 5. Publish committed envelopes to the bus
//! ```
//!
//! A unit of work that loses an optimistic-concurrency race is re-run from
//! step 1 (up to `max_attempts`), so the closure passed to
//! [`CommandDispatcher::transact`] must be free of side effects other than
//! staging through the [`UnitOfWork`].

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use thiserror::Error;
use uuid::Uuid;

use branchpos_core::{AccountId, AggregateId, DomainError, ExpectedVersion};
use branchpos_events::{Event, EventBus, EventEnvelope};

use crate::event_store::{EventStore, EventStoreError, StoredEvent, StreamAppend, UncommittedEvent};
use crate::streams::EventSourced;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

#[derive(Debug, Error)]
pub enum DispatchError {
    /// Optimistic concurrency failure that survived every retry.
    #[error("concurrent modification: {0}")]
    Concurrency(String),
    /// Cross-account or cross-aggregate stream mixing.
    #[error("account isolation violation: {0}")]
    AccountIsolation(String),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("invariant violated: {0}")]
    InvariantViolation(String),
    /// Deterministic domain conflict (duplicate id, session already open, ...).
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("insufficient stock: {0}")]
    InsufficientStock(String),
    #[error("unauthorized")]
    Unauthorized,
    #[error("not found")]
    NotFound,
    /// Historical payloads could not be read back into the aggregate event type.
    #[error("failed to deserialize stored event: {0}")]
    Deserialize(String),
    #[error(transparent)]
    Store(EventStoreError),
    /// Publication failed after a successful commit (at-least-once; retry may duplicate).
    #[error("event publication failed: {0}")]
    Publish(String),
}

impl From<EventStoreError> for DispatchError {
    fn from(value: EventStoreError) -> Self {
        match value {
            EventStoreError::Concurrency(msg) => DispatchError::Concurrency(msg),
            EventStoreError::AccountIsolation(msg) => DispatchError::AccountIsolation(msg),
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
            DomainError::InsufficientStock(msg) => DispatchError::InsufficientStock(msg),
            DomainError::Unauthorized => DispatchError::Unauthorized,
            DomainError::NotFound => DispatchError::NotFound,
            DomainError::InvalidId(msg) => DispatchError::Validation(msg),
        }
    }
}

/// Result of a committed unit of work.
#[derive(Debug, Clone)]
pub struct Committed<T> {
    pub value: T,
    pub events: Vec<StoredEvent>,
}

/// Staging area for one multi-aggregate transaction.
///
/// Every stream written through [`UnitOfWork::execute`] is committed with
/// `ExpectedVersion::Exact(version it was loaded at)`. Streams only read via
/// [`UnitOfWork::load`] are not version-checked.
pub struct UnitOfWork<'s> {
    store: &'s dyn EventStore,
    account_id: AccountId,
    staged: Vec<StreamAppend>,
}

impl<'s> UnitOfWork<'s> {
    fn new(store: &'s dyn EventStore, account_id: AccountId) -> Self {
        Self {
            store,
            account_id,
            staged: Vec::new(),
        }
    }

    pub fn account_id(&self) -> AccountId {
        self.account_id
    }

    /// Rehydrate an aggregate without staging anything.
    pub fn load<A>(&self, aggregate_id: AggregateId) -> Result<A, DispatchError>
    where
        A: EventSourced,
        A::Event: DeserializeOwned,
    {
        let (aggregate, _) = self.rehydrate::<A>(aggregate_id)?;
        Ok(aggregate)
    }

    /// Handle `command` against the current state of the stream and stage
    /// the decided events. Returns the aggregate with those events applied.
    ///
    /// A stream can be written only once per unit of work; put every change
    /// to one aggregate into a single command.
    pub fn execute<A>(&mut self, aggregate_id: AggregateId, command: &A::Command) -> Result<A, DispatchError>
    where
        A: EventSourced,
        A::Event: Event + Serialize + DeserializeOwned,
    {
        if self.staged.iter().any(|s| s.aggregate_id == aggregate_id) {
            return Err(DispatchError::Store(EventStoreError::InvalidAppend(format!(
                "stream {aggregate_id} is already staged in this unit of work"
            ))));
        }

        let (mut aggregate, version) = self.rehydrate::<A>(aggregate_id)?;
        let decided = aggregate.handle(command)?;
        if decided.is_empty() {
            return Ok(aggregate);
        }

        let events = decided
            .iter()
            .map(|ev| {
                UncommittedEvent::from_typed(self.account_id, aggregate_id, A::AGGREGATE_TYPE, Uuid::now_v7(), ev)
            })
            .collect::<Result<Vec<_>, _>>()?;
        for ev in &decided {
            aggregate.apply(ev);
        }

        self.staged.push(StreamAppend {
            account_id: self.account_id,
            aggregate_id,
            expected_version: ExpectedVersion::Exact(version),
            events,
        });
        Ok(aggregate)
    }

    fn rehydrate<A>(&self, aggregate_id: AggregateId) -> Result<(A, u64), DispatchError>
    where
        A: EventSourced,
        A::Event: DeserializeOwned,
    {
        let history = self.store.load_stream(self.account_id, aggregate_id)?;
        validate_loaded_stream(self.account_id, aggregate_id, &history)?;

        let mut aggregate = A::blank(aggregate_id);
        apply_history(&mut aggregate, &history)?;
        Ok((aggregate, stream_version(&history)))
    }

    fn into_batch(self) -> Vec<StreamAppend> {
        self.staged
    }
}

/// Reusable command execution engine for event-sourced aggregates.
///
/// - Events are persisted before publication; if the commit fails nothing is published.
/// - A unit of work touching several streams commits all of them or none.
/// - Publication failures after commit surface as `DispatchError::Publish`
///   (at-least-once delivery; projections are idempotent).
#[derive(Debug)]
pub struct CommandDispatcher<S, B> {
    store: S,
    bus: B,
    max_attempts: u32,
}

impl<S, B> CommandDispatcher<S, B> {
    pub fn new(store: S, bus: B) -> Self {
        Self {
            store,
            bus,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
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
    /// Run a multi-aggregate unit of work and commit it atomically.
    ///
    /// `work` may be called more than once: on a concurrency conflict the
    /// staged events are dropped and the unit is re-run against fresh state.
    pub fn transact<T>(
        &self,
        account_id: AccountId,
        mut work: impl FnMut(&mut UnitOfWork<'_>) -> Result<T, DispatchError>,
    ) -> Result<Committed<T>, DispatchError> {
        let mut attempt = 0;
        loop {
            attempt += 1;

            let mut uow = UnitOfWork::new(&self.store, account_id);
            let value = work(&mut uow)?;
            let batch = uow.into_batch();
            if batch.is_empty() {
                return Ok(Committed { value, events: vec![] });
            }

            match self.store.append_batch(batch) {
                Ok(events) => {
                    self.publish(&events)?;
                    return Ok(Committed { value, events });
                }
                Err(EventStoreError::Concurrency(msg)) if attempt < self.max_attempts => {
                    tracing::debug!(%account_id, attempt, reason = %msg, "unit of work lost a race; retrying");
                }
                Err(err) => {
                    if matches!(err, EventStoreError::Concurrency(_)) {
                        tracing::warn!(%account_id, attempts = attempt, "unit of work exhausted retries");
                    }
                    return Err(err.into());
                }
            }
        }
    }

    /// Dispatch a single command to a single aggregate.
    pub fn dispatch<A>(
        &self,
        account_id: AccountId,
        aggregate_id: AggregateId,
        command: A::Command,
    ) -> Result<Committed<A>, DispatchError>
    where
        A: EventSourced,
        A::Event: Event + Serialize + DeserializeOwned,
    {
        self.transact(account_id, |uow| uow.execute::<A>(aggregate_id, &command))
    }

    fn publish(&self, committed: &[StoredEvent]) -> Result<(), DispatchError> {
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

fn validate_loaded_stream(
    account_id: AccountId,
    aggregate_id: AggregateId,
    stream: &[StoredEvent],
) -> Result<(), DispatchError> {
    // A buggy backend must never leak another account's events into a decision.
    let mut last = 0u64;
    for (idx, e) in stream.iter().enumerate() {
        if e.account_id != account_id {
            return Err(DispatchError::AccountIsolation(format!(
                "loaded stream contains wrong account_id at index {idx}"
            )));
        }
        if e.aggregate_id != aggregate_id {
            return Err(DispatchError::AccountIsolation(format!(
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
    A: EventSourced,
    A::Event: DeserializeOwned,
{
    for stored in history {
        let ev: A::Event = serde_json::from_value(stored.payload.clone())
            .map_err(|e| DispatchError::Deserialize(e.to_string()))?;
        aggregate.apply(&ev);
    }
    Ok(())
}
