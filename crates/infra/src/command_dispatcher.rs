//! Command execution pipeline for event-sourced aggregates.
//!
//! ```text
//! Command
//!   ↓
//! 1. Load the aggregate's stream
//!   ↓
//! 2. Rehydrate (apply history in sequence order)
//!   ↓
//! 3. Handle command (pure decision, produces events)
//!   ↓
//! 4. Append with ExpectedVersion::Exact(loaded version)
//!   ↓
//! 5. Publish committed events
//! ```
//!
//! A concurrency failure at step 4 restarts from step 1, up to the
//! [`RetryPolicy`] bound.

use std::time::Duration;

use tracing::warn;

use stockwise_core::{Aggregate, AggregateId, DomainError, ExpectedVersion};
use stockwise_events::{Event, EventBus};
use stockwise_inventory::ProductEvent;
use stockwise_reorder::ReorderEvent;

use crate::config::LedgerConfig;
use crate::error::ServiceError;
use crate::store::{EventStore, StoreError, StoredEvent};

/// Everything the services publish on the domain bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomainMessage {
    Ledger(StoredEvent<ProductEvent>),
    Reorder(StoredEvent<ReorderEvent>),
}

impl DomainMessage {
    pub fn event_type(&self) -> &str {
        match self {
            DomainMessage::Ledger(e) => &e.event_type,
            DomainMessage::Reorder(e) => &e.event_type,
        }
    }
}

impl From<StoredEvent<ProductEvent>> for DomainMessage {
    fn from(value: StoredEvent<ProductEvent>) -> Self {
        DomainMessage::Ledger(value)
    }
}

impl From<StoredEvent<ReorderEvent>> for DomainMessage {
    fn from(value: StoredEvent<ReorderEvent>) -> Self {
        DomainMessage::Reorder(value)
    }
}

/// Bounded retry on optimistic-concurrency failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    /// Sleep before retry `n` is `n * backoff`.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&LedgerConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(config: &LedgerConfig) -> Self {
        Self {
            max_retries: config.max_conflict_retries,
            backoff: config.retry_backoff(),
        }
    }

    /// Run `attempt` until it succeeds, fails with anything other than
    /// [`ServiceError::ConcurrencyConflict`], or retries run out.
    pub fn run<T>(
        &self,
        operation: &str,
        mut attempt: impl FnMut() -> Result<T, ServiceError>,
    ) -> Result<T, ServiceError> {
        let mut retries = 0u32;
        loop {
            match attempt() {
                Err(ServiceError::ConcurrencyConflict(msg)) if retries < self.max_retries => {
                    retries += 1;
                    warn!(operation, retries, error = %msg, "concurrency conflict, retrying");
                    if !self.backoff.is_zero() {
                        std::thread::sleep(self.backoff * retries);
                    }
                }
                Err(ServiceError::ConcurrencyConflict(msg)) => {
                    return Err(ServiceError::ConcurrencyConflict(format!(
                        "{operation}: gave up after {retries} retries ({msg})"
                    )));
                }
                other => return other,
            }
        }
    }
}

/// Publish committed events; the append already happened, so a bus failure
/// is logged rather than surfaced.
pub(crate) fn publish_committed<B, E>(bus: &B, committed: &[StoredEvent<E>])
where
    B: EventBus<DomainMessage>,
    E: Clone,
    StoredEvent<E>: Into<DomainMessage>,
{
    for stored in committed {
        if let Err(err) = bus.publish(stored.clone().into()) {
            warn!(
                sequence_number = stored.sequence_number,
                event_type = %stored.event_type,
                error = ?err,
                "failed to publish committed event"
            );
        }
    }
}

/// Reusable command execution engine over an [`EventStore`].
#[derive(Debug)]
pub struct CommandDispatcher<S, B> {
    store: S,
    bus: B,
    retry: RetryPolicy,
}

impl<S, B> CommandDispatcher<S, B> {
    pub fn new(store: S, bus: B) -> Self {
        Self {
            store,
            bus,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
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
    B: EventBus<DomainMessage>,
{
    /// Rebuild an aggregate from its stream.
    pub fn load<A>(
        &self,
        aggregate_id: AggregateId,
        make_aggregate: impl FnOnce(AggregateId) -> A,
    ) -> Result<A, ServiceError>
    where
        A: Aggregate,
        S: EventStore<A::Event>,
        A::Event: Clone,
    {
        let history = self.store.load_stream(aggregate_id)?;
        validate_loaded_stream(aggregate_id, &history)?;

        let mut aggregate = make_aggregate(aggregate_id);
        for stored in &history {
            aggregate.apply(&stored.event);
        }
        Ok(aggregate)
    }

    /// Load, decide, append, publish. Retries on concurrency conflicts.
    ///
    /// Returns the committed events; empty when the command was a no-op.
    pub fn dispatch<A>(
        &self,
        aggregate_id: AggregateId,
        command: &A::Command,
        make_aggregate: impl Fn(AggregateId) -> A,
    ) -> Result<Vec<StoredEvent<A::Event>>, ServiceError>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: Event + Clone,
        S: EventStore<A::Event>,
        StoredEvent<A::Event>: Into<DomainMessage>,
    {
        let committed = self.retry.run("dispatch", || {
            let aggregate = self.load(aggregate_id, &make_aggregate)?;
            let decided = aggregate.handle(command)?;
            if decided.is_empty() {
                return Ok(vec![]);
            }
            let expected = ExpectedVersion::Exact(aggregate.version());
            Ok(self.store.append(aggregate_id, decided, expected)?)
        })?;

        publish_committed(&self.bus, &committed);
        Ok(committed)
    }
}

fn validate_loaded_stream<E>(
    aggregate_id: AggregateId,
    stream: &[StoredEvent<E>],
) -> Result<(), StoreError> {
    let mut last = 0u64;
    for (idx, e) in stream.iter().enumerate() {
        if e.aggregate_id != aggregate_id {
            return Err(StoreError::InvalidAppend(format!(
                "loaded stream contains wrong aggregate_id at index {idx}"
            )));
        }
        if e.sequence_number != last + 1 {
            return Err(StoreError::InvalidAppend(format!(
                "sequence gap in loaded stream (last={last}, found={})",
                e.sequence_number
            )));
        }
        last = e.sequence_number;
    }
    Ok(())
}
