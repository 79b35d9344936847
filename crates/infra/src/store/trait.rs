use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use stockwise_core::{AggregateId, ExpectedVersion, UserId};
use stockwise_forecast::DemandForecast;
use stockwise_inventory::{Product, ProductEvent, ProductId, StockMovement};
use stockwise_sales::SaleRecord;

/// A stored event in an append-only stream (assigned a sequence number).
///
/// Sequence numbers are stream-scoped, start at 1 and have no gaps, so the
/// last one is the aggregate version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredEvent<E> {
    pub aggregate_id: AggregateId,
    pub sequence_number: u64,
    pub event_type: String,
    pub event_version: u32,
    pub occurred_at: DateTime<Utc>,
    pub event: E,
}

impl<E> StoredEvent<E>
where
    E: stockwise_events::Event,
{
    pub fn new(aggregate_id: AggregateId, sequence_number: u64, event: E) -> Self {
        Self {
            aggregate_id,
            sequence_number,
            event_type: event.event_type().to_string(),
            event_version: event.version(),
            occurred_at: event.occurred_at(),
            event,
        }
    }
}

/// Storage operation error.
///
/// Infrastructure failures, as opposed to domain errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("optimistic concurrency check failed: {0}")]
    Concurrency(String),

    #[error("duplicate: {0}")]
    Duplicate(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid append: {0}")]
    InvalidAppend(String),

    #[error("store lock poisoned")]
    Poisoned,
}

/// Append-only store of typed event streams, one per aggregate instance.
pub trait EventStore<E>: Send + Sync {
    /// Append to a stream, checking `expected` against its current version.
    fn append(
        &self,
        aggregate_id: AggregateId,
        events: Vec<E>,
        expected: ExpectedVersion,
    ) -> Result<Vec<StoredEvent<E>>, StoreError>;

    /// Full stream in sequence order; empty if the aggregate does not exist.
    fn load_stream(&self, aggregate_id: AggregateId) -> Result<Vec<StoredEvent<E>>, StoreError>;

    fn stream_ids(&self) -> Result<Vec<AggregateId>, StoreError>;
}

impl<E, S> EventStore<E> for Arc<S>
where
    S: EventStore<E> + ?Sized,
{
    fn append(
        &self,
        aggregate_id: AggregateId,
        events: Vec<E>,
        expected: ExpectedVersion,
    ) -> Result<Vec<StoredEvent<E>>, StoreError> {
        (**self).append(aggregate_id, events, expected)
    }

    fn load_stream(&self, aggregate_id: AggregateId) -> Result<Vec<StoredEvent<E>>, StoreError> {
        (**self).load_stream(aggregate_id)
    }

    fn stream_ids(&self) -> Result<Vec<AggregateId>, StoreError> {
        (**self).stream_ids()
    }
}

/// One atomic ledger write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerAppend {
    pub product_id: ProductId,
    pub events: Vec<ProductEvent>,
    /// Sale derived from a DISPATCHING movement in `events`.
    pub sale: Option<SaleRecord>,
    pub expected: ExpectedVersion,
}

/// Product event streams plus the indexes the ledger needs.
///
/// `append` must persist the events, the folded product state and the sale in
/// one step, and must refuse any movement whose `previous_stock` disagrees
/// with the stream's current stock.
pub trait LedgerStore: Send + Sync {
    fn append(&self, batch: LedgerAppend) -> Result<Vec<StoredEvent<ProductEvent>>, StoreError>;

    fn load_stream(
        &self,
        product_id: ProductId,
    ) -> Result<Vec<StoredEvent<ProductEvent>>, StoreError>;

    /// Current product state; `None` if never registered.
    fn load_product(&self, product_id: ProductId) -> Result<Option<Product>, StoreError>;

    fn products(&self) -> Result<Vec<Product>, StoreError>;

    fn find_by_sku(&self, sku: &str) -> Result<Option<Product>, StoreError>;

    /// Movements of one product in ledger order.
    fn movements(&self, product_id: ProductId) -> Result<Vec<StockMovement>, StoreError>;

    /// Movements recorded by one actor across all products, oldest first.
    fn movements_by_actor(&self, actor: UserId) -> Result<Vec<StockMovement>, StoreError>;

    /// Sales of one product with `start <= sale_date <= end`.
    fn sales(
        &self,
        product_id: ProductId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<SaleRecord>, StoreError>;
}

impl<S> LedgerStore for Arc<S>
where
    S: LedgerStore + ?Sized,
{
    fn append(&self, batch: LedgerAppend) -> Result<Vec<StoredEvent<ProductEvent>>, StoreError> {
        (**self).append(batch)
    }

    fn load_stream(
        &self,
        product_id: ProductId,
    ) -> Result<Vec<StoredEvent<ProductEvent>>, StoreError> {
        (**self).load_stream(product_id)
    }

    fn load_product(&self, product_id: ProductId) -> Result<Option<Product>, StoreError> {
        (**self).load_product(product_id)
    }

    fn products(&self) -> Result<Vec<Product>, StoreError> {
        (**self).products()
    }

    fn find_by_sku(&self, sku: &str) -> Result<Option<Product>, StoreError> {
        (**self).find_by_sku(sku)
    }

    fn movements(&self, product_id: ProductId) -> Result<Vec<StockMovement>, StoreError> {
        (**self).movements(product_id)
    }

    fn movements_by_actor(&self, actor: UserId) -> Result<Vec<StockMovement>, StoreError> {
        (**self).movements_by_actor(actor)
    }

    fn sales(
        &self,
        product_id: ProductId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<SaleRecord>, StoreError> {
        (**self).sales(product_id, start, end)
    }
}

/// Append-only time series of forecast snapshots per product.
pub trait ForecastStore: Send + Sync {
    fn append(&self, snapshot: DemandForecast) -> Result<(), StoreError>;

    fn latest(&self, product_id: ProductId) -> Result<Option<DemandForecast>, StoreError>;

    /// All snapshots for a product, newest first.
    fn history(&self, product_id: ProductId) -> Result<Vec<DemandForecast>, StoreError>;

    /// Latest snapshot of every product that has one.
    fn latest_per_product(&self) -> Result<Vec<DemandForecast>, StoreError>;
}

impl<S> ForecastStore for Arc<S>
where
    S: ForecastStore + ?Sized,
{
    fn append(&self, snapshot: DemandForecast) -> Result<(), StoreError> {
        (**self).append(snapshot)
    }

    fn latest(&self, product_id: ProductId) -> Result<Option<DemandForecast>, StoreError> {
        (**self).latest(product_id)
    }

    fn history(&self, product_id: ProductId) -> Result<Vec<DemandForecast>, StoreError> {
        (**self).history(product_id)
    }

    fn latest_per_product(&self) -> Result<Vec<DemandForecast>, StoreError> {
        (**self).latest_per_product()
    }
}
