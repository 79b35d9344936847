use std::collections::HashMap;
use std::sync::RwLock;

use chrono::NaiveDate;

use stockwise_core::{Aggregate, AggregateId, ExpectedVersion, UserId};
use stockwise_events::Event;
use stockwise_forecast::DemandForecast;
use stockwise_inventory::{MovementKind, Product, ProductEvent, ProductId, StockMovement};
use stockwise_sales::SaleRecord;

use super::r#trait::{EventStore, ForecastStore, LedgerAppend, LedgerStore, StoreError, StoredEvent};

fn current_version<E>(stream: &[StoredEvent<E>]) -> u64 {
    stream.last().map(|e| e.sequence_number).unwrap_or(0)
}

/// In-memory append-only event store for one event type.
///
/// Intended for tests/dev. Not optimized for performance.
#[derive(Debug)]
pub struct InMemoryEventStore<E> {
    streams: RwLock<HashMap<AggregateId, Vec<StoredEvent<E>>>>,
}

impl<E> Default for InMemoryEventStore<E> {
    fn default() -> Self {
        Self {
            streams: RwLock::new(HashMap::new()),
        }
    }
}

impl<E> InMemoryEventStore<E> {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<E> EventStore<E> for InMemoryEventStore<E>
where
    E: Event + Clone + Send + Sync,
{
    fn append(
        &self,
        aggregate_id: AggregateId,
        events: Vec<E>,
        expected: ExpectedVersion,
    ) -> Result<Vec<StoredEvent<E>>, StoreError> {
        if events.is_empty() {
            return Ok(vec![]);
        }

        let mut streams = self.streams.write().map_err(|_| StoreError::Poisoned)?;
        let stream = streams.entry(aggregate_id).or_default();
        let current = current_version(stream);

        if !expected.matches(current) {
            return Err(StoreError::Concurrency(format!(
                "expected {expected:?}, found {current}"
            )));
        }

        let mut committed = Vec::with_capacity(events.len());
        for (offset, event) in events.into_iter().enumerate() {
            let stored = StoredEvent::new(aggregate_id, current + 1 + offset as u64, event);
            stream.push(stored.clone());
            committed.push(stored);
        }

        Ok(committed)
    }

    fn load_stream(&self, aggregate_id: AggregateId) -> Result<Vec<StoredEvent<E>>, StoreError> {
        let streams = self.streams.read().map_err(|_| StoreError::Poisoned)?;
        Ok(streams.get(&aggregate_id).cloned().unwrap_or_default())
    }

    fn stream_ids(&self) -> Result<Vec<AggregateId>, StoreError> {
        let streams = self.streams.read().map_err(|_| StoreError::Poisoned)?;
        let mut ids: Vec<AggregateId> = streams.keys().copied().collect();
        ids.sort();
        Ok(ids)
    }
}

#[derive(Debug)]
struct LedgerStream {
    product: Product,
    events: Vec<StoredEvent<ProductEvent>>,
}

#[derive(Debug, Default)]
struct LedgerState {
    streams: HashMap<ProductId, LedgerStream>,
    skus: HashMap<String, ProductId>,
    sales: Vec<SaleRecord>,
}

/// In-memory product ledger.
///
/// One write lock covers the event streams, the folded products, the SKU index
/// and the sales table, which is what makes a ledger append atomic.
#[derive(Debug, Default)]
pub struct InMemoryLedgerStore {
    state: RwLock<LedgerState>,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold `events` onto a copy of `product`, rejecting anything that would
    /// break the ledger. Returns the resulting state and any newly claimed SKU.
    fn stage(
        state: &LedgerState,
        product: &Product,
        events: &[ProductEvent],
    ) -> Result<(Product, Option<String>), StoreError> {
        let product_id = product.id_typed();
        let mut staged = product.clone();
        let mut claimed_sku = None;

        for (idx, event) in events.iter().enumerate() {
            match event {
                ProductEvent::ProductRegistered(e) => {
                    if e.product_id != product_id {
                        return Err(StoreError::InvalidAppend(format!(
                            "event {idx} targets product {}",
                            e.product_id
                        )));
                    }
                    if staged.is_registered() {
                        return Err(StoreError::Duplicate(format!(
                            "product {product_id} already registered"
                        )));
                    }
                    if state.skus.get(&e.sku).is_some_and(|owner| *owner != product_id) {
                        return Err(StoreError::Duplicate(format!("sku '{}'", e.sku)));
                    }
                    claimed_sku = Some(e.sku.clone());
                }
                ProductEvent::MovementRecorded(m) => {
                    if m.product_id != product_id {
                        return Err(StoreError::InvalidAppend(format!(
                            "movement {idx} targets product {}",
                            m.product_id
                        )));
                    }
                    if !staged.is_registered() {
                        return Err(StoreError::NotFound(format!("product {product_id}")));
                    }
                    if let Some(last) = staged.last_movement_at().filter(|last| m.recorded_at < *last) {
                        return Err(StoreError::InvalidAppend(format!(
                            "movement {idx} at {} precedes the latest entry at {last}",
                            m.recorded_at
                        )));
                    }
                    if m.previous_stock != staged.current_stock() {
                        return Err(StoreError::Concurrency(format!(
                            "movement {idx} starts at {}, ledger is at {}",
                            m.previous_stock,
                            staged.current_stock()
                        )));
                    }
                    let expected = m
                        .kind
                        .resulting_stock(m.previous_stock, m.quantity)
                        .map_err(|e| StoreError::InvalidAppend(e.to_string()))?;
                    if expected != m.new_stock {
                        return Err(StoreError::InvalidAppend(format!(
                            "movement {idx} records new_stock {}, arithmetic gives {expected}",
                            m.new_stock
                        )));
                    }
                }
                ProductEvent::ProductDeactivated(e) => {
                    if e.product_id != product_id {
                        return Err(StoreError::InvalidAppend(format!(
                            "event {idx} targets product {}",
                            e.product_id
                        )));
                    }
                }
            }
            staged.apply(event);
        }

        Ok((staged, claimed_sku))
    }

    fn check_sale(batch: &LedgerAppend, sale: &SaleRecord) -> Result<(), StoreError> {
        let source = batch
            .events
            .iter()
            .filter_map(ProductEvent::as_movement)
            .find(|m| m.id == sale.movement_id);

        match source {
            Some(m)
                if m.kind == MovementKind::Dispatching
                    && m.quantity == sale.quantity
                    && sale.product_id == batch.product_id =>
            {
                Ok(())
            }
            Some(_) => Err(StoreError::InvalidAppend(format!(
                "sale {} does not match its DISPATCHING movement",
                sale.id
            ))),
            None => Err(StoreError::InvalidAppend(format!(
                "sale {} has no movement in this append",
                sale.id
            ))),
        }
    }
}

impl LedgerStore for InMemoryLedgerStore {
    fn append(&self, batch: LedgerAppend) -> Result<Vec<StoredEvent<ProductEvent>>, StoreError> {
        if batch.events.is_empty() {
            return Ok(vec![]);
        }
        if let Some(sale) = &batch.sale {
            Self::check_sale(&batch, sale)?;
        }

        let mut state = self.state.write().map_err(|_| StoreError::Poisoned)?;
        let product_id = batch.product_id;

        let (current, base) = match state.streams.get(&product_id) {
            Some(stream) => (current_version(&stream.events), stream.product.clone()),
            None => (0, Product::empty(product_id)),
        };

        if !batch.expected.matches(current) {
            return Err(StoreError::Concurrency(format!(
                "expected {:?}, found {current}",
                batch.expected
            )));
        }

        let (staged, claimed_sku) = Self::stage(&state, &base, &batch.events)?;

        // Validated; nothing below can fail.
        if let Some(sku) = claimed_sku {
            state.skus.insert(sku, product_id);
        }
        if let Some(sale) = batch.sale {
            state.sales.push(sale);
        }

        let stream = state.streams.entry(product_id).or_insert_with(|| LedgerStream {
            product: Product::empty(product_id),
            events: Vec::new(),
        });
        stream.product = staged;

        let mut committed = Vec::with_capacity(batch.events.len());
        for (offset, event) in batch.events.into_iter().enumerate() {
            let stored = StoredEvent::new(product_id.0, current + 1 + offset as u64, event);
            stream.events.push(stored.clone());
            committed.push(stored);
        }

        Ok(committed)
    }

    fn load_stream(
        &self,
        product_id: ProductId,
    ) -> Result<Vec<StoredEvent<ProductEvent>>, StoreError> {
        let state = self.state.read().map_err(|_| StoreError::Poisoned)?;
        Ok(state
            .streams
            .get(&product_id)
            .map(|s| s.events.clone())
            .unwrap_or_default())
    }

    fn load_product(&self, product_id: ProductId) -> Result<Option<Product>, StoreError> {
        let state = self.state.read().map_err(|_| StoreError::Poisoned)?;
        Ok(state
            .streams
            .get(&product_id)
            .map(|s| s.product.clone())
            .filter(Product::is_registered))
    }

    fn products(&self) -> Result<Vec<Product>, StoreError> {
        let state = self.state.read().map_err(|_| StoreError::Poisoned)?;
        let mut products: Vec<Product> = state
            .streams
            .values()
            .map(|s| s.product.clone())
            .filter(Product::is_registered)
            .collect();
        products.sort_by(|a, b| a.sku().cmp(b.sku()));
        Ok(products)
    }

    fn find_by_sku(&self, sku: &str) -> Result<Option<Product>, StoreError> {
        let state = self.state.read().map_err(|_| StoreError::Poisoned)?;
        Ok(state
            .skus
            .get(sku.trim())
            .and_then(|id| state.streams.get(id))
            .map(|s| s.product.clone()))
    }

    fn movements(&self, product_id: ProductId) -> Result<Vec<StockMovement>, StoreError> {
        let state = self.state.read().map_err(|_| StoreError::Poisoned)?;
        Ok(state
            .streams
            .get(&product_id)
            .map(|s| {
                s.events
                    .iter()
                    .filter_map(|e| e.event.as_movement().cloned())
                    .collect()
            })
            .unwrap_or_default())
    }

    fn movements_by_actor(&self, actor: UserId) -> Result<Vec<StockMovement>, StoreError> {
        let state = self.state.read().map_err(|_| StoreError::Poisoned)?;
        let mut movements: Vec<StockMovement> = state
            .streams
            .values()
            .flat_map(|s| s.events.iter())
            .filter_map(|e| e.event.as_movement())
            .filter(|m| m.actor == actor)
            .cloned()
            .collect();
        movements.sort_by_key(|m| (m.recorded_at, m.id));
        Ok(movements)
    }

    fn sales(
        &self,
        product_id: ProductId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<SaleRecord>, StoreError> {
        let state = self.state.read().map_err(|_| StoreError::Poisoned)?;
        Ok(state
            .sales
            .iter()
            .filter(|s| s.product_id == product_id && s.sale_date >= start && s.sale_date <= end)
            .cloned()
            .collect())
    }
}

/// In-memory forecast snapshot history.
#[derive(Debug, Default)]
pub struct InMemoryForecastStore {
    snapshots: RwLock<HashMap<ProductId, Vec<DemandForecast>>>,
}

impl InMemoryForecastStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ForecastStore for InMemoryForecastStore {
    fn append(&self, snapshot: DemandForecast) -> Result<(), StoreError> {
        let mut snapshots = self.snapshots.write().map_err(|_| StoreError::Poisoned)?;
        snapshots.entry(snapshot.product_id).or_default().push(snapshot);
        Ok(())
    }

    fn latest(&self, product_id: ProductId) -> Result<Option<DemandForecast>, StoreError> {
        let snapshots = self.snapshots.read().map_err(|_| StoreError::Poisoned)?;
        Ok(snapshots.get(&product_id).and_then(|s| s.last().cloned()))
    }

    fn history(&self, product_id: ProductId) -> Result<Vec<DemandForecast>, StoreError> {
        let snapshots = self.snapshots.read().map_err(|_| StoreError::Poisoned)?;
        Ok(snapshots
            .get(&product_id)
            .map(|s| s.iter().rev().cloned().collect())
            .unwrap_or_default())
    }

    fn latest_per_product(&self) -> Result<Vec<DemandForecast>, StoreError> {
        let snapshots = self.snapshots.read().map_err(|_| StoreError::Poisoned)?;
        Ok(snapshots.values().filter_map(|s| s.last().cloned()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use stockwise_core::{AggregateRoot, RecordId};
    use stockwise_inventory::{ProductCommand, RecordMovement, RegisterProduct};
    use stockwise_sales::SaleReferences;

    fn register(product_id: ProductId, sku: &str, initial_stock: i64) -> Vec<ProductEvent> {
        Product::empty(product_id)
            .handle(&ProductCommand::RegisterProduct(RegisterProduct {
                product_id,
                sku: sku.to_string(),
                name: "Widget".to_string(),
                reorder_level: 10,
                reorder_quantity: 40,
                unit_price: Some(250),
                initial_stock,
                opening_movement_id: RecordId::new(),
                actor: UserId::new(),
                occurred_at: Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap(),
            }))
            .unwrap()
    }

    fn dispatch(product: &Product, quantity: i64, actor: UserId) -> ProductEvent {
        product
            .handle(&ProductCommand::RecordMovement(RecordMovement {
                movement_id: RecordId::new(),
                product_id: product.id_typed(),
                kind: MovementKind::Dispatching,
                quantity,
                reason: None,
                reference: None,
                actor,
                occurred_at: Utc.with_ymd_and_hms(2024, 5, 2, 9, 0, 0).unwrap(),
            }))
            .unwrap()
            .remove(0)
    }

    fn seeded(store: &InMemoryLedgerStore, sku: &str, stock: i64) -> Product {
        let id = ProductId::new(AggregateId::new());
        store
            .append(LedgerAppend {
                product_id: id,
                events: register(id, sku, stock),
                sale: None,
                expected: ExpectedVersion::Exact(0),
            })
            .unwrap();
        store.load_product(id).unwrap().unwrap()
    }

    #[test]
    fn append_assigns_contiguous_sequence_numbers() {
        let store = InMemoryLedgerStore::new();
        let product = seeded(&store, "SKU-1", 30);

        let stream = store.load_stream(product.id_typed()).unwrap();
        assert_eq!(
            stream.iter().map(|e| e.sequence_number).collect::<Vec<_>>(),
            vec![1, 2]
        );
        assert_eq!(stream[1].event_type, "inventory.movement.recorded");
        assert_eq!(product.version(), 2);
        assert_eq!(product.current_stock(), 30);
    }

    #[test]
    fn duplicate_sku_is_rejected() {
        let store = InMemoryLedgerStore::new();
        seeded(&store, "SKU-1", 0);

        let other = ProductId::new(AggregateId::new());
        let err = store
            .append(LedgerAppend {
                product_id: other,
                events: register(other, "SKU-1", 0),
                sale: None,
                expected: ExpectedVersion::Exact(0),
            })
            .unwrap_err();
        assert!(matches!(err, StoreError::Duplicate(_)));
        assert!(store.load_product(other).unwrap().is_none());
    }

    #[test]
    fn stale_version_is_a_concurrency_error() {
        let store = InMemoryLedgerStore::new();
        let product = seeded(&store, "SKU-1", 30);
        let event = dispatch(&product, 5, UserId::new());

        let err = store
            .append(LedgerAppend {
                product_id: product.id_typed(),
                events: vec![event],
                sale: None,
                expected: ExpectedVersion::Exact(1),
            })
            .unwrap_err();
        assert!(matches!(err, StoreError::Concurrency(_)));
    }

    #[test]
    fn movement_not_contiguous_with_ledger_is_refused_even_without_version_check() {
        let store = InMemoryLedgerStore::new();
        let product = seeded(&store, "SKU-1", 30);
        let first = dispatch(&product, 5, UserId::new());
        let stale = dispatch(&product, 5, UserId::new());

        store
            .append(LedgerAppend {
                product_id: product.id_typed(),
                events: vec![first],
                sale: None,
                expected: ExpectedVersion::Any,
            })
            .unwrap();
        let err = store
            .append(LedgerAppend {
                product_id: product.id_typed(),
                events: vec![stale],
                sale: None,
                expected: ExpectedVersion::Any,
            })
            .unwrap_err();
        assert!(matches!(err, StoreError::Concurrency(_)));
        assert_eq!(
            store.load_product(product.id_typed()).unwrap().unwrap().current_stock(),
            25
        );
    }

    #[test]
    fn movement_older_than_the_ledger_tail_is_refused() {
        let store = InMemoryLedgerStore::new();
        let product = seeded(&store, "SKU-1", 30);
        let mut event = dispatch(&product, 5, UserId::new());
        if let ProductEvent::MovementRecorded(m) = &mut event {
            m.recorded_at = Utc.with_ymd_and_hms(2024, 4, 30, 12, 0, 0).unwrap();
        }

        let err = store
            .append(LedgerAppend {
                product_id: product.id_typed(),
                events: vec![event],
                sale: None,
                expected: ExpectedVersion::Exact(2),
            })
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidAppend(_)));
        assert_eq!(store.movements(product.id_typed()).unwrap().len(), 1);
    }

    #[test]
    fn sale_is_written_with_its_movement_or_not_at_all() {
        let store = InMemoryLedgerStore::new();
        let product = seeded(&store, "SKU-1", 30);
        let event = dispatch(&product, 4, UserId::new());
        let movement = event.as_movement().unwrap().clone();
        let sale = SaleRecord::from_movement(&movement, 250, SaleReferences::default()).unwrap();

        // Wrong expected version: neither the movement nor the sale lands.
        assert!(
            store
                .append(LedgerAppend {
                    product_id: product.id_typed(),
                    events: vec![event.clone()],
                    sale: Some(sale.clone()),
                    expected: ExpectedVersion::Exact(9),
                })
                .is_err()
        );
        let day = movement.recorded_at.date_naive();
        assert!(store.sales(product.id_typed(), day, day).unwrap().is_empty());

        store
            .append(LedgerAppend {
                product_id: product.id_typed(),
                events: vec![event],
                sale: Some(sale),
                expected: ExpectedVersion::Exact(2),
            })
            .unwrap();
        let sales = store.sales(product.id_typed(), day, day).unwrap();
        assert_eq!(sales.len(), 1);
        assert_eq!(sales[0].total_amount, 1000);
    }

    #[test]
    fn movements_by_actor_spans_products() {
        let store = InMemoryLedgerStore::new();
        let a = seeded(&store, "SKU-A", 10);
        let b = seeded(&store, "SKU-B", 10);
        let clerk = UserId::new();

        for product in [&a, &b] {
            store
                .append(LedgerAppend {
                    product_id: product.id_typed(),
                    events: vec![dispatch(product, 1, clerk)],
                    sale: None,
                    expected: ExpectedVersion::Exact(2),
                })
                .unwrap();
        }

        let mine = store.movements_by_actor(clerk).unwrap();
        assert_eq!(mine.len(), 2);
        assert!(mine.iter().all(|m| m.actor == clerk));
        assert_eq!(store.movements(a.id_typed()).unwrap().len(), 2);
    }

    #[test]
    fn forecast_history_is_newest_first() {
        let store = InMemoryForecastStore::new();
        let product_id = ProductId::new(AggregateId::new());
        for demand in [10, 20, 30] {
            store
                .append(DemandForecast {
                    product_id,
                    as_of: NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
                    computed_at: Utc::now(),
                    period: Default::default(),
                    predicted_demand: demand,
                    lower_bound: 0,
                    upper_bound: demand,
                    confidence_score: 0.75,
                    current_stock: 5,
                    recommended_restock: 0,
                    days_until_stockout: None,
                    is_at_risk: false,
                    model_version: "LOCAL_SMA_V1".to_string(),
                })
                .unwrap();
        }

        let history = store.history(product_id).unwrap();
        assert_eq!(
            history.iter().map(|f| f.predicted_demand).collect::<Vec<_>>(),
            vec![30, 20, 10]
        );
        assert_eq!(store.latest(product_id).unwrap().unwrap().predicted_demand, 30);
        assert_eq!(store.latest_per_product().unwrap().len(), 1);
    }
}
