//! Movement ledger service.
//!
//! Every stock change goes through [`LedgerService::record_movement`]:
//! per-product lock, rehydrate from the store, decide with the `Product`
//! aggregate, then one atomic append of the movement, the new product state
//! and (for DISPATCHING) the sale row.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use tracing::{info, warn};

use stockwise_alerting::low_stock_alert;
use stockwise_core::{Aggregate, AggregateId, AggregateRoot, ExpectedVersion, RecordId, UserId};
use stockwise_events::EventBus;
use stockwise_inventory::{
    DeactivateProduct, MovementKind, Product, ProductCommand, ProductEvent, ProductId,
    RecordMovement, RegisterProduct, StockMovement,
};
use stockwise_sales::{DailySales, SaleRecord, SaleReferences, dense_daily_series};

use crate::alerts::AlertSink;
use crate::command_dispatcher::{DomainMessage, RetryPolicy, publish_committed};
use crate::error::ServiceError;
use crate::locks::KeyedLocks;
use crate::store::{LedgerAppend, LedgerStore};

/// Input for [`LedgerService::register_product`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewProduct {
    pub sku: String,
    pub name: String,
    pub reorder_level: i64,
    pub reorder_quantity: i64,
    pub unit_price: Option<u64>,
    pub initial_stock: i64,
}

/// One stock change to record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MovementRequest {
    pub product_id: ProductId,
    pub kind: MovementKind,
    /// Units moved; for ADJUSTMENT the absolute target stock.
    pub quantity: i64,
    pub reason: Option<String>,
    pub reference: Option<String>,
    /// Sale price for DISPATCHING; defaults to the product's price.
    pub unit_price: Option<u64>,
    pub sale: SaleReferences,
    /// Defaults to now. An explicit time may not precede the product's
    /// latest ledger entry.
    pub occurred_at: Option<DateTime<Utc>>,
}

impl MovementRequest {
    pub fn new(product_id: ProductId, kind: MovementKind, quantity: i64) -> Self {
        Self {
            product_id,
            kind,
            quantity,
            reason: None,
            reference: None,
            unit_price: None,
            sale: SaleReferences::default(),
            occurred_at: None,
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    pub fn with_unit_price(mut self, unit_price: u64) -> Self {
        self.unit_price = Some(unit_price);
        self
    }

    pub fn with_sale_references(mut self, sale: SaleReferences) -> Self {
        self.sale = sale;
        self
    }

    pub fn at(mut self, occurred_at: DateTime<Utc>) -> Self {
        self.occurred_at = Some(occurred_at);
        self
    }
}

/// Goods received against an optional supplier invoice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockIn {
    pub product_id: ProductId,
    pub quantity: i64,
    pub invoice_reference: Option<String>,
}

/// Goods dispatched to a customer; always produces a sale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockOut {
    pub product_id: ProductId,
    pub quantity: i64,
    pub order_reference: Option<String>,
    pub customer_reference: Option<String>,
    pub unit_price: Option<u64>,
    pub notes: Option<String>,
}

impl StockIn {
    fn into_request(self) -> MovementRequest {
        let mut reason = String::from("Stock received");
        if let Some(invoice) = &self.invoice_reference {
            reason.push_str(" - Invoice: ");
            reason.push_str(invoice);
        }
        let mut request = MovementRequest::new(self.product_id, MovementKind::Receiving, self.quantity)
            .with_reason(reason);
        request.reference = self.invoice_reference;
        request
    }
}

impl StockOut {
    pub fn new(product_id: ProductId, quantity: i64) -> Self {
        Self {
            product_id,
            quantity,
            order_reference: None,
            customer_reference: None,
            unit_price: None,
            notes: None,
        }
    }

    fn into_request(self) -> MovementRequest {
        let mut reason = String::from("Stock dispatched");
        if let Some(order) = &self.order_reference {
            reason.push_str(" - Order: ");
            reason.push_str(order);
        }
        if let Some(customer) = &self.customer_reference {
            reason.push_str(" - Customer: ");
            reason.push_str(customer);
        }

        let mut request =
            MovementRequest::new(self.product_id, MovementKind::Dispatching, self.quantity)
                .with_reason(reason);
        request.reference = self.order_reference.clone();
        request.unit_price = self.unit_price;
        request.sale = SaleReferences {
            order_reference: self.order_reference,
            customer_reference: self.customer_reference,
            notes: self.notes,
        };
        request
    }
}

/// Result of a batch: entries are independent transactions, so everything
/// before the first failure stays committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchOutcome {
    pub committed: Vec<StockMovement>,
    /// Index into the input and the error that stopped the batch.
    pub failure: Option<(usize, ServiceError)>,
}

impl BatchOutcome {
    pub fn is_complete(&self) -> bool {
        self.failure.is_none()
    }
}

pub struct LedgerService<B> {
    store: Arc<dyn LedgerStore>,
    bus: B,
    alerts: Arc<dyn AlertSink>,
    locks: KeyedLocks<ProductId>,
    retry: RetryPolicy,
}

impl<B> core::fmt::Debug for LedgerService<B> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("LedgerService")
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl<B> LedgerService<B>
where
    B: EventBus<DomainMessage>,
{
    pub fn new(store: Arc<dyn LedgerStore>, bus: B, alerts: Arc<dyn AlertSink>) -> Self {
        Self {
            store,
            bus,
            alerts,
            locks: KeyedLocks::new(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn store(&self) -> &Arc<dyn LedgerStore> {
        &self.store
    }

    pub fn register_product(
        &self,
        new: NewProduct,
        actor: UserId,
    ) -> Result<Product, ServiceError> {
        let sku = new.sku.trim().to_string();
        if self.store.find_by_sku(&sku)?.is_some() {
            return Err(ServiceError::Conflict(format!("sku '{sku}' already exists")));
        }

        let product_id = ProductId::new(AggregateId::new());
        let mut product = Product::empty(product_id);
        let events = product.handle(&ProductCommand::RegisterProduct(RegisterProduct {
            product_id,
            sku,
            name: new.name,
            reorder_level: new.reorder_level,
            reorder_quantity: new.reorder_quantity,
            unit_price: new.unit_price,
            initial_stock: new.initial_stock,
            opening_movement_id: RecordId::new(),
            actor,
            occurred_at: Utc::now(),
        }))?;

        let committed = self.store.append(LedgerAppend {
            product_id,
            events: events.clone(),
            sale: None,
            expected: ExpectedVersion::Exact(0),
        })?;
        publish_committed(&self.bus, &committed);

        product.apply_all(&events);
        info!(
            %product_id,
            sku = %product.sku(),
            initial_stock = product.current_stock(),
            %actor,
            "product registered"
        );
        self.raise_low_stock(&product);
        Ok(product)
    }

    /// Idempotent: deactivating an inactive product is a no-op.
    pub fn deactivate_product(
        &self,
        product_id: ProductId,
        actor: UserId,
    ) -> Result<Product, ServiceError> {
        self.locks.with(product_id, || {
            self.retry.run("deactivate_product", || {
                let mut product = self.product(product_id)?;
                let events = product.handle(&ProductCommand::DeactivateProduct(DeactivateProduct {
                    product_id,
                    actor,
                    occurred_at: Utc::now(),
                }))?;
                if events.is_empty() {
                    return Ok(product);
                }

                let committed = self.store.append(LedgerAppend {
                    product_id,
                    events: events.clone(),
                    sale: None,
                    expected: ExpectedVersion::Exact(product.version()),
                })?;
                publish_committed(&self.bus, &committed);

                product.apply_all(&events);
                info!(%product_id, %actor, "product deactivated");
                Ok(product)
            })
        })
    }

    /// Record one movement and derive stock, status and (for DISPATCHING)
    /// the sale, atomically.
    pub fn record_movement(
        &self,
        request: MovementRequest,
        actor: UserId,
    ) -> Result<StockMovement, ServiceError> {
        let product_id = request.product_id;
        let movement_id = RecordId::new();

        let (movement, product) = self.locks.with(product_id, || {
            self.retry.run("record_movement", || {
                self.try_record(&request, movement_id, actor)
            })
        })?;

        info!(
            %product_id,
            kind = %movement.kind,
            quantity = movement.quantity,
            previous_stock = movement.previous_stock,
            new_stock = movement.new_stock,
            %actor,
            "stock movement recorded"
        );
        self.raise_low_stock(&product);
        Ok(movement)
    }

    fn try_record(
        &self,
        request: &MovementRequest,
        movement_id: RecordId,
        actor: UserId,
    ) -> Result<(StockMovement, Product), ServiceError> {
        let mut product = self.product(request.product_id)?;
        // Stamped after the load so entries stay in timestamp order; a clock
        // that stepped back is clamped to the ledger tail.
        let occurred_at = match request.occurred_at {
            Some(at) => at,
            None => product
                .last_movement_at()
                .map_or_else(Utc::now, |last| Utc::now().max(last)),
        };

        let events = product.handle(&ProductCommand::RecordMovement(RecordMovement {
            movement_id,
            product_id: request.product_id,
            kind: request.kind,
            quantity: request.quantity,
            reason: request.reason.clone(),
            reference: request.reference.clone(),
            actor,
            occurred_at,
        }))?;

        let movement = events
            .iter()
            .find_map(ProductEvent::as_movement)
            .cloned()
            .ok_or_else(|| ServiceError::Validation("movement produced no ledger entry".into()))?;

        let unit_price = request.unit_price.or(product.unit_price()).unwrap_or(0);
        let sale = SaleRecord::from_movement(&movement, unit_price, request.sale.clone());

        let committed = self.store.append(LedgerAppend {
            product_id: request.product_id,
            events: events.clone(),
            sale,
            expected: ExpectedVersion::Exact(product.version()),
        })?;
        publish_committed(&self.bus, &committed);

        product.apply_all(&events);
        Ok((movement, product))
    }

    pub fn stock_in(&self, stock_in: StockIn, actor: UserId) -> Result<StockMovement, ServiceError> {
        self.record_movement(stock_in.into_request(), actor)
    }

    pub fn stock_out(
        &self,
        stock_out: StockOut,
        actor: UserId,
    ) -> Result<StockMovement, ServiceError> {
        self.record_movement(stock_out.into_request(), actor)
    }

    pub fn batch_stock_in(&self, batch: Vec<StockIn>, actor: UserId) -> BatchOutcome {
        self.run_batch(batch.into_iter().map(StockIn::into_request), actor)
    }

    pub fn batch_stock_out(&self, batch: Vec<StockOut>, actor: UserId) -> BatchOutcome {
        self.run_batch(batch.into_iter().map(StockOut::into_request), actor)
    }

    fn run_batch(
        &self,
        requests: impl Iterator<Item = MovementRequest>,
        actor: UserId,
    ) -> BatchOutcome {
        let mut committed = Vec::new();
        for (idx, request) in requests.enumerate() {
            match self.record_movement(request, actor) {
                Ok(movement) => committed.push(movement),
                Err(err) => {
                    warn!(index = idx, committed = committed.len(), error = %err, "batch stopped");
                    return BatchOutcome {
                        committed,
                        failure: Some((idx, err)),
                    };
                }
            }
        }
        BatchOutcome {
            committed,
            failure: None,
        }
    }

    pub fn product(&self, product_id: ProductId) -> Result<Product, ServiceError> {
        self.store
            .load_product(product_id)?
            .ok_or_else(|| ServiceError::not_found(format!("product {product_id}")))
    }

    pub fn find_by_sku(&self, sku: &str) -> Result<Option<Product>, ServiceError> {
        Ok(self.store.find_by_sku(sku)?)
    }

    /// All registered products ordered by SKU.
    pub fn list_products(&self) -> Result<Vec<Product>, ServiceError> {
        Ok(self.store.products()?)
    }

    pub fn active_products(&self) -> Result<Vec<Product>, ServiceError> {
        Ok(self
            .store
            .products()?
            .into_iter()
            .filter(Product::is_active)
            .collect())
    }

    /// Ledger of one product, oldest first.
    pub fn movements(&self, product_id: ProductId) -> Result<Vec<StockMovement>, ServiceError> {
        self.product(product_id)?;
        Ok(self.store.movements(product_id)?)
    }

    pub fn movements_by_actor(&self, actor: UserId) -> Result<Vec<StockMovement>, ServiceError> {
        Ok(self.store.movements_by_actor(actor)?)
    }

    /// Sales of one product with `start <= sale_date <= end`.
    pub fn sales(
        &self,
        product_id: ProductId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<SaleRecord>, ServiceError> {
        self.product(product_id)?;
        Ok(self.store.sales(product_id, start, end)?)
    }

    /// Zero-filled daily sold quantities for `start..=end`.
    pub fn daily_quantities(
        &self,
        product_id: ProductId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DailySales>, ServiceError> {
        let sales = self.sales(product_id, start, end)?;
        Ok(dense_daily_series(&sales, start, end))
    }

    fn raise_low_stock(&self, product: &Product) {
        if let Some(alert) = low_stock_alert(product, Utc::now()) {
            self.alerts.emit(alert);
        }
    }
}
