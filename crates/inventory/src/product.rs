use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockwise_core::{Aggregate, AggregateId, AggregateRoot, DomainError, RecordId, UserId};
use stockwise_events::Event;

use crate::movement::{MovementKind, StockMovement};
use crate::status::StockStatus;

/// Product identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductId(pub AggregateId);

impl ProductId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for ProductId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Aggregate root: Product.
///
/// `current_stock` and `stock_status` only change through
/// [`ProductEvent::MovementRecorded`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Product {
    id: ProductId,
    sku: String,
    name: String,
    reorder_level: i64,
    reorder_quantity: i64,
    /// Price in smallest currency unit (e.g., cents).
    unit_price: Option<u64>,
    current_stock: i64,
    stock_status: StockStatus,
    active: bool,
    created_at: Option<DateTime<Utc>>,
    last_movement_at: Option<DateTime<Utc>>,
    version: u64,
    created: bool,
}

impl Product {
    /// Create an empty, not-yet-registered aggregate instance for rehydration.
    pub fn empty(id: ProductId) -> Self {
        Self {
            id,
            sku: String::new(),
            name: String::new(),
            reorder_level: 0,
            reorder_quantity: 1,
            unit_price: None,
            current_stock: 0,
            stock_status: StockStatus::OutOfStock,
            active: false,
            created_at: None,
            last_movement_at: None,
            version: 0,
            created: false,
        }
    }

    /// Rebuild a product from its full event history.
    pub fn from_history<'a, I>(id: ProductId, events: I) -> Self
    where
        I: IntoIterator<Item = &'a ProductEvent>,
    {
        let mut product = Self::empty(id);
        product.apply_all(events);
        product
    }

    pub fn id_typed(&self) -> ProductId {
        self.id
    }

    pub fn sku(&self) -> &str {
        &self.sku
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn reorder_level(&self) -> i64 {
        self.reorder_level
    }

    pub fn reorder_quantity(&self) -> i64 {
        self.reorder_quantity
    }

    pub fn unit_price(&self) -> Option<u64> {
        self.unit_price
    }

    pub fn current_stock(&self) -> i64 {
        self.current_stock
    }

    pub fn stock_status(&self) -> StockStatus {
        self.stock_status
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn is_registered(&self) -> bool {
        self.created
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    /// Timestamp of the newest ledger entry. New entries may not precede it.
    pub fn last_movement_at(&self) -> Option<DateTime<Utc>> {
        self.last_movement_at
    }
}

impl AggregateRoot for Product {
    type Id = ProductId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: RegisterProduct.
///
/// A positive `initial_stock` is booked as an opening RECEIVING entry so the
/// ledger always folds from zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterProduct {
    pub product_id: ProductId,
    pub sku: String,
    pub name: String,
    pub reorder_level: i64,
    pub reorder_quantity: i64,
    pub unit_price: Option<u64>,
    pub initial_stock: i64,
    pub opening_movement_id: RecordId,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RecordMovement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordMovement {
    pub movement_id: RecordId,
    pub product_id: ProductId,
    pub kind: MovementKind,
    pub quantity: i64,
    pub reason: Option<String>,
    pub reference: Option<String>,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: DeactivateProduct (removes it from sweeps; the ledger stays).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeactivateProduct {
    pub product_id: ProductId,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProductCommand {
    RegisterProduct(RegisterProduct),
    RecordMovement(RecordMovement),
    DeactivateProduct(DeactivateProduct),
}

/// Event: ProductRegistered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductRegistered {
    pub product_id: ProductId,
    pub sku: String,
    pub name: String,
    pub reorder_level: i64,
    pub reorder_quantity: i64,
    pub unit_price: Option<u64>,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ProductDeactivated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductDeactivated {
    pub product_id: ProductId,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProductEvent {
    ProductRegistered(ProductRegistered),
    MovementRecorded(StockMovement),
    ProductDeactivated(ProductDeactivated),
}

impl ProductEvent {
    pub fn as_movement(&self) -> Option<&StockMovement> {
        match self {
            ProductEvent::MovementRecorded(m) => Some(m),
            _ => None,
        }
    }
}

impl Event for ProductEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ProductEvent::ProductRegistered(_) => "inventory.product.registered",
            ProductEvent::MovementRecorded(_) => "inventory.movement.recorded",
            ProductEvent::ProductDeactivated(_) => "inventory.product.deactivated",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            ProductEvent::ProductRegistered(e) => e.occurred_at,
            ProductEvent::MovementRecorded(m) => m.recorded_at,
            ProductEvent::ProductDeactivated(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Product {
    type Command = ProductCommand;
    type Event = ProductEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            ProductEvent::ProductRegistered(e) => {
                self.id = e.product_id;
                self.sku = e.sku.clone();
                self.name = e.name.clone();
                self.reorder_level = e.reorder_level;
                self.reorder_quantity = e.reorder_quantity;
                self.unit_price = e.unit_price;
                self.current_stock = 0;
                self.active = true;
                self.created_at = Some(e.occurred_at);
                self.created = true;
            }
            ProductEvent::MovementRecorded(m) => {
                self.current_stock = m.new_stock;
                self.last_movement_at = Some(m.recorded_at);
            }
            ProductEvent::ProductDeactivated(_) => {
                self.active = false;
            }
        }

        self.stock_status = StockStatus::derive(self.current_stock, self.reorder_level);
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            ProductCommand::RegisterProduct(cmd) => self.handle_register(cmd),
            ProductCommand::RecordMovement(cmd) => self.handle_record(cmd),
            ProductCommand::DeactivateProduct(cmd) => self.handle_deactivate(cmd),
        }
    }
}

impl Product {
    fn ensure_product_id(&self, product_id: ProductId) -> Result<(), DomainError> {
        if self.id != product_id {
            return Err(DomainError::invariant("product_id mismatch"));
        }
        Ok(())
    }

    fn handle_register(&self, cmd: &RegisterProduct) -> Result<Vec<ProductEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("product already exists"));
        }
        if cmd.sku.trim().is_empty() {
            return Err(DomainError::validation("sku cannot be empty"));
        }
        if cmd.name.trim().is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }
        if cmd.reorder_level < 0 {
            return Err(DomainError::validation("reorder_level cannot be negative"));
        }
        if cmd.reorder_quantity < 1 {
            return Err(DomainError::validation("reorder_quantity must be at least 1"));
        }
        if cmd.initial_stock < 0 {
            return Err(DomainError::validation("initial_stock cannot be negative"));
        }

        let mut events = vec![ProductEvent::ProductRegistered(ProductRegistered {
            product_id: cmd.product_id,
            sku: cmd.sku.trim().to_string(),
            name: cmd.name.trim().to_string(),
            reorder_level: cmd.reorder_level,
            reorder_quantity: cmd.reorder_quantity,
            unit_price: cmd.unit_price,
            actor: cmd.actor,
            occurred_at: cmd.occurred_at,
        })];

        if cmd.initial_stock > 0 {
            events.push(ProductEvent::MovementRecorded(StockMovement {
                id: cmd.opening_movement_id,
                product_id: cmd.product_id,
                kind: MovementKind::Receiving,
                quantity: cmd.initial_stock,
                previous_stock: 0,
                new_stock: cmd.initial_stock,
                actor: cmd.actor,
                reason: Some("Opening stock".to_string()),
                reference: None,
                recorded_at: cmd.occurred_at,
            }));
        }

        Ok(events)
    }

    fn handle_record(&self, cmd: &RecordMovement) -> Result<Vec<ProductEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_product_id(cmd.product_id)?;
        if let Some(last) = self.last_movement_at.filter(|last| cmd.occurred_at < *last) {
            return Err(DomainError::validation(format!(
                "movement at {} precedes the latest ledger entry at {last}",
                cmd.occurred_at
            )));
        }

        let previous_stock = self.current_stock;
        let new_stock = cmd.kind.resulting_stock(previous_stock, cmd.quantity)?;

        Ok(vec![ProductEvent::MovementRecorded(StockMovement {
            id: cmd.movement_id,
            product_id: cmd.product_id,
            kind: cmd.kind,
            quantity: cmd.quantity,
            previous_stock,
            new_stock,
            actor: cmd.actor,
            reason: cmd.reason.clone(),
            reference: cmd.reference.clone(),
            recorded_at: cmd.occurred_at,
        })])
    }

    fn handle_deactivate(
        &self,
        cmd: &DeactivateProduct,
    ) -> Result<Vec<ProductEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_product_id(cmd.product_id)?;

        if !self.active {
            return Ok(vec![]);
        }

        Ok(vec![ProductEvent::ProductDeactivated(ProductDeactivated {
            product_id: cmd.product_id,
            actor: cmd.actor,
            occurred_at: cmd.occurred_at,
        })])
    }
}
