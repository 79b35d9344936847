//! Inventory domain module: products and their movement ledger.
//!
//! Business rules only, implemented as deterministic domain logic (no IO, no
//! storage). Current stock is never written directly; it is the fold of the
//! product's recorded movements.

pub mod movement;
pub mod product;
pub mod status;

pub use movement::{MovementDirection, MovementKind, StockMovement, replay_stock};
pub use product::{
    DeactivateProduct, Product, ProductCommand, ProductDeactivated, ProductEvent, ProductId,
    ProductRegistered, RecordMovement, RegisterProduct,
};
pub use status::StockStatus;
