//! Storage boundary.
//!
//! Stores make no storage-engine assumptions. The in-memory implementations
//! back tests and single-process deployments; a SQL backend must uphold the
//! same contracts:
//!
//! - a ledger append (product events plus derived sale) is all-or-nothing
//! - appends are checked against an [`ExpectedVersion`](stockwise_core::ExpectedVersion)
//! - streams and forecast snapshots come back in append order

pub mod in_memory;
pub mod r#trait;

pub use in_memory::{InMemoryEventStore, InMemoryForecastStore, InMemoryLedgerStore};
pub use r#trait::{EventStore, ForecastStore, LedgerAppend, LedgerStore, StoreError, StoredEvent};
