//! Event contracts and in-process fan-out.
//!
//! Ledger entries and workflow transitions are facts ([`Event`]); alert intents
//! and other out-of-band notifications travel over an [`EventBus`].

pub mod bus;
pub mod event;
pub mod in_memory_bus;

pub use bus::{EventBus, Subscription};
pub use event::Event;
pub use in_memory_bus::InMemoryEventBus;
