//! `stockwise-core`: ids, errors and the aggregate contract shared by every
//! domain crate. No IO.

pub mod aggregate;
pub mod error;
pub mod id;

pub use aggregate::{Aggregate, AggregateRoot, ExpectedVersion};
pub use error::DomainError;
pub use id::{AggregateId, RecordId, UserId};
