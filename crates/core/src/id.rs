//! Identifiers. All are UUIDv7, so sorting by id sorts by creation time.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DomainError;

macro_rules! v7_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }

            /// Milliseconds since the Unix epoch embedded in the id.
            pub fn minted_at_millis(&self) -> Option<u64> {
                self.0.get_timestamp().map(|ts| {
                    let (secs, nanos) = ts.to_unix();
                    secs * 1_000 + u64::from(nanos / 1_000_000)
                })
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        }

        impl FromStr for $name {
            type Err = DomainError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s.trim())
                    .map(Self)
                    .map_err(|e| DomainError::invalid_id(format!("{}: {e}", stringify!($name))))
            }
        }
    };
}

v7_id!(
    /// The person or process behind a mutation; recorded on every ledger
    /// entry and workflow transition.
    UserId
);
v7_id!(
    /// Stream key of an aggregate (a product or a reorder request).
    AggregateId
);
v7_id!(
    /// Key of an immutable row: a movement, a sale, a forecast snapshot.
    RecordId
);
