use thiserror::Error;

use stockwise_core::DomainError;

use crate::store::StoreError;

/// Error surfaced by the ledger, reorder and forecast services.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ServiceError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("insufficient stock: available {available}, requested {requested}")]
    InsufficientStock { available: i64, requested: i64 },

    #[error("invalid transition: cannot {action} from {from}")]
    InvalidTransition { from: String, action: String },

    #[error("validation failed: {0}")]
    Validation(String),

    /// Uniqueness or existence clash (duplicate SKU, re-registration).
    #[error("conflict: {0}")]
    Conflict(String),

    /// Optimistic concurrency retries were exhausted.
    #[error("concurrency conflict: {0}")]
    ConcurrencyConflict(String),

    #[error(transparent)]
    Store(StoreError),
}

impl ServiceError {
    pub fn not_found(what: impl core::fmt::Display) -> Self {
        Self::NotFound(what.to_string())
    }
}

impl From<DomainError> for ServiceError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::Validation(msg) | DomainError::InvalidId(msg) => Self::Validation(msg),
            DomainError::InvariantViolation(msg) => Self::Validation(msg),
            DomainError::NotFound => Self::NotFound("entity".to_string()),
            DomainError::Conflict(msg) => Self::Conflict(msg),
            DomainError::InsufficientStock {
                available,
                requested,
            } => Self::InsufficientStock {
                available,
                requested,
            },
            DomainError::InvalidTransition { from, action } => {
                Self::InvalidTransition { from, action }
            }
        }
    }
}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Concurrency(msg) => Self::ConcurrencyConflict(msg),
            StoreError::Duplicate(msg) => Self::Conflict(format!("duplicate {msg}")),
            StoreError::NotFound(msg) => Self::NotFound(msg),
            other => Self::Store(other),
        }
    }
}
