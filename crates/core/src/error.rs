//! Failures a domain decision can produce.
//!
//! Everything here is deterministic: the same state and command always give
//! the same error. Storage and transport problems are modelled in infra.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Malformed or out-of-range input.
    #[error("validation failed: {0}")]
    Validation(String),

    /// State that must never exist, such as a ledger entry that does not
    /// continue the running total.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// The command targets an aggregate that was never created.
    #[error("not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),

    /// Outbound movement larger than the stock on hand.
    #[error("insufficient stock: available {available}, requested {requested}")]
    InsufficientStock { available: i64, requested: i64 },

    /// Workflow action not allowed from the current status.
    #[error("invalid transition: cannot {action} from {from}")]
    InvalidTransition { from: String, action: String },
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn not_found() -> Self {
        Self::NotFound
    }

    pub fn insufficient_stock(available: i64, requested: i64) -> Self {
        Self::InsufficientStock {
            available,
            requested,
        }
    }

    pub fn invalid_transition(from: impl core::fmt::Display, action: impl Into<String>) -> Self {
        Self::InvalidTransition {
            from: from.to_string(),
            action: action.into(),
        }
    }

    /// True when the caller asked for something the current state refuses,
    /// as opposed to sending bad input.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            Self::Conflict(_) | Self::InsufficientStock { .. } | Self::InvalidTransition { .. }
        )
    }
}
