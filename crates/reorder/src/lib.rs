//! Reorder domain module (reorder requests, event-sourced).
//!
//! A reorder request only moves through explicit approval calls; forecasts may
//! suggest quantities but never change a request's status.

pub mod request;

pub use request::{
    Approve, Cancel, CreateReorderRequest, Fulfill, MarkOrdered, Reject, ReorderCommand,
    ReorderEvent, ReorderRequest, ReorderRequestId, ReorderStatus,
};
