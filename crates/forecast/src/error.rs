use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure of a demand predictor.
///
/// Never surfaced to callers: the engine records it on the report and degrades
/// to the local model.
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize, Deserialize)]
pub enum PredictorError {
    #[error("predictor transport failed: {0}")]
    Transport(String),

    #[error("predictor timed out")]
    Timeout,

    #[error("predictor returned no predictions")]
    EmptyResponse,

    #[error("predictor returned an invalid response: {0}")]
    InvalidResponse(String),

    #[error("predictor is disabled")]
    Disabled,
}
