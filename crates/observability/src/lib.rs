//! Tracing and logging setup shared by every binary and test harness.

/// Tracing configuration (filters, output format).
pub mod tracing;

pub use crate::tracing::{LogConfig, LogFormat};

/// Initialize process-wide logging with defaults (JSON, `info`).
///
/// Safe to call multiple times; subsequent calls are no-ops.
pub fn init() {
    tracing::init(&LogConfig::default());
}

/// Initialize process-wide logging from configuration.
pub fn init_with(config: &LogConfig) {
    tracing::init(config);
}
