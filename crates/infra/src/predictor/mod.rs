//! Demand predictor implementations that need IO.
//!
//! The local model lives in `stockwise-forecast`; this module adds the HTTP
//! client for an external prediction service and the selection by config.

pub mod remote;

use std::sync::Arc;

use tracing::{info, warn};

use stockwise_forecast::{DemandPredictor, ForecastEngine};

use crate::config::StockwiseConfig;

pub use remote::RemotePredictor;

/// Engine configured per `config`: the remote predictor in front of the local
/// model when enabled, the local model alone otherwise.
pub fn engine_from_config(config: &StockwiseConfig) -> ForecastEngine {
    let engine = ForecastEngine::new(config.engine_settings());
    if !config.predictor.enabled {
        return engine;
    }

    match RemotePredictor::from_config(&config.predictor) {
        Ok(remote) => {
            info!(url = %config.predictor.url, "remote demand predictor enabled");
            engine.with_predictor(Arc::new(remote) as Arc<dyn DemandPredictor>)
        }
        Err(err) => {
            warn!(error = %err, "remote demand predictor unavailable, using local model");
            engine
        }
    }
}
