//! `stockwise-forecast`
//!
//! Demand-risk engine: turns a dense daily sales series plus current stock into
//! a bounded demand prediction, a stockout horizon, a risk tier and a restock
//! recommendation.
//!
//! The crate performs no IO. Remote prediction plugs in through
//! [`DemandPredictor`]; whatever it returns, the local simple-moving-average
//! model is the fallback.

pub mod engine;
pub mod error;
pub mod model;
pub mod period;
pub mod predictor;
pub mod risk;

pub use engine::{EngineSettings, ForecastEngine, ForecastInput};
pub use error::PredictorError;
pub use model::{DemandForecast, ForecastPoint, ForecastReport, ForecastSummary};
pub use period::ForecastPeriod;
pub use predictor::{
    DemandPredictor, LOCAL_MODEL_VERSION, LocalSmaPredictor, PredictedDay, PredictionCurve,
    PredictionRequest,
};
pub use risk::{AT_RISK_DAYS, RiskLevel};
