//! Demand predictor strategy and the local simple-moving-average model.

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};

use stockwise_inventory::ProductId;
use stockwise_sales::{DailySales, total_quantity};

use crate::error::PredictorError;
use crate::period::ForecastPeriod;

pub const LOCAL_MODEL_VERSION: &str = "LOCAL_SMA_V1";

const LOCAL_CONFIDENCE: f64 = 0.75;
const LOWER_FACTOR: f64 = 0.7;
const UPPER_FACTOR: f64 = 1.3;
const PEAK_FACTOR: f64 = 1.5;
/// Days of reorder quantity assumed sold when there is no sales signal.
const BASELINE_DAYS: f64 = 30.0;

/// Input handed to a predictor.
#[derive(Debug, Clone, Copy)]
pub struct PredictionRequest<'a> {
    pub product_id: ProductId,
    pub sku: &'a str,
    /// Dense, zero-filled daily series ending on the as-of date.
    pub history: &'a [DailySales],
    pub period: ForecastPeriod,
    pub horizon: u32,
    /// First predicted day (day after the as-of date).
    pub start_date: NaiveDate,
    pub reorder_quantity: i64,
    pub include_seasonality: bool,
    pub include_trends: bool,
}

/// One predicted day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictedDay {
    pub date: NaiveDate,
    pub predicted: i64,
    pub lower: i64,
    pub upper: i64,
    pub confidence: f64,
}

/// Per-day demand curve plus the aggregates the engine needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionCurve {
    pub model_version: String,
    /// Overall confidence or accuracy in `[0, 1]`.
    pub confidence: f64,
    pub average_daily_demand: f64,
    pub total_demand: i64,
    pub peak_demand: i64,
    pub peak_date: Option<NaiveDate>,
    pub days: Vec<PredictedDay>,
}

impl PredictionCurve {
    /// Build a curve whose aggregates are read off the days themselves.
    ///
    /// Average is `sum / len`; the peak is the first day with the highest
    /// prediction.
    pub fn from_days(
        model_version: impl Into<String>,
        confidence: f64,
        days: Vec<PredictedDay>,
    ) -> Result<Self, PredictorError> {
        if days.is_empty() {
            return Err(PredictorError::EmptyResponse);
        }
        if !(0.0..=1.0).contains(&confidence) {
            return Err(PredictorError::InvalidResponse(format!(
                "confidence {confidence} outside [0, 1]"
            )));
        }
        if let Some(bad) = days.iter().find(|d| d.predicted < 0) {
            return Err(PredictorError::InvalidResponse(format!(
                "negative prediction on {}",
                bad.date
            )));
        }

        let total_demand: i64 = days.iter().map(|d| d.predicted).sum();
        let mut peak: Option<&PredictedDay> = None;
        for day in &days {
            if peak.is_none_or(|p| day.predicted > p.predicted) {
                peak = Some(day);
            }
        }

        Ok(Self {
            model_version: model_version.into(),
            confidence,
            average_daily_demand: total_demand as f64 / days.len() as f64,
            total_demand,
            peak_demand: peak.map(|p| p.predicted).unwrap_or(0),
            peak_date: peak.map(|p| p.date),
            days,
        })
    }
}

/// Demand prediction strategy.
///
/// Exactly two implementations exist: [`LocalSmaPredictor`] here and the
/// HTTP-backed remote predictor in `stockwise-infra`.
pub trait DemandPredictor: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &str;

    fn predict(&self, request: &PredictionRequest<'_>) -> Result<PredictionCurve, PredictorError>;
}

/// Deterministic flat-rate model: the trailing average projected forward.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalSmaPredictor;

impl LocalSmaPredictor {
    pub fn new() -> Self {
        Self
    }

    /// Average daily demand over the dense window.
    ///
    /// With no sales at all the baseline is `reorder_quantity / 30`.
    pub fn average_daily_demand(history: &[DailySales], reorder_quantity: i64) -> f64 {
        let total = total_quantity(history);
        let avg = if history.is_empty() {
            0.0
        } else {
            total as f64 / history.len() as f64
        };

        if avg > 0.0 {
            avg
        } else {
            reorder_quantity.max(0) as f64 / BASELINE_DAYS
        }
    }

    /// Infallible form used as the engine's fallback.
    pub fn curve(&self, request: &PredictionRequest<'_>) -> PredictionCurve {
        let avg = Self::average_daily_demand(request.history, request.reorder_quantity);

        let predicted = avg.ceil() as i64;
        let lower = (avg * LOWER_FACTOR).floor() as i64;
        let upper = (avg * UPPER_FACTOR).ceil() as i64;

        let days = (0..request.horizon)
            .filter_map(|i| request.start_date.checked_add_days(Days::new(u64::from(i))))
            .map(|date| PredictedDay {
                date,
                predicted,
                lower,
                upper,
                confidence: LOCAL_CONFIDENCE,
            })
            .collect();

        PredictionCurve {
            model_version: LOCAL_MODEL_VERSION.to_string(),
            confidence: LOCAL_CONFIDENCE,
            average_daily_demand: avg,
            total_demand: (avg * f64::from(request.horizon)).ceil() as i64,
            peak_demand: (avg * PEAK_FACTOR).ceil() as i64,
            peak_date: request
                .start_date
                .checked_add_days(Days::new(u64::from(request.horizon / 2))),
            days,
        }
    }
}

impl DemandPredictor for LocalSmaPredictor {
    fn name(&self) -> &str {
        "local-sma"
    }

    fn predict(&self, request: &PredictionRequest<'_>) -> Result<PredictionCurve, PredictorError> {
        Ok(self.curve(request))
    }
}
