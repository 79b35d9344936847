use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use stockwise_inventory::ProductId;

use crate::error::PredictorError;
use crate::period::ForecastPeriod;
use crate::risk::{AT_RISK_DAYS, RiskLevel};

/// One day of the transient forecast curve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastPoint {
    pub date: NaiveDate,
    pub predicted_demand: i64,
    pub lower_bound: i64,
    pub upper_bound: i64,
    pub confidence: f64,
    /// Stock left after this day's predicted demand, floored at zero.
    pub projected_stock: i64,
    pub stockout_risk: bool,
}

/// Human-facing aggregates of a forecast run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastSummary {
    pub total_predicted_demand: i64,
    pub average_daily_demand: i64,
    pub peak_demand: i64,
    pub peak_demand_date: Option<NaiveDate>,
    pub days_until_stockout: Option<u32>,
    pub recommended_restock: i64,
    pub risk: RiskLevel,
    pub recommendations: Vec<String>,
}

/// Persisted, immutable forecast snapshot.
///
/// Each run appends one; the per-product sequence is the forecast history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DemandForecast {
    pub product_id: ProductId,
    pub as_of: NaiveDate,
    pub computed_at: DateTime<Utc>,
    pub period: ForecastPeriod,
    /// Total demand over the horizon.
    pub predicted_demand: i64,
    pub lower_bound: i64,
    pub upper_bound: i64,
    pub confidence_score: f64,
    pub current_stock: i64,
    pub recommended_restock: i64,
    /// `None` when predicted demand is zero.
    pub days_until_stockout: Option<u32>,
    pub is_at_risk: bool,
    pub model_version: String,
}

impl DemandForecast {
    pub fn risk_level(&self) -> RiskLevel {
        RiskLevel::assess(self.days_until_stockout)
    }

    pub fn suggested_action(&self) -> &'static str {
        self.risk_level().suggested_action()
    }

    pub(crate) fn at_risk(days_until_stockout: Option<u32>) -> bool {
        days_until_stockout.is_some_and(|d| d <= AT_RISK_DAYS)
    }
}

/// Everything one forecast run produces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastReport {
    pub snapshot: DemandForecast,
    pub points: Vec<ForecastPoint>,
    pub summary: ForecastSummary,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    /// Set when the configured predictor failed and the local model answered.
    pub fallback: Option<PredictorError>,
}

impl ForecastReport {
    pub fn used_fallback(&self) -> bool {
        self.fallback.is_some()
    }
}
