//! Forecast engine: predictor selection, fallback and risk metrics.

use std::sync::Arc;

use chrono::{DateTime, Days, NaiveDate, Utc};

use stockwise_core::DomainError;
use stockwise_inventory::{Product, ProductId};
use stockwise_sales::DailySales;

use crate::error::PredictorError;
use crate::model::{DemandForecast, ForecastPoint, ForecastReport, ForecastSummary};
use crate::period::ForecastPeriod;
use crate::predictor::{DemandPredictor, LocalSmaPredictor, PredictionCurve, PredictionRequest};
use crate::risk::RiskLevel;

const SNAPSHOT_LOWER_FACTOR: f64 = 0.7;
const SNAPSHOT_UPPER_FACTOR: f64 = 1.3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineSettings {
    /// Days of demand the restock recommendation aims to cover.
    pub restock_target_days: u32,
    pub max_horizon: u32,
    pub include_seasonality: bool,
    pub include_trends: bool,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            restock_target_days: 30,
            max_horizon: 365,
            include_seasonality: true,
            include_trends: true,
        }
    }
}

/// Everything the engine needs about one product at one point in time.
#[derive(Debug, Clone, PartialEq)]
pub struct ForecastInput {
    pub product_id: ProductId,
    pub sku: String,
    pub current_stock: i64,
    pub reorder_level: i64,
    pub reorder_quantity: i64,
    /// Dense daily sales ending on `as_of`.
    pub history: Vec<DailySales>,
    pub period: ForecastPeriod,
    pub horizon: u32,
    pub as_of: NaiveDate,
    pub computed_at: DateTime<Utc>,
}

impl ForecastInput {
    pub fn for_product(
        product: &Product,
        history: Vec<DailySales>,
        period: ForecastPeriod,
        horizon: u32,
        computed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            product_id: product.id_typed(),
            sku: product.sku().to_string(),
            current_stock: product.current_stock(),
            reorder_level: product.reorder_level(),
            reorder_quantity: product.reorder_quantity(),
            history,
            period,
            horizon,
            as_of: computed_at.date_naive(),
            computed_at,
        }
    }
}

/// Runs a forecast with an optional primary predictor and the local model as
/// fallback.
///
/// Identical inputs give identical reports on the local path; the engine never
/// reads the clock.
#[derive(Clone)]
pub struct ForecastEngine {
    settings: EngineSettings,
    local: LocalSmaPredictor,
    primary: Option<Arc<dyn DemandPredictor>>,
}

impl core::fmt::Debug for ForecastEngine {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ForecastEngine")
            .field("settings", &self.settings)
            .field("primary", &self.primary.as_ref().map(|p| p.name().to_string()))
            .finish()
    }
}

impl Default for ForecastEngine {
    fn default() -> Self {
        Self::new(EngineSettings::default())
    }
}

impl ForecastEngine {
    pub fn new(settings: EngineSettings) -> Self {
        Self {
            settings,
            local: LocalSmaPredictor::new(),
            primary: None,
        }
    }

    pub fn with_predictor(mut self, predictor: Arc<dyn DemandPredictor>) -> Self {
        self.primary = Some(predictor);
        self
    }

    pub fn settings(&self) -> EngineSettings {
        self.settings
    }

    pub fn primary_name(&self) -> &str {
        self.primary
            .as_deref()
            .map(|p| p.name())
            .unwrap_or_else(|| self.local.name())
    }

    pub fn forecast(&self, input: &ForecastInput) -> Result<ForecastReport, DomainError> {
        if input.horizon == 0 || input.horizon > self.settings.max_horizon {
            return Err(DomainError::validation(format!(
                "horizon must be between 1 and {}",
                self.settings.max_horizon
            )));
        }
        if input.current_stock < 0 {
            return Err(DomainError::invariant("current_stock cannot be negative"));
        }
        let start_date = input
            .as_of
            .checked_add_days(Days::new(1))
            .ok_or_else(|| DomainError::validation("as_of date out of range"))?;

        let request = PredictionRequest {
            product_id: input.product_id,
            sku: &input.sku,
            history: &input.history,
            period: input.period,
            horizon: input.horizon,
            start_date,
            reorder_quantity: input.reorder_quantity,
            include_seasonality: self.settings.include_seasonality,
            include_trends: self.settings.include_trends,
        };

        let (curve, fallback) = match &self.primary {
            None => (self.local.curve(&request), None),
            Some(primary) => match primary.predict(&request) {
                Ok(curve) if !curve.days.is_empty() => (curve, None),
                Ok(_) => (self.local.curve(&request), Some(PredictorError::EmptyResponse)),
                Err(err) => (self.local.curve(&request), Some(err)),
            },
        };

        Ok(self.assemble(input, curve, fallback))
    }

    fn assemble(
        &self,
        input: &ForecastInput,
        curve: PredictionCurve,
        fallback: Option<PredictorError>,
    ) -> ForecastReport {
        let avg = curve.average_daily_demand;
        let days = days_until_stockout(input.current_stock, avg);
        let restock = recommended_restock(
            avg,
            input.current_stock,
            input.reorder_quantity,
            self.settings.restock_target_days,
        );
        let risk = RiskLevel::assess(days);

        let mut projected = input.current_stock;
        let points: Vec<ForecastPoint> = curve
            .days
            .iter()
            .map(|day| {
                projected = projected.saturating_sub(day.predicted);
                ForecastPoint {
                    date: day.date,
                    predicted_demand: day.predicted,
                    lower_bound: day.lower,
                    upper_bound: day.upper,
                    confidence: day.confidence,
                    projected_stock: projected.max(0),
                    stockout_risk: projected <= 0,
                }
            })
            .collect();

        let summary = ForecastSummary {
            total_predicted_demand: curve.total_demand,
            average_daily_demand: avg.ceil() as i64,
            peak_demand: curve.peak_demand,
            peak_demand_date: curve.peak_date,
            days_until_stockout: days,
            recommended_restock: restock,
            risk,
            recommendations: recommendations(days, restock, input.current_stock, input.reorder_level),
        };

        let total = curve.total_demand;
        let snapshot = DemandForecast {
            product_id: input.product_id,
            as_of: input.as_of,
            computed_at: input.computed_at,
            period: input.period,
            predicted_demand: total,
            lower_bound: (total as f64 * SNAPSHOT_LOWER_FACTOR).floor() as i64,
            upper_bound: (total as f64 * SNAPSHOT_UPPER_FACTOR).floor() as i64,
            confidence_score: curve.confidence,
            current_stock: input.current_stock,
            recommended_restock: restock,
            days_until_stockout: days,
            is_at_risk: DemandForecast::at_risk(days),
            model_version: curve.model_version,
        };

        ForecastReport {
            snapshot,
            start_date: points.first().map(|p| p.date),
            end_date: points.last().map(|p| p.date),
            points,
            summary,
            fallback,
        }
    }
}

/// `floor(stock / avg)`; `None` when demand is zero.
pub fn days_until_stockout(current_stock: i64, avg_daily_demand: f64) -> Option<u32> {
    if avg_daily_demand <= 0.0 || !avg_daily_demand.is_finite() {
        return None;
    }
    let days = (current_stock.max(0) as f64 / avg_daily_demand).floor();
    Some(days.min(f64::from(u32::MAX)) as u32)
}

/// Units needed to cover `target_days` of demand, never below the product's
/// reorder quantity nor below zero.
pub fn recommended_restock(
    avg_daily_demand: f64,
    current_stock: i64,
    reorder_quantity: i64,
    target_days: u32,
) -> i64 {
    let target_stock = (avg_daily_demand * f64::from(target_days)).ceil() as i64;
    let shortfall = target_stock.saturating_sub(current_stock).max(0);
    shortfall.max(reorder_quantity).max(0)
}

pub fn recommendations(
    days_until_stockout: Option<u32>,
    recommended_restock: i64,
    current_stock: i64,
    reorder_level: i64,
) -> Vec<String> {
    let mut out = Vec::new();

    match RiskLevel::assess(days_until_stockout) {
        RiskLevel::Critical => {
            out.push("URGENT: Place emergency restock order immediately".to_string());
            out.push("Consider expedited shipping options".to_string());
        }
        RiskLevel::High => out.push("Place restock order within the next 1-2 days".to_string()),
        RiskLevel::Medium => out.push("Schedule restock order for next week".to_string()),
        RiskLevel::Low => {}
    }

    if recommended_restock > 0 {
        out.push(format!(
            "Suggested restock quantity: {recommended_restock} units"
        ));
    }

    if current_stock <= reorder_level {
        out.push("Stock is below reorder level - immediate action recommended".to_string());
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predictor::{LOCAL_MODEL_VERSION, PredictedDay};
    use chrono::TimeZone;
    use stockwise_core::AggregateId;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn flat_history(days: u64, quantity: i64, end: NaiveDate) -> Vec<DailySales> {
        (0..days)
            .rev()
            .map(|back| DailySales {
                date: end - Days::new(back),
                quantity,
                unit_price: Some(1_000),
            })
            .collect()
    }

    fn input(current_stock: i64, reorder_quantity: i64, history: Vec<DailySales>, horizon: u32) -> ForecastInput {
        ForecastInput {
            product_id: ProductId::new(AggregateId::new()),
            sku: "SKU-42".to_string(),
            current_stock,
            reorder_level: 20,
            reorder_quantity,
            history,
            period: ForecastPeriod::Daily,
            horizon,
            as_of: date(2024, 6, 30),
            computed_at: Utc.with_ymd_and_hms(2024, 6, 30, 2, 0, 0).unwrap(),
        }
    }

    struct FailingPredictor(PredictorError);

    impl DemandPredictor for FailingPredictor {
        fn name(&self) -> &str {
            "failing"
        }

        fn predict(&self, _: &PredictionRequest<'_>) -> Result<PredictionCurve, PredictorError> {
            Err(self.0.clone())
        }
    }

    struct FixedPredictor(PredictionCurve);

    impl DemandPredictor for FixedPredictor {
        fn name(&self) -> &str {
            "fixed"
        }

        fn predict(&self, _: &PredictionRequest<'_>) -> Result<PredictionCurve, PredictorError> {
            Ok(self.0.clone())
        }
    }

    fn remote_curve(quantities: &[i64]) -> PredictionCurve {
        let days = quantities
            .iter()
            .enumerate()
            .map(|(i, q)| PredictedDay {
                date: date(2024, 7, 1) + Days::new(i as u64),
                predicted: *q,
                lower: q - 1,
                upper: q + 1,
                confidence: 0.9,
            })
            .collect();
        PredictionCurve::from_days("ARIMA_V3", 0.87, days).unwrap()
    }

    #[test]
    fn fifty_units_at_five_a_day_is_medium_risk() {
        let history = flat_history(30, 5, date(2024, 6, 30));
        let report = ForecastEngine::default()
            .forecast(&input(50, 40, history, 14))
            .unwrap();

        let s = &report.snapshot;
        assert_eq!(s.days_until_stockout, Some(10));
        assert_eq!(s.risk_level(), RiskLevel::Medium);
        assert_eq!(s.recommended_restock, 100);
        assert!(s.is_at_risk);
        assert_eq!(s.model_version, LOCAL_MODEL_VERSION);
        assert_eq!(s.confidence_score, 0.75);
        assert_eq!(s.predicted_demand, 70);
        assert_eq!(s.lower_bound, 49);
        assert_eq!(s.upper_bound, 91);
        assert_eq!(report.summary.average_daily_demand, 5);
        assert_eq!(report.start_date, Some(date(2024, 7, 1)));
        assert_eq!(report.end_date, Some(date(2024, 7, 14)));
        assert!(!report.used_fallback());
    }

    #[test]
    fn reorder_quantity_floors_the_recommendation() {
        let history = flat_history(30, 5, date(2024, 6, 30));
        let report = ForecastEngine::default()
            .forecast(&input(50, 150, history, 14))
            .unwrap();
        assert_eq!(report.snapshot.recommended_restock, 150);
    }

    #[test]
    fn projected_stock_marks_stockout_days() {
        let history = flat_history(10, 5, date(2024, 6, 30));
        let report = ForecastEngine::default()
            .forecast(&input(12, 10, history, 4))
            .unwrap();

        let projected: Vec<i64> = report.points.iter().map(|p| p.projected_stock).collect();
        let risk: Vec<bool> = report.points.iter().map(|p| p.stockout_risk).collect();
        assert_eq!(projected, vec![7, 2, 0, 0]);
        assert_eq!(risk, vec![false, false, true, true]);
        assert_eq!(report.snapshot.risk_level(), RiskLevel::Critical);
    }

    #[test]
    fn failing_predictor_is_indistinguishable_from_local() {
        let history = flat_history(30, 3, date(2024, 6, 30));
        let local = ForecastEngine::default()
            .forecast(&input(40, 10, history.clone(), 14))
            .unwrap();

        for err in [
            PredictorError::Timeout,
            PredictorError::Transport("connection refused".to_string()),
        ] {
            let engine = ForecastEngine::default().with_predictor(Arc::new(FailingPredictor(err.clone())));
            let mut report = engine.forecast(&input(40, 10, history.clone(), 14)).unwrap();

            assert_eq!(report.fallback, Some(err));
            report.fallback = None;
            report.snapshot.product_id = local.snapshot.product_id;
            assert_eq!(report, local);
        }
    }

    #[test]
    fn empty_remote_curve_falls_back() {
        let empty = PredictionCurve {
            model_version: "ARIMA_V3".to_string(),
            confidence: 0.9,
            average_daily_demand: 0.0,
            total_demand: 0,
            peak_demand: 0,
            peak_date: None,
            days: vec![],
        };
        let engine = ForecastEngine::default().with_predictor(Arc::new(FixedPredictor(empty)));
        let report = engine
            .forecast(&input(40, 10, flat_history(30, 2, date(2024, 6, 30)), 7))
            .unwrap();

        assert_eq!(report.fallback, Some(PredictorError::EmptyResponse));
        assert_eq!(report.snapshot.model_version, LOCAL_MODEL_VERSION);
    }

    #[test]
    fn remote_curve_drives_metrics() {
        let engine = ForecastEngine::default()
            .with_predictor(Arc::new(FixedPredictor(remote_curve(&[4, 6, 8, 6]))));
        let report = engine.forecast(&input(30, 10, vec![], 4)).unwrap();

        let s = &report.snapshot;
        assert_eq!(s.model_version, "ARIMA_V3");
        assert_eq!(s.confidence_score, 0.87);
        assert_eq!(s.predicted_demand, 24);
        assert_eq!(s.days_until_stockout, Some(5));
        assert_eq!(s.recommended_restock, 150);
        assert_eq!(report.summary.peak_demand, 8);
        assert_eq!(report.summary.peak_demand_date, Some(date(2024, 7, 3)));
    }

    #[test]
    fn zero_remote_demand_means_no_stockout() {
        let engine = ForecastEngine::default()
            .with_predictor(Arc::new(FixedPredictor(remote_curve(&[0, 0, 0]))));
        let report = engine.forecast(&input(30, 10, vec![], 3)).unwrap();

        assert_eq!(report.snapshot.days_until_stockout, None);
        assert!(!report.snapshot.is_at_risk);
        assert_eq!(report.snapshot.risk_level(), RiskLevel::Low);
        assert_eq!(report.snapshot.recommended_restock, 10);
    }

    #[test]
    fn horizon_bounds_are_validated() {
        let engine = ForecastEngine::default();
        assert!(matches!(
            engine.forecast(&input(10, 10, vec![], 0)),
            Err(DomainError::Validation(_))
        ));
        assert!(engine.forecast(&input(10, 10, vec![], 366)).is_err());
    }

    #[test]
    fn recommendation_texts_follow_risk() {
        let critical = recommendations(Some(2), 40, 5, 20);
        assert_eq!(
            critical,
            vec![
                "URGENT: Place emergency restock order immediately",
                "Consider expedited shipping options",
                "Suggested restock quantity: 40 units",
                "Stock is below reorder level - immediate action recommended",
            ]
        );

        let calm = recommendations(None, 0, 100, 20);
        assert!(calm.is_empty());
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig {
                cases: 128,
                ..ProptestConfig::default()
            })]

            /// The local path is a pure function of its input.
            #[test]
            fn local_forecast_is_deterministic(
                quantities in prop::collection::vec(0i64..40, 1..180),
                stock in 0i64..2_000,
                reorder_quantity in 1i64..500,
                horizon in 1u32..90,
            ) {
                let end = date(2024, 6, 30);
                let history: Vec<DailySales> = quantities
                    .iter()
                    .enumerate()
                    .map(|(i, q)| DailySales {
                        date: end - Days::new((quantities.len() - 1 - i) as u64),
                        quantity: *q,
                        unit_price: None,
                    })
                    .collect();
                let engine = ForecastEngine::default();
                let input = input(stock, reorder_quantity, history, horizon);

                let a = engine.forecast(&input).unwrap();
                let b = engine.forecast(&input).unwrap();
                prop_assert_eq!(&a, &b);

                prop_assert_eq!(a.points.len() as u32, horizon);
                prop_assert!(a.snapshot.recommended_restock >= reorder_quantity);
                prop_assert!(a.snapshot.lower_bound <= a.snapshot.predicted_demand);
                prop_assert!(a.snapshot.predicted_demand <= a.snapshot.upper_bound);
                for p in &a.points {
                    prop_assert!(p.lower_bound <= p.predicted_demand && p.predicted_demand <= p.upper_bound);
                    prop_assert!(p.projected_stock >= 0);
                }
                prop_assert_eq!(
                    a.snapshot.is_at_risk,
                    a.snapshot.days_until_stockout.is_some_and(|d| d <= 14)
                );
            }
        }
    }
}
