//! Forecast service: history window, engine run, snapshot, alert.

use std::sync::Arc;

use chrono::{DateTime, Months, NaiveDate, Utc};
use tracing::{info, warn};

use stockwise_alerting::forecast_alert;
use stockwise_forecast::{
    DemandForecast, ForecastEngine, ForecastInput, ForecastPeriod, ForecastReport, RiskLevel,
};
use stockwise_inventory::{Product, ProductId};
use stockwise_sales::dense_daily_series;

use crate::alerts::AlertSink;
use crate::config::ForecastConfig;
use crate::error::ServiceError;
use crate::store::{ForecastStore, LedgerStore};

/// Row of the risk read-model.
#[derive(Debug, Clone, PartialEq)]
pub struct AtRiskProduct {
    pub product: Product,
    pub forecast: DemandForecast,
    pub risk: RiskLevel,
    pub suggested_action: &'static str,
}

pub struct ForecastService {
    ledger: Arc<dyn LedgerStore>,
    forecasts: Arc<dyn ForecastStore>,
    engine: ForecastEngine,
    alerts: Arc<dyn AlertSink>,
    config: ForecastConfig,
}

impl core::fmt::Debug for ForecastService {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ForecastService")
            .field("engine", &self.engine)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ForecastService {
    pub fn new(
        ledger: Arc<dyn LedgerStore>,
        forecasts: Arc<dyn ForecastStore>,
        engine: ForecastEngine,
        alerts: Arc<dyn AlertSink>,
        config: ForecastConfig,
    ) -> Self {
        Self {
            ledger,
            forecasts,
            engine,
            alerts,
            config,
        }
    }

    pub fn engine(&self) -> &ForecastEngine {
        &self.engine
    }

    pub fn config(&self) -> &ForecastConfig {
        &self.config
    }

    /// Forecast as of now. `None` picks the configured horizon/period.
    pub fn run_forecast(
        &self,
        product_id: ProductId,
        horizon: Option<u32>,
        period: Option<ForecastPeriod>,
    ) -> Result<ForecastReport, ServiceError> {
        self.run_forecast_at(product_id, horizon, period, Utc::now())
    }

    /// Forecast with `computed_at` as the as-of instant.
    ///
    /// The sales window ends on `computed_at`'s date; stock is the current
    /// ledger value.
    pub fn run_forecast_at(
        &self,
        product_id: ProductId,
        horizon: Option<u32>,
        period: Option<ForecastPeriod>,
        computed_at: DateTime<Utc>,
    ) -> Result<ForecastReport, ServiceError> {
        let product = self
            .ledger
            .load_product(product_id)?
            .ok_or_else(|| ServiceError::not_found(format!("product {product_id}")))?;

        let horizon = horizon.unwrap_or(self.config.default_horizon);
        let period = period.unwrap_or(self.config.default_period);
        let as_of = computed_at.date_naive();
        let start = self.window_start(&product, as_of)?;

        let sales = self.ledger.sales(product_id, start, as_of)?;
        let history = dense_daily_series(&sales, start, as_of);

        let input = ForecastInput::for_product(&product, history, period, horizon, computed_at);
        let report = self.engine.forecast(&input)?;

        if let Some(err) = &report.fallback {
            warn!(
                %product_id,
                predictor = %self.engine.primary_name(),
                error = %err,
                "demand predictor failed, used local model"
            );
        }

        self.forecasts.append(report.snapshot.clone())?;
        info!(
            %product_id,
            model = %report.snapshot.model_version,
            predicted_demand = report.snapshot.predicted_demand,
            days_until_stockout = ?report.snapshot.days_until_stockout,
            risk = %report.summary.risk.as_str(),
            "forecast computed"
        );

        if let Some(alert) = forecast_alert(&product, &report.snapshot, Utc::now()) {
            self.alerts.emit(alert);
        }

        Ok(report)
    }

    /// First day of the sales window: `history_months` back from `as_of`, but
    /// never before the product's first ledger activity.
    fn window_start(&self, product: &Product, as_of: NaiveDate) -> Result<NaiveDate, ServiceError> {
        let trailing = as_of
            .checked_sub_months(Months::new(self.config.history_months))
            .unwrap_or(NaiveDate::MIN);

        let first_movement = self
            .ledger
            .movements(product.id_typed())?
            .iter()
            .map(|m| m.recorded_at.date_naive())
            .min();
        let created = product.created_at().map(|at| at.date_naive());
        let first_activity = match (first_movement, created) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };

        Ok(first_activity
            .map(|first| first.max(trailing))
            .unwrap_or(trailing)
            .min(as_of))
    }

    pub fn latest_forecast(
        &self,
        product_id: ProductId,
    ) -> Result<Option<DemandForecast>, ServiceError> {
        Ok(self.forecasts.latest(product_id)?)
    }

    /// Snapshots for one product, newest first.
    pub fn forecast_history(
        &self,
        product_id: ProductId,
    ) -> Result<Vec<DemandForecast>, ServiceError> {
        Ok(self.forecasts.history(product_id)?)
    }

    /// Active products whose latest snapshot is at risk, soonest stockout
    /// first.
    pub fn list_at_risk_products(&self) -> Result<Vec<AtRiskProduct>, ServiceError> {
        let mut rows = Vec::new();
        for forecast in self.forecasts.latest_per_product()? {
            if !forecast.is_at_risk {
                continue;
            }
            let Some(product) = self.ledger.load_product(forecast.product_id)? else {
                continue;
            };
            if !product.is_active() {
                continue;
            }
            rows.push(AtRiskProduct {
                risk: forecast.risk_level(),
                suggested_action: forecast.suggested_action(),
                product,
                forecast,
            });
        }

        rows.sort_by(|a, b| {
            a.forecast
                .days_until_stockout
                .cmp(&b.forecast.days_until_stockout)
                .then_with(|| a.product.sku().cmp(b.product.sku()))
        });
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Days, TimeZone};
    use stockwise_core::UserId;
    use stockwise_events::InMemoryEventBus;
    use stockwise_forecast::{
        DemandPredictor, LOCAL_MODEL_VERSION, PredictionCurve, PredictionRequest, PredictorError,
    };
    use stockwise_inventory::MovementKind;

    use crate::alerts::InMemoryAlertSink;
    use crate::command_dispatcher::DomainMessage;
    use crate::ledger_service::{LedgerService, MovementRequest, NewProduct};
    use crate::store::{InMemoryForecastStore, InMemoryLedgerStore};

    struct Fixture {
        ledger: LedgerService<InMemoryEventBus<DomainMessage>>,
        forecasts: ForecastService,
        alerts: Arc<InMemoryAlertSink>,
    }

    fn fixture(engine: ForecastEngine) -> Fixture {
        let store: Arc<InMemoryLedgerStore> = Arc::new(InMemoryLedgerStore::new());
        let alerts = Arc::new(InMemoryAlertSink::new());
        let ledger = LedgerService::new(store.clone(), InMemoryEventBus::new(), alerts.clone());
        let forecasts = ForecastService::new(
            store,
            Arc::new(InMemoryForecastStore::new()),
            engine,
            alerts.clone(),
            ForecastConfig::default(),
        );
        Fixture {
            ledger,
            forecasts,
            alerts,
        }
    }

    fn as_of() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 30, 18, 0, 0).unwrap()
    }

    /// Stock 50 after 30 days of 5 units/day ending on `as_of`.
    fn seed_scenario(f: &Fixture) -> ProductId {
        let product = f
            .ledger
            .register_product(
                NewProduct {
                    sku: "SCN-1".to_string(),
                    name: "Scenario".to_string(),
                    reorder_level: 20,
                    reorder_quantity: 40,
                    unit_price: Some(100),
                    initial_stock: 0,
                },
                UserId::new(),
            )
            .unwrap();
        let id = product.id_typed();
        let first_day = as_of() - Days::new(29);
        let actor = UserId::new();

        f.ledger
            .record_movement(
                MovementRequest::new(id, MovementKind::Receiving, 200)
                    .at(first_day - chrono::Duration::hours(12)),
                actor,
            )
            .unwrap();
        for offset in 0..30 {
            f.ledger
                .record_movement(
                    MovementRequest::new(id, MovementKind::Dispatching, 5)
                        .at(first_day + Days::new(offset)),
                    actor,
                )
                .unwrap();
        }
        assert_eq!(f.ledger.product(id).unwrap().current_stock(), 50);
        f.alerts.take();
        id
    }

    #[test]
    fn scenario_fifty_units_at_five_per_day() {
        let f = fixture(ForecastEngine::default());
        let id = seed_scenario(&f);

        let report = f
            .forecasts
            .run_forecast_at(id, Some(14), None, as_of())
            .unwrap();

        assert_eq!(report.snapshot.model_version, LOCAL_MODEL_VERSION);
        assert_eq!(report.snapshot.current_stock, 50);
        assert_eq!(report.summary.risk, RiskLevel::Medium);
        assert_eq!(report.snapshot.days_until_stockout, Some(10));
        assert_eq!(report.snapshot.recommended_restock, 100);
        assert!(report.snapshot.is_at_risk);

        let alerts = f.alerts.take();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].title, "Stockout Risk Alert");
    }

    #[test]
    fn snapshots_accumulate_as_history() {
        let f = fixture(ForecastEngine::default());
        let id = seed_scenario(&f);

        f.forecasts.run_forecast_at(id, Some(7), None, as_of()).unwrap();
        f.forecasts
            .run_forecast_at(id, Some(14), Some(ForecastPeriod::Weekly), as_of())
            .unwrap();

        let history = f.forecasts.forecast_history(id).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].period, ForecastPeriod::Weekly);
        assert_eq!(
            f.forecasts.latest_forecast(id).unwrap().unwrap().period,
            ForecastPeriod::Weekly
        );
    }

    struct Failing;

    impl DemandPredictor for Failing {
        fn name(&self) -> &str {
            "failing"
        }

        fn predict(&self, _: &PredictionRequest<'_>) -> Result<PredictionCurve, PredictorError> {
            Err(PredictorError::Timeout)
        }
    }

    #[test]
    fn failing_predictor_is_transparent() {
        let local = fixture(ForecastEngine::default());
        let remote = fixture(ForecastEngine::default().with_predictor(Arc::new(Failing)));
        let a = seed_scenario(&local);
        let b = seed_scenario(&remote);

        let expected = local.forecasts.run_forecast_at(a, Some(14), None, as_of()).unwrap();
        let actual = remote.forecasts.run_forecast_at(b, Some(14), None, as_of()).unwrap();

        assert_eq!(actual.fallback, Some(PredictorError::Timeout));
        assert_eq!(actual.snapshot.model_version, LOCAL_MODEL_VERSION);
        assert_eq!(actual.snapshot.predicted_demand, expected.snapshot.predicted_demand);
        assert_eq!(actual.points, expected.points);
    }

    #[test]
    fn at_risk_listing_orders_by_days_and_skips_safe_products() {
        let f = fixture(ForecastEngine::default());
        let risky = seed_scenario(&f);
        let quiet = f
            .ledger
            .register_product(
                NewProduct {
                    sku: "QUIET".to_string(),
                    name: "Quiet".to_string(),
                    reorder_level: 0,
                    reorder_quantity: 1,
                    unit_price: None,
                    initial_stock: 500,
                },
                UserId::new(),
            )
            .unwrap()
            .id_typed();

        f.forecasts.run_forecast_at(risky, Some(14), None, as_of()).unwrap();
        f.forecasts.run_forecast_at(quiet, Some(14), None, as_of()).unwrap();

        let rows = f.forecasts.list_at_risk_products().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].product.id_typed(), risky);
        assert_eq!(rows[0].suggested_action, "Schedule order for next week");

        f.ledger.deactivate_product(risky, UserId::new()).unwrap();
        assert!(f.forecasts.list_at_risk_products().unwrap().is_empty());
    }

    #[test]
    fn unknown_product_is_not_found() {
        let f = fixture(ForecastEngine::default());
        let err = f
            .forecasts
            .run_forecast(ProductId::new(stockwise_core::AggregateId::new()), None, None)
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }
}
