//! Batch entry points over the whole catalogue.
//!
//! Nothing here schedules itself; callers decide when a sweep runs.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, mpsc};
use std::thread;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use stockwise_alerting::{AlertIntent, low_stock_alert, restock_suggestion_alert};
use stockwise_forecast::{ForecastPeriod, ForecastReport};
use stockwise_inventory::{Product, ProductId};

use crate::alerts::AlertSink;
use crate::error::ServiceError;
use crate::forecast_service::ForecastService;
use crate::store::LedgerStore;

/// Outcome of a forecast sweep; one entry per active product.
#[derive(Debug, Default)]
pub struct SweepReport {
    pub forecasted: Vec<ForecastReport>,
    pub failed: Vec<(ProductId, ServiceError)>,
}

impl SweepReport {
    pub fn attempted(&self) -> usize {
        self.forecasted.len() + self.failed.len()
    }
}

/// Why a product showed up in [`Sweeper::restock_suggestions`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestockTrigger {
    ForecastRisk,
    BelowReorderLevel,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RestockSuggestion {
    pub product: Product,
    pub suggested_quantity: i64,
    pub trigger: RestockTrigger,
    pub days_until_stockout: Option<u32>,
}

pub struct Sweeper {
    ledger: Arc<dyn LedgerStore>,
    forecasts: Arc<ForecastService>,
    alerts: Arc<dyn AlertSink>,
    workers: usize,
}

impl core::fmt::Debug for Sweeper {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Sweeper")
            .field("workers", &self.workers)
            .finish_non_exhaustive()
    }
}

impl Sweeper {
    pub fn new(
        ledger: Arc<dyn LedgerStore>,
        forecasts: Arc<ForecastService>,
        alerts: Arc<dyn AlertSink>,
        workers: usize,
    ) -> Self {
        Self {
            ledger,
            forecasts,
            alerts,
            workers: workers.max(1),
        }
    }

    fn active_products(&self) -> Result<Vec<Product>, ServiceError> {
        Ok(self
            .ledger
            .products()?
            .into_iter()
            .filter(Product::is_active)
            .collect())
    }

    pub fn run_forecast_sweep(
        &self,
        period: ForecastPeriod,
        horizon: u32,
    ) -> Result<SweepReport, ServiceError> {
        self.run_forecast_sweep_at(period, horizon, Utc::now())
    }

    /// Forecast every active product on at most `workers` threads.
    ///
    /// A failing product is logged and left out; the rest still run.
    pub fn run_forecast_sweep_at(
        &self,
        period: ForecastPeriod,
        horizon: u32,
        computed_at: DateTime<Utc>,
    ) -> Result<SweepReport, ServiceError> {
        let ids: Vec<ProductId> = self
            .active_products()?
            .iter()
            .map(Product::id_typed)
            .collect();
        let next = AtomicUsize::new(0);
        let (tx, rx) = mpsc::channel();
        let workers = self.workers.min(ids.len().max(1));

        thread::scope(|scope| {
            for _ in 0..workers {
                let tx = tx.clone();
                let (ids, next) = (&ids, &next);
                scope.spawn(move || {
                    loop {
                        let i = next.fetch_add(1, Ordering::Relaxed);
                        let Some(&product_id) = ids.get(i) else {
                            break;
                        };
                        let result = self.forecasts.run_forecast_at(
                            product_id,
                            Some(horizon),
                            Some(period),
                            computed_at,
                        );
                        if tx.send((product_id, result)).is_err() {
                            break;
                        }
                    }
                });
            }
        });
        drop(tx);

        let mut report = SweepReport::default();
        for (product_id, result) in rx {
            match result {
                Ok(forecast) => report.forecasted.push(forecast),
                Err(err) => {
                    warn!(%product_id, error = %err, "forecast sweep skipped product");
                    report.failed.push((product_id, err));
                }
            }
        }

        info!(
            period = %period.as_str(),
            horizon,
            workers,
            forecasted = report.forecasted.len(),
            failed = report.failed.len(),
            "forecast sweep finished"
        );
        Ok(report)
    }

    /// Emit a low-stock alert for every active product that needs one.
    pub fn run_low_stock_sweep(&self) -> Result<Vec<AlertIntent>, ServiceError> {
        let now = Utc::now();
        let alerts: Vec<AlertIntent> = self
            .active_products()?
            .iter()
            .filter_map(|p| low_stock_alert(p, now))
            .collect();

        for alert in &alerts {
            self.alerts.emit(alert.clone());
        }
        info!(alerts = alerts.len(), "low stock sweep finished");
        Ok(alerts)
    }

    /// Active products that should be reordered, most urgent first.
    ///
    /// An at-risk latest forecast wins over the reorder-level check and
    /// carries its own recommended quantity.
    pub fn restock_suggestions(&self) -> Result<Vec<RestockSuggestion>, ServiceError> {
        let now = Utc::now();
        let mut suggestions = Vec::new();

        for product in self.active_products()? {
            let latest = self.forecasts.latest_forecast(product.id_typed())?;
            let suggestion = match latest.filter(|f| f.is_at_risk) {
                Some(forecast) => RestockSuggestion {
                    suggested_quantity: forecast
                        .recommended_restock
                        .max(product.reorder_quantity()),
                    trigger: RestockTrigger::ForecastRisk,
                    days_until_stockout: forecast.days_until_stockout,
                    product,
                },
                None if product.current_stock() <= product.reorder_level() => RestockSuggestion {
                    suggested_quantity: product.reorder_quantity(),
                    trigger: RestockTrigger::BelowReorderLevel,
                    days_until_stockout: None,
                    product,
                },
                None => continue,
            };

            let reason = match suggestion.trigger {
                RestockTrigger::ForecastRisk => format!(
                    "Forecast predicts stockout in {} days",
                    suggestion.days_until_stockout.unwrap_or_default()
                ),
                RestockTrigger::BelowReorderLevel => format!(
                    "Stock {} is at or below reorder level {}",
                    suggestion.product.current_stock(),
                    suggestion.product.reorder_level()
                ),
            };
            self.alerts.emit(restock_suggestion_alert(
                &suggestion.product,
                suggestion.suggested_quantity,
                &reason,
                now,
            ));
            suggestions.push(suggestion);
        }

        suggestions.sort_by(|a, b| {
            let urgency = |s: &RestockSuggestion| (s.days_until_stockout.is_none(), s.days_until_stockout);
            urgency(a)
                .cmp(&urgency(b))
                .then_with(|| a.product.sku().cmp(b.product.sku()))
        });
        Ok(suggestions)
    }
}
