//! In-process wiring of every service over the in-memory stores.

use std::sync::Arc;

use tracing::info;

use stockwise_alerting::AlertIntent;
use stockwise_events::InMemoryEventBus;
use stockwise_reorder::ReorderEvent;

use crate::alerts::{AlertSink, BusAlertSink, SuppressingAlertSink};
use crate::command_dispatcher::{DomainMessage, RetryPolicy};
use crate::config::StockwiseConfig;
use crate::forecast_service::ForecastService;
use crate::ledger_service::LedgerService;
use crate::predictor::engine_from_config;
use crate::reorder_service::ReorderService;
use crate::store::{InMemoryEventStore, InMemoryForecastStore, InMemoryLedgerStore, LedgerStore};
use crate::sweep::Sweeper;

pub type DomainBus = Arc<InMemoryEventBus<DomainMessage>>;
pub type AlertBus = Arc<InMemoryEventBus<AlertIntent>>;
pub type InMemoryReorderService = ReorderService<InMemoryEventStore<ReorderEvent>, DomainBus>;

/// Every service sharing one set of stores, buses and alert suppression.
///
/// Domain events go out on [`Stockwise::domain_bus`]; alerts that survive
/// suppression go out on [`Stockwise::alert_bus`].
pub struct Stockwise {
    pub ledger: Arc<LedgerService<DomainBus>>,
    pub reorders: InMemoryReorderService,
    pub forecasts: Arc<ForecastService>,
    pub sweeper: Sweeper,
    domain_bus: DomainBus,
    alert_bus: AlertBus,
    config: StockwiseConfig,
}

impl core::fmt::Debug for Stockwise {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Stockwise")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Stockwise {
    pub fn in_memory(config: StockwiseConfig) -> Self {
        let domain_bus: DomainBus = Arc::new(InMemoryEventBus::new());
        let alert_bus: AlertBus = Arc::new(InMemoryEventBus::new());
        let alerts: Arc<dyn AlertSink> = Arc::new(SuppressingAlertSink::new(
            BusAlertSink::new(alert_bus.clone()),
            config.alerts.suppression_window(),
        ));

        let ledger_store: Arc<dyn LedgerStore> = Arc::new(InMemoryLedgerStore::new());
        let retry = RetryPolicy::from_config(&config.ledger);

        let ledger = Arc::new(
            LedgerService::new(ledger_store.clone(), domain_bus.clone(), alerts.clone())
                .with_retry(retry),
        );
        let reorders = ReorderService::new(InMemoryEventStore::new(), domain_bus.clone(), ledger.clone())
            .with_retry(retry);
        let forecasts = Arc::new(ForecastService::new(
            ledger_store.clone(),
            Arc::new(InMemoryForecastStore::new()),
            engine_from_config(&config),
            alerts.clone(),
            config.forecast.clone(),
        ));
        let sweeper = Sweeper::new(ledger_store, forecasts.clone(), alerts, config.sweep.workers);

        info!(
            predictor = %forecasts.engine().primary_name(),
            workers = config.sweep.workers,
            "stockwise services ready"
        );

        Self {
            ledger,
            reorders,
            forecasts,
            sweeper,
            domain_bus,
            alert_bus,
            config,
        }
    }

    /// Initialise logging per `config.log`, then wire the services.
    pub fn start(config: StockwiseConfig) -> Self {
        stockwise_observability::init_with(&config.log);
        Self::in_memory(config)
    }

    pub fn domain_bus(&self) -> &DomainBus {
        &self.domain_bus
    }

    pub fn alert_bus(&self) -> &AlertBus {
        &self.alert_bus
    }

    pub fn config(&self) -> &StockwiseConfig {
        &self.config
    }
}
