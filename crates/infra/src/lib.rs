//! Infrastructure layer: stores, services, external predictor, config.

pub mod alerts;
pub mod command_dispatcher;
pub mod config;
pub mod error;
pub mod forecast_service;
pub mod ledger_service;
pub mod locks;
pub mod predictor;
pub mod reorder_service;
pub mod services;
pub mod store;
pub mod sweep;


pub use alerts::{AlertSink, BusAlertSink, InMemoryAlertSink, SuppressingAlertSink};
pub use command_dispatcher::{CommandDispatcher, DomainMessage, RetryPolicy};
pub use config::StockwiseConfig;
pub use error::ServiceError;
pub use forecast_service::{AtRiskProduct, ForecastService};
pub use ledger_service::{BatchOutcome, LedgerService, MovementRequest, NewProduct, StockIn, StockOut};
pub use reorder_service::ReorderService;
pub use services::Stockwise;
pub use sweep::{RestockSuggestion, RestockTrigger, SweepReport, Sweeper};
