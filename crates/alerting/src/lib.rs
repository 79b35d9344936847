//! Alert decisions.
//!
//! Pure functions from ledger and forecast state to [`AlertIntent`] records.
//! Delivery, fan-out and duplicate suppression belong to the infrastructure
//! layer.

pub mod intent;
pub mod rules;

pub use intent::{AlertIntent, AlertKind, AlertSeverity};
pub use rules::{
    forecast_alert, low_stock_alert, restock_suggestion_alert, should_alert_forecast,
    should_alert_low_stock,
};
