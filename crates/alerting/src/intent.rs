use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockwise_inventory::ProductId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertKind {
    LowStock,
    OutOfStock,
    StockoutForecast,
    RestockSuggestion,
}

impl AlertKind {
    pub fn as_str(self) -> &'static str {
        match self {
            AlertKind::LowStock => "LOW_STOCK",
            AlertKind::OutOfStock => "OUT_OF_STOCK",
            AlertKind::StockoutForecast => "STOCKOUT_FORECAST",
            AlertKind::RestockSuggestion => "RESTOCK_SUGGESTION",
        }
    }
}

impl core::fmt::Display for AlertKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertSeverity {
    Low,
    Medium,
    High,
    Critical,
}

/// Structured alert, consumed out-of-band by a delivery layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertIntent {
    pub entity_type: String,
    pub entity_id: ProductId,
    pub kind: AlertKind,
    pub severity: AlertSeverity,
    pub title: String,
    pub message: String,
    pub suggested_action: String,
    pub raised_at: DateTime<Utc>,
}

impl AlertIntent {
    /// Alerts sharing this key are duplicates within a suppression window.
    pub fn dedup_key(&self) -> (AlertKind, ProductId) {
        (self.kind, self.entity_id)
    }
}
