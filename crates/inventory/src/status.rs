use serde::{Deserialize, Serialize};

/// Stock status derived from on-hand quantity and the product's reorder level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StockStatus {
    InStock,
    LowStock,
    OutOfStock,
}

impl StockStatus {
    /// Pure derivation; recomputed after every stock change.
    pub fn derive(current_stock: i64, reorder_level: i64) -> Self {
        if current_stock <= 0 {
            StockStatus::OutOfStock
        } else if current_stock <= reorder_level {
            StockStatus::LowStock
        } else {
            StockStatus::InStock
        }
    }

    /// True for statuses that warrant a replenishment alert.
    pub fn needs_attention(self) -> bool {
        matches!(self, StockStatus::LowStock | StockStatus::OutOfStock)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            StockStatus::InStock => "IN_STOCK",
            StockStatus::LowStock => "LOW_STOCK",
            StockStatus::OutOfStock => "OUT_OF_STOCK",
        }
    }
}

impl core::fmt::Display for StockStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}
