use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use stockwise_core::RecordId;
use stockwise_inventory::{MovementKind, ProductId, StockMovement};

/// Order/customer references carried onto a sale.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleReferences {
    pub order_reference: Option<String>,
    pub customer_reference: Option<String>,
    pub notes: Option<String>,
}

/// One sale, derived from exactly one DISPATCHING movement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleRecord {
    pub id: RecordId,
    pub product_id: ProductId,
    /// Ledger entry this sale was derived from.
    pub movement_id: RecordId,
    pub sale_date: NaiveDate,
    pub sold_at: DateTime<Utc>,
    pub quantity: i64,
    /// Price in smallest currency unit (e.g., cents).
    pub unit_price: u64,
    /// `quantity * unit_price`, saturating.
    pub total_amount: u64,
    pub references: SaleReferences,
}

impl SaleRecord {
    /// Project a ledger entry into a sale.
    ///
    /// Returns `None` for every kind other than DISPATCHING.
    pub fn from_movement(
        movement: &StockMovement,
        unit_price: u64,
        references: SaleReferences,
    ) -> Option<Self> {
        if movement.kind != MovementKind::Dispatching {
            return None;
        }

        let quantity = u64::try_from(movement.quantity).unwrap_or(0);

        Some(Self {
            id: RecordId::new(),
            product_id: movement.product_id,
            movement_id: movement.id,
            sale_date: movement.recorded_at.date_naive(),
            sold_at: movement.recorded_at,
            quantity: movement.quantity,
            unit_price,
            total_amount: quantity.saturating_mul(unit_price),
            references,
        })
    }
}
