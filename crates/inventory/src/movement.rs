use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockwise_core::{DomainError, RecordId, UserId};

use crate::product::ProductId;

/// Category of a stock change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MovementKind {
    /// Stock received from a vendor.
    Receiving,
    /// Stock dispatched or sold.
    Dispatching,
    /// Stock-take correction; quantity is the absolute target.
    Adjustment,
    /// Customer return.
    Return,
    Damage,
    TransferIn,
    TransferOut,
    /// Replenishment from a fulfilled reorder request.
    Restock,
}

/// How a movement's quantity combines with the previous stock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MovementDirection {
    Inbound,
    Outbound,
    Absolute,
}

impl MovementKind {
    pub const ALL: [MovementKind; 8] = [
        MovementKind::Receiving,
        MovementKind::Dispatching,
        MovementKind::Adjustment,
        MovementKind::Return,
        MovementKind::Damage,
        MovementKind::TransferIn,
        MovementKind::TransferOut,
        MovementKind::Restock,
    ];

    pub fn direction(self) -> MovementDirection {
        match self {
            MovementKind::Receiving
            | MovementKind::Return
            | MovementKind::TransferIn
            | MovementKind::Restock => MovementDirection::Inbound,
            MovementKind::Dispatching | MovementKind::Damage | MovementKind::TransferOut => {
                MovementDirection::Outbound
            }
            MovementKind::Adjustment => MovementDirection::Absolute,
        }
    }

    /// Stock level after applying `quantity` of this kind to `previous`.
    ///
    /// Outbound kinds never take stock below zero; the movement is rejected
    /// instead.
    pub fn resulting_stock(self, previous: i64, quantity: i64) -> Result<i64, DomainError> {
        match self.direction() {
            MovementDirection::Inbound => {
                if quantity <= 0 {
                    return Err(DomainError::validation(format!(
                        "{self} quantity must be positive"
                    )));
                }
                previous
                    .checked_add(quantity)
                    .ok_or_else(|| DomainError::validation("stock overflow"))
            }
            MovementDirection::Outbound => {
                if quantity <= 0 {
                    return Err(DomainError::validation(format!(
                        "{self} quantity must be positive"
                    )));
                }
                if quantity > previous {
                    return Err(DomainError::insufficient_stock(previous, quantity));
                }
                Ok(previous - quantity)
            }
            MovementDirection::Absolute => {
                if quantity < 0 {
                    return Err(DomainError::validation(
                        "adjustment target cannot be negative",
                    ));
                }
                Ok(quantity)
            }
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MovementKind::Receiving => "RECEIVING",
            MovementKind::Dispatching => "DISPATCHING",
            MovementKind::Adjustment => "ADJUSTMENT",
            MovementKind::Return => "RETURN",
            MovementKind::Damage => "DAMAGE",
            MovementKind::TransferIn => "TRANSFER_IN",
            MovementKind::TransferOut => "TRANSFER_OUT",
            MovementKind::Restock => "RESTOCK",
        }
    }
}

impl core::fmt::Display for MovementKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable ledger entry.
///
/// `(previous_stock, new_stock)` is contiguous with the entry before it in the
/// product's ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockMovement {
    pub id: RecordId,
    pub product_id: ProductId,
    pub kind: MovementKind,
    pub quantity: i64,
    pub previous_stock: i64,
    pub new_stock: i64,
    pub actor: UserId,
    pub reason: Option<String>,
    pub reference: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

impl StockMovement {
    /// Signed change this entry made to the on-hand quantity.
    pub fn delta(&self) -> i64 {
        self.new_stock - self.previous_stock
    }
}

/// Fold an ordered ledger starting from zero.
///
/// Fails on the first entry whose `previous_stock` does not continue the
/// running total, or whose arithmetic disagrees with its kind.
pub fn replay_stock<'a, I>(movements: I) -> Result<i64, DomainError>
where
    I: IntoIterator<Item = &'a StockMovement>,
{
    let mut stock = 0i64;
    for (idx, m) in movements.into_iter().enumerate() {
        if m.previous_stock != stock {
            return Err(DomainError::invariant(format!(
                "ledger gap at entry {idx}: expected previous_stock {stock}, found {}",
                m.previous_stock
            )));
        }
        let expected = m.kind.resulting_stock(stock, m.quantity)?;
        if expected != m.new_stock {
            return Err(DomainError::invariant(format!(
                "ledger entry {idx} ({}) records new_stock {}, arithmetic gives {expected}",
                m.kind, m.new_stock
            )));
        }
        stock = m.new_stock;
    }
    Ok(stock)
}
