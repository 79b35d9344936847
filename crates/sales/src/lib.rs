//! Sales history: the priced projection of DISPATCHING movements.
//!
//! Records are derived, append-only and one-to-one with their originating
//! ledger entry. The forecast engine consumes them as dense daily series.

pub mod history;
pub mod record;

pub use history::{DailySales, dense_daily_series, total_quantity};
pub use record::{SaleRecord, SaleReferences};
