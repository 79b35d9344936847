use chrono::{DateTime, Utc};

/// A committed fact about one aggregate, e.g. a ledger movement or a reorder
/// status change.
///
/// Implementors are plain data. Stores copy `event_type` and `version` next to
/// the payload so readers can route and upcast without decoding it.
pub trait Event: Clone + core::fmt::Debug + Send + Sync + 'static {
    /// Dotted name, stable across releases: `"inventory.movement.recorded"`.
    fn event_type(&self) -> &'static str;

    /// Payload schema version, starting at 1.
    fn version(&self) -> u32;

    /// Business time of the fact, which may predate the write.
    fn occurred_at(&self) -> DateTime<Utc>;
}
