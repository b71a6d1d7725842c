use chrono::{DateTime, Utc};

/// A domain-agnostic event.
///
/// Events are **immutable** facts, designed to be **append-only**.
pub trait Event: Clone + core::fmt::Debug + Send + Sync + 'static {
    /// Stable event name/type identifier (e.g. "ledger.item.acquired").
    fn event_type(&self) -> &'static str;

    /// When the event occurred (business time).
    fn occurred_at(&self) -> DateTime<Utc>;
}
