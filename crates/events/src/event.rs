use chrono::{DateTime, Utc};

/// A domain event: an immutable, versioned fact.
///
/// Every aggregate's event enum implements this so the infrastructure can
/// persist it without knowing the concrete type.
pub trait Event: Clone + core::fmt::Debug + Send + Sync + 'static {
    /// Stable event name (e.g. "products.product.stock_moved").
    fn event_type(&self) -> &'static str;

    /// Schema version for this event type.
    fn version(&self) -> u32;

    /// When the event occurred (business time).
    fn occurred_at(&self) -> DateTime<Utc>;
}
