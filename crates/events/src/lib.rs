//! Domain events, envelopes and the pub/sub bus used to feed read models.

pub mod account;
pub mod bus;
pub mod envelope;
pub mod event;
pub mod in_memory_bus;

pub use account::AccountScoped;
pub use bus::{EventBus, Subscription};
pub use envelope::{EventEnvelope, StreamPosition};
pub use event::Event;
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
