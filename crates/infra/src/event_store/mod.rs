//! Append-only event store boundary.
//!
//! Account-scoped streams with optimistic concurrency and atomic
//! multi-stream batches; in-memory and Postgres backends.

pub mod in_memory;
pub mod postgres;
pub mod r#trait;

pub use in_memory::InMemoryEventStore;
pub use postgres::PostgresEventStore;
pub use r#trait::{EventStore, EventStoreError, StoredEvent, StreamAppend, UncommittedEvent};
