//! Inventory domain module.
//!
//! The per-branch stock ledger and the movements that mutate it, implemented
//! as deterministic domain logic (no IO, no HTTP, no storage). The ledger is
//! embedded in the `Product` aggregate so that every stock change for a
//! product is serialized through one event stream.

pub mod ledger;
pub mod movement;

pub use ledger::BranchStock;
pub use movement::StockMovement;
