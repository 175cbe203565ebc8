//! Periodic background jobs.

pub mod reservation_expiry;

pub use reservation_expiry::{ReservationExpirySweeper, SweepReport};
