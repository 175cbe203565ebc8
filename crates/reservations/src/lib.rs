//! Customer reservations: stock held at a branch until collected, cancelled
//! or expired.

pub mod reservation;

pub use reservation::{
    Reservation, ReservationCommand, ReservationEvent, ReservationId, ReservationItem,
    ReservationStatus,
};
