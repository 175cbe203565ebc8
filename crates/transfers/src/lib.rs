//! Inter-branch stock transfers (event-sourced).
//!
//! The transfer aggregate only tracks the lifecycle; stock is moved on the
//! product streams when the transfer completes.

pub mod transfer;

pub use transfer::{
    Transfer, TransferCommand, TransferEvent, TransferId, TransferLine, TransferStatus,
};
