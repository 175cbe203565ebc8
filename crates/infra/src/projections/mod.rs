//! Read models built from domain events.
//!
//! Every projection is rebuildable from the event log, partitioned by
//! account, and idempotent under at-least-once delivery (per-stream cursors).

use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use thiserror::Error;

use branchpos_core::AccountId;
use branchpos_events::EventEnvelope;

pub mod branches;
pub mod cash_sessions;
pub mod cursor_store;
pub mod products;
pub mod registry;
pub mod reservations;
pub mod sales;
pub mod stock_levels;
pub mod transfers;
pub mod users;

pub use branches::{BranchReadModel, BranchesProjection};
pub use cash_sessions::{CashSessionReadModel, CashSessionStatus, CashSessionsProjection};
pub use cursor_store::{InMemoryCursorStore, ProjectionCursorStore};
pub use products::{ProductCatalogProjection, ProductReadModel};
pub use registry::ReadModels;
pub use reservations::{ReservationReadModel, ReservationsProjection};
pub use sales::{ReturnSummary, SaleFilter, SaleReadModel, SalesProjection};
pub use stock_levels::{BranchLevel, StockLevelReadModel, StockLevelsProjection};
pub use transfers::{TransferReadModel, TransfersProjection};
pub use users::{UserReadModel, UsersProjection};

#[derive(Debug, Error)]
pub enum ProjectionError {
    #[error("failed to deserialize event: {0}")]
    Deserialize(String),

    #[error("account isolation violation: {0}")]
    AccountIsolation(String),

    #[error("non-monotonic sequence number (last={last}, found={found})")]
    NonMonotonicSequence { last: u64, found: u64 },

    #[error("event store error while catching up: {0}")]
    Store(String),
}

pub(crate) fn decode<E: DeserializeOwned>(envelope: &EventEnvelope<JsonValue>) -> Result<E, ProjectionError> {
    serde_json::from_value(envelope.payload().clone()).map_err(|e| {
        ProjectionError::Deserialize(format!("{} {}: {e}", envelope.event_type(), envelope.event_id()))
    })
}

/// The payload's own `account_id` must match the envelope's.
pub(crate) fn ensure_account(envelope: &EventEnvelope<JsonValue>, account_id: AccountId) -> Result<(), ProjectionError> {
    if envelope.account_id() != account_id {
        return Err(ProjectionError::AccountIsolation(format!(
            "event account {account_id} does not match envelope account {}",
            envelope.account_id()
        )));
    }
    Ok(())
}
