use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;

use branchpos_core::{AccountId, BranchId, UserId};
use branchpos_events::EventEnvelope;
use branchpos_reservations::{ReservationEvent, ReservationId, ReservationItem, ReservationStatus};

use super::cursor_store::{InMemoryCursorStore, ProjectionCursorStore};
use super::{ProjectionError, decode, ensure_account};
use crate::read_model::TenantStore;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReservationReadModel {
    pub reservation_id: ReservationId,
    pub branch_id: BranchId,
    pub items: Vec<ReservationItem>,
    pub customer_name: String,
    pub expiry_date: DateTime<Utc>,
    pub status: ReservationStatus,
    pub created_by: UserId,
    pub created_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

#[derive(Debug)]
pub struct ReservationsProjection<S>
where
    S: TenantStore<ReservationId, ReservationReadModel>,
{
    store: S,
    cursors: InMemoryCursorStore,
}

impl<S> ReservationsProjection<S>
where
    S: TenantStore<ReservationId, ReservationReadModel>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: InMemoryCursorStore::new(),
        }
    }

    pub fn get(&self, account_id: AccountId, reservation_id: &ReservationId) -> Option<ReservationReadModel> {
        self.store.get(account_id, reservation_id)
    }

    pub fn list(
        &self,
        account_id: AccountId,
        branch_id: Option<BranchId>,
        status: Option<ReservationStatus>,
    ) -> Vec<ReservationReadModel> {
        let mut reservations: Vec<_> = self
            .store
            .list(account_id)
            .into_iter()
            .filter(|r| branch_id.is_none_or(|b| r.branch_id == b))
            .filter(|r| status.is_none_or(|s| r.status == s))
            .collect();
        reservations.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        reservations
    }

    /// Pending reservations whose expiry date lies before `now`, oldest expiry first.
    pub fn pending_expired(&self, account_id: AccountId, now: DateTime<Utc>) -> Vec<ReservationReadModel> {
        let mut due: Vec<_> = self
            .store
            .list(account_id)
            .into_iter()
            .filter(|r| r.status == ReservationStatus::Pending && r.expiry_date < now)
            .collect();
        due.sort_by(|a, b| a.expiry_date.cmp(&b.expiry_date));
        due
    }

    pub fn accounts(&self) -> Vec<AccountId> {
        self.store.accounts()
    }

    pub fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        if !self.cursors.should_apply(envelope)? {
            return Ok(());
        }
        let account_id = envelope.account_id();
        let event: ReservationEvent = decode(envelope)?;

        match event {
            ReservationEvent::Created {
                account_id: event_account,
                reservation_id,
                branch_id,
                items,
                customer_name,
                expiry_date,
                created_by,
                occurred_at,
            } => {
                ensure_account(envelope, event_account)?;
                self.store.upsert(
                    account_id,
                    reservation_id,
                    ReservationReadModel {
                        reservation_id,
                        branch_id,
                        items,
                        customer_name,
                        expiry_date,
                        status: ReservationStatus::Pending,
                        created_by,
                        created_at: occurred_at,
                        closed_at: None,
                    },
                );
            }
            ReservationEvent::Completed {
                account_id: event_account,
                reservation_id,
                occurred_at,
                ..
            } => {
                ensure_account(envelope, event_account)?;
                self.close(account_id, reservation_id, ReservationStatus::Completed, occurred_at);
            }
            ReservationEvent::Cancelled {
                account_id: event_account,
                reservation_id,
                occurred_at,
                ..
            } => {
                ensure_account(envelope, event_account)?;
                self.close(account_id, reservation_id, ReservationStatus::Cancelled, occurred_at);
            }
            ReservationEvent::Expired {
                account_id: event_account,
                reservation_id,
                occurred_at,
                ..
            } => {
                ensure_account(envelope, event_account)?;
                self.close(account_id, reservation_id, ReservationStatus::Expired, occurred_at);
            }
        }

        self.cursors.advance(envelope);
        Ok(())
    }

    pub fn clear(&self, accounts: &[AccountId]) {
        self.cursors.clear();
        for account_id in accounts {
            self.store.clear_account(*account_id);
        }
    }

    fn close(&self, account_id: AccountId, reservation_id: ReservationId, status: ReservationStatus, at: DateTime<Utc>) {
        if let Some(mut rm) = self.store.get(account_id, &reservation_id) {
            rm.status = status;
            rm.closed_at = Some(at);
            self.store.upsert(account_id, reservation_id, rm);
        }
    }
}
