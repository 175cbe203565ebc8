use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;

use branchpos_core::{AccountId, BranchId, UserId};
use branchpos_events::EventEnvelope;
use branchpos_transfers::{TransferEvent, TransferId, TransferLine, TransferStatus};

use super::cursor_store::{InMemoryCursorStore, ProjectionCursorStore};
use super::{ProjectionError, decode, ensure_account};
use crate::read_model::TenantStore;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransferReadModel {
    pub transfer_id: TransferId,
    pub source_branch_id: BranchId,
    pub destination_branch_id: BranchId,
    pub lines: Vec<TransferLine>,
    pub status: TransferStatus,
    pub note: String,
    pub requested_by: UserId,
    pub requested_at: DateTime<Utc>,
    pub approved_by: Option<UserId>,
    pub shipped_by: Option<UserId>,
    pub received_by: Option<UserId>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Rejection or cancellation reason.
    pub reason: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl TransferReadModel {
    pub fn involves(&self, branch_id: BranchId) -> bool {
        self.source_branch_id == branch_id || self.destination_branch_id == branch_id
    }
}

#[derive(Debug)]
pub struct TransfersProjection<S>
where
    S: TenantStore<TransferId, TransferReadModel>,
{
    store: S,
    cursors: InMemoryCursorStore,
}

impl<S> TransfersProjection<S>
where
    S: TenantStore<TransferId, TransferReadModel>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: InMemoryCursorStore::new(),
        }
    }

    pub fn get(&self, account_id: AccountId, transfer_id: &TransferId) -> Option<TransferReadModel> {
        self.store.get(account_id, transfer_id)
    }

    /// Newest first; `branch_id` keeps transfers leaving or entering that branch.
    pub fn list(
        &self,
        account_id: AccountId,
        branch_id: Option<BranchId>,
        status: Option<TransferStatus>,
    ) -> Vec<TransferReadModel> {
        let mut transfers: Vec<_> = self
            .store
            .list(account_id)
            .into_iter()
            .filter(|t| branch_id.is_none_or(|b| t.involves(b)))
            .filter(|t| status.is_none_or(|s| t.status == s))
            .collect();
        transfers.sort_by(|a, b| b.requested_at.cmp(&a.requested_at));
        transfers
    }

    pub fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        if !self.cursors.should_apply(envelope)? {
            return Ok(());
        }
        let account_id = envelope.account_id();
        let event: TransferEvent = decode(envelope)?;
        let status = event.status_after();

        match event {
            TransferEvent::Requested {
                account_id: event_account,
                transfer_id,
                source_branch_id,
                destination_branch_id,
                lines,
                requested_by,
                note,
                occurred_at,
            } => {
                ensure_account(envelope, event_account)?;
                self.store.upsert(
                    account_id,
                    transfer_id,
                    TransferReadModel {
                        transfer_id,
                        source_branch_id,
                        destination_branch_id,
                        lines,
                        status,
                        note,
                        requested_by,
                        requested_at: occurred_at,
                        approved_by: None,
                        shipped_by: None,
                        received_by: None,
                        completed_at: None,
                        reason: None,
                        updated_at: occurred_at,
                    },
                );
            }
            TransferEvent::Approved {
                account_id: event_account,
                transfer_id,
                approved_by,
                occurred_at,
            } => {
                ensure_account(envelope, event_account)?;
                self.update(account_id, transfer_id, status, occurred_at, |rm| {
                    rm.approved_by = Some(approved_by);
                });
            }
            TransferEvent::Rejected {
                account_id: event_account,
                transfer_id,
                reason,
                occurred_at,
                ..
            }
            | TransferEvent::Cancelled {
                account_id: event_account,
                transfer_id,
                reason,
                occurred_at,
                ..
            } => {
                ensure_account(envelope, event_account)?;
                self.update(account_id, transfer_id, status, occurred_at, |rm| {
                    rm.reason = Some(reason);
                });
            }
            TransferEvent::Shipped {
                account_id: event_account,
                transfer_id,
                shipped_by,
                occurred_at,
            } => {
                ensure_account(envelope, event_account)?;
                self.update(account_id, transfer_id, status, occurred_at, |rm| {
                    rm.shipped_by = Some(shipped_by);
                });
            }
            TransferEvent::Completed {
                account_id: event_account,
                transfer_id,
                received_by,
                occurred_at,
                ..
            } => {
                ensure_account(envelope, event_account)?;
                self.update(account_id, transfer_id, status, occurred_at, |rm| {
                    rm.received_by = Some(received_by);
                    rm.completed_at = Some(occurred_at);
                });
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

    fn update(
        &self,
        account_id: AccountId,
        transfer_id: TransferId,
        status: TransferStatus,
        at: DateTime<Utc>,
        f: impl FnOnce(&mut TransferReadModel),
    ) {
        if let Some(mut rm) = self.store.get(account_id, &transfer_id) {
            rm.status = status;
            rm.updated_at = at;
            f(&mut rm);
            self.store.upsert(account_id, transfer_id, rm);
        }
    }
}
