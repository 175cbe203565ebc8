use serde::Serialize;
use serde_json::Value as JsonValue;

use branchpos_branches::BranchEvent;
use branchpos_core::{AccountId, BranchId};
use branchpos_events::EventEnvelope;
use branchpos_registers::RegisterId;

use super::cursor_store::{InMemoryCursorStore, ProjectionCursorStore};
use super::{ProjectionError, decode, ensure_account};
use crate::read_model::TenantStore;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BranchReadModel {
    pub branch_id: BranchId,
    pub name: String,
    pub address: String,
    pub register_id: RegisterId,
    pub active: bool,
}

#[derive(Debug)]
pub struct BranchesProjection<S>
where
    S: TenantStore<BranchId, BranchReadModel>,
{
    store: S,
    cursors: InMemoryCursorStore,
}

impl<S> BranchesProjection<S>
where
    S: TenantStore<BranchId, BranchReadModel>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: InMemoryCursorStore::new(),
        }
    }

    pub fn get(&self, account_id: AccountId, branch_id: &BranchId) -> Option<BranchReadModel> {
        self.store.get(account_id, branch_id)
    }

    pub fn list(&self, account_id: AccountId) -> Vec<BranchReadModel> {
        let mut branches = self.store.list(account_id);
        branches.sort_by(|a, b| a.name.cmp(&b.name));
        branches
    }

    pub fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        if !self.cursors.should_apply(envelope)? {
            return Ok(());
        }
        let account_id = envelope.account_id();
        let event: BranchEvent = decode(envelope)?;

        match event {
            BranchEvent::Created(e) => {
                ensure_account(envelope, e.account_id)?;
                self.store.upsert(
                    account_id,
                    e.branch_id,
                    BranchReadModel {
                        branch_id: e.branch_id,
                        name: e.name,
                        address: e.address,
                        register_id: e.register_id,
                        active: true,
                    },
                );
            }
            BranchEvent::Updated(e) => {
                ensure_account(envelope, e.account_id)?;
                if let Some(mut rm) = self.store.get(account_id, &e.branch_id) {
                    rm.name = e.name;
                    rm.address = e.address;
                    self.store.upsert(account_id, e.branch_id, rm);
                }
            }
            BranchEvent::Deactivated(e) => {
                ensure_account(envelope, e.account_id)?;
                if let Some(mut rm) = self.store.get(account_id, &e.branch_id) {
                    rm.active = false;
                    self.store.upsert(account_id, e.branch_id, rm);
                }
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
}
