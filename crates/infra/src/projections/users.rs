use serde::Serialize;
use serde_json::Value as JsonValue;

use branchpos_auth::{Role, UserEvent, UserStatus};
use branchpos_core::{AccountId, BranchId, UserId};
use branchpos_events::EventEnvelope;

use super::cursor_store::{InMemoryCursorStore, ProjectionCursorStore};
use super::{ProjectionError, decode, ensure_account};
use crate::read_model::TenantStore;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserReadModel {
    pub user_id: UserId,
    pub email: String,
    pub display_name: String,
    pub role: Role,
    pub branch_ids: Vec<BranchId>,
    pub status: UserStatus,
}

#[derive(Debug)]
pub struct UsersProjection<S>
where
    S: TenantStore<UserId, UserReadModel>,
{
    store: S,
    cursors: InMemoryCursorStore,
}

impl<S> UsersProjection<S>
where
    S: TenantStore<UserId, UserReadModel>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: InMemoryCursorStore::new(),
        }
    }

    pub fn get(&self, account_id: AccountId, user_id: &UserId) -> Option<UserReadModel> {
        self.store.get(account_id, user_id)
    }

    /// Active users, sorted by email.
    pub fn list(&self, account_id: AccountId) -> Vec<UserReadModel> {
        let mut users: Vec<_> = self
            .store
            .list(account_id)
            .into_iter()
            .filter(|u| u.status == UserStatus::Active)
            .collect();
        users.sort_by(|a, b| a.email.cmp(&b.email));
        users
    }

    /// Case-insensitive; removed users still hold their email.
    pub fn get_by_email(&self, account_id: AccountId, email: &str) -> Option<UserReadModel> {
        let email = email.trim();
        self.store
            .list(account_id)
            .into_iter()
            .find(|u| u.email.eq_ignore_ascii_case(email))
    }

    pub fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        if !self.cursors.should_apply(envelope)? {
            return Ok(());
        }
        let account_id = envelope.account_id();
        let event: UserEvent = decode(envelope)?;

        match event {
            UserEvent::Created(e) => {
                ensure_account(envelope, e.account_id)?;
                self.store.upsert(
                    account_id,
                    e.user_id,
                    UserReadModel {
                        user_id: e.user_id,
                        email: e.email,
                        display_name: e.display_name,
                        role: e.role,
                        branch_ids: e.branch_ids,
                        status: UserStatus::Active,
                    },
                );
            }
            UserEvent::RoleChanged(e) => {
                ensure_account(envelope, e.account_id)?;
                if let Some(mut rm) = self.store.get(account_id, &e.user_id) {
                    rm.role = e.role;
                    self.store.upsert(account_id, e.user_id, rm);
                }
            }
            UserEvent::BranchesAssigned(e) => {
                ensure_account(envelope, e.account_id)?;
                if let Some(mut rm) = self.store.get(account_id, &e.user_id) {
                    rm.branch_ids = e.branch_ids;
                    self.store.upsert(account_id, e.user_id, rm);
                }
            }
            UserEvent::Removed(e) => {
                ensure_account(envelope, e.account_id)?;
                if let Some(mut rm) = self.store.get(account_id, &e.user_id) {
                    rm.status = UserStatus::Removed;
                    self.store.upsert(account_id, e.user_id, rm);
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
