//! User aggregate (event-sourced).
//!
//! Users belong to exactly one account and hold a single role. Privilege
//! escalation is blocked in the aggregate itself: every command carries the
//! acting user's role and may only touch users ranked strictly below it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use branchpos_core::{AccountId, Aggregate, AggregateRoot, BranchId, DomainError, UserId};
use branchpos_events::Event;

use crate::Role;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum UserStatus {
    #[default]
    Active,
    /// Removed users keep their history but can no longer be modified.
    Removed,
}

/// # Invariants
/// - `account_id` is immutable after creation.
/// - The actor must outrank both the user's current and new role.
/// - Users cannot remove themselves.
#[derive(Debug, Clone)]
pub struct User {
    pub id: UserId,
    pub account_id: Option<AccountId>,
    pub email: String,
    pub display_name: String,
    pub role: Role,
    pub branch_ids: Vec<BranchId>,
    pub status: UserStatus,
    pub version: u64,
    pub created: bool,
}

impl User {
    pub fn empty(id: UserId) -> Self {
        Self {
            id,
            account_id: None,
            email: String::new(),
            display_name: String::new(),
            role: Role::Cashier,
            branch_ids: Vec::new(),
            status: UserStatus::Active,
            version: 0,
            created: false,
        }
    }

    fn ensure_live(&self, account_id: AccountId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::NotFound);
        }
        if self.account_id != Some(account_id) {
            return Err(DomainError::invariant("account mismatch"));
        }
        if self.status == UserStatus::Removed {
            return Err(DomainError::invariant("user has been removed"));
        }
        Ok(())
    }

    fn ensure_actor_outranks(&self, actor_role: Role, target: Role) -> Result<(), DomainError> {
        if !actor_role.can_manage(target) {
            return Err(DomainError::Unauthorized);
        }
        Ok(())
    }
}

impl AggregateRoot for User {
    type Id = UserId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateUser {
    pub account_id: AccountId,
    pub user_id: UserId,
    pub email: String,
    pub display_name: String,
    pub role: Role,
    pub branch_ids: Vec<BranchId>,
    pub actor_role: Role,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeRole {
    pub account_id: AccountId,
    pub user_id: UserId,
    pub role: Role,
    pub actor_role: Role,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignBranches {
    pub account_id: AccountId,
    pub user_id: UserId,
    pub branch_ids: Vec<BranchId>,
    pub actor_role: Role,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoveUser {
    pub account_id: AccountId,
    pub user_id: UserId,
    pub actor_id: UserId,
    pub actor_role: Role,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum UserCommand {
    Create(CreateUser),
    ChangeRole(ChangeRole),
    AssignBranches(AssignBranches),
    Remove(RemoveUser),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserCreated {
    pub account_id: AccountId,
    pub user_id: UserId,
    pub email: String,
    pub display_name: String,
    pub role: Role,
    pub branch_ids: Vec<BranchId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleChanged {
    pub account_id: AccountId,
    pub user_id: UserId,
    pub previous: Role,
    pub role: Role,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BranchesAssigned {
    pub account_id: AccountId,
    pub user_id: UserId,
    pub branch_ids: Vec<BranchId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRemoved {
    pub account_id: AccountId,
    pub user_id: UserId,
    pub removed_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum UserEvent {
    Created(UserCreated),
    RoleChanged(RoleChanged),
    BranchesAssigned(BranchesAssigned),
    Removed(UserRemoved),
}

impl Event for UserEvent {
    fn event_type(&self) -> &'static str {
        match self {
            UserEvent::Created(_) => "auth.user.created",
            UserEvent::RoleChanged(_) => "auth.user.role_changed",
            UserEvent::BranchesAssigned(_) => "auth.user.branches_assigned",
            UserEvent::Removed(_) => "auth.user.removed",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            UserEvent::Created(e) => e.occurred_at,
            UserEvent::RoleChanged(e) => e.occurred_at,
            UserEvent::BranchesAssigned(e) => e.occurred_at,
            UserEvent::Removed(e) => e.occurred_at,
        }
    }
}

impl Aggregate for User {
    type Command = UserCommand;
    type Event = UserEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            UserEvent::Created(e) => {
                self.id = e.user_id;
                self.account_id = Some(e.account_id);
                self.email = e.email.clone();
                self.display_name = e.display_name.clone();
                self.role = e.role;
                self.branch_ids = e.branch_ids.clone();
                self.status = UserStatus::Active;
                self.created = true;
            }
            UserEvent::RoleChanged(e) => self.role = e.role,
            UserEvent::BranchesAssigned(e) => self.branch_ids = e.branch_ids.clone(),
            UserEvent::Removed(_) => self.status = UserStatus::Removed,
        }
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            UserCommand::Create(cmd) => self.handle_create(cmd),
            UserCommand::ChangeRole(cmd) => self.handle_change_role(cmd),
            UserCommand::AssignBranches(cmd) => self.handle_assign_branches(cmd),
            UserCommand::Remove(cmd) => self.handle_remove(cmd),
        }
    }
}

impl User {
    fn handle_create(&self, cmd: &CreateUser) -> Result<Vec<UserEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("user already exists"));
        }

        let email = cmd.email.trim().to_lowercase();
        if email.is_empty() || !email.contains('@') {
            return Err(DomainError::validation("invalid email format"));
        }
        if cmd.display_name.trim().is_empty() {
            return Err(DomainError::validation("display name cannot be empty"));
        }

        self.ensure_actor_outranks(cmd.actor_role, cmd.role)?;

        Ok(vec![UserEvent::Created(UserCreated {
            account_id: cmd.account_id,
            user_id: cmd.user_id,
            email,
            display_name: cmd.display_name.trim().to_string(),
            role: cmd.role,
            branch_ids: dedup(&cmd.branch_ids),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_change_role(&self, cmd: &ChangeRole) -> Result<Vec<UserEvent>, DomainError> {
        self.ensure_live(cmd.account_id)?;
        self.ensure_actor_outranks(cmd.actor_role, self.role)?;
        self.ensure_actor_outranks(cmd.actor_role, cmd.role)?;

        if self.role == cmd.role {
            return Ok(vec![]);
        }

        Ok(vec![UserEvent::RoleChanged(RoleChanged {
            account_id: cmd.account_id,
            user_id: cmd.user_id,
            previous: self.role,
            role: cmd.role,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_assign_branches(&self, cmd: &AssignBranches) -> Result<Vec<UserEvent>, DomainError> {
        self.ensure_live(cmd.account_id)?;
        self.ensure_actor_outranks(cmd.actor_role, self.role)?;

        Ok(vec![UserEvent::BranchesAssigned(BranchesAssigned {
            account_id: cmd.account_id,
            user_id: cmd.user_id,
            branch_ids: dedup(&cmd.branch_ids),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_remove(&self, cmd: &RemoveUser) -> Result<Vec<UserEvent>, DomainError> {
        self.ensure_live(cmd.account_id)?;
        if cmd.actor_id == self.id {
            return Err(DomainError::invariant("users cannot remove themselves"));
        }
        self.ensure_actor_outranks(cmd.actor_role, self.role)?;

        Ok(vec![UserEvent::Removed(UserRemoved {
            account_id: cmd.account_id,
            user_id: cmd.user_id,
            removed_by: cmd.actor_id,
            occurred_at: cmd.occurred_at,
        })])
    }
}

fn dedup(ids: &[BranchId]) -> Vec<BranchId> {
    let mut out: Vec<BranchId> = Vec::with_capacity(ids.len());
    for id in ids {
        if !out.contains(id) {
            out.push(*id);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn created(account_id: AccountId, role: Role) -> User {
        let user_id = UserId::new();
        let mut user = User::empty(user_id);
        user.execute(&UserCommand::Create(CreateUser {
            account_id,
            user_id,
            email: "Alice@Example.com ".to_string(),
            display_name: "Alice".to_string(),
            role,
            branch_ids: vec![],
            actor_role: Role::Owner,
            occurred_at: Utc::now(),
        }))
        .unwrap();
        user
    }

    #[test]
    fn create_normalizes_email() {
        let user = created(AccountId::new(), Role::Cashier);
        assert_eq!(user.email, "alice@example.com");
        assert_eq!(user.version, 1);
    }

    #[test]
    fn create_rejects_invalid_email() {
        let user = User::empty(UserId::new());
        let result = user.handle(&UserCommand::Create(CreateUser {
            account_id: AccountId::new(),
            user_id: user.id,
            email: "invalid-email".to_string(),
            display_name: "Bob".to_string(),
            role: Role::Cashier,
            branch_ids: vec![],
            actor_role: Role::Owner,
            occurred_at: Utc::now(),
        }));
        assert!(matches!(result, Err(DomainError::Validation(_))));
    }

    #[test]
    fn manager_cannot_create_manager() {
        let user = User::empty(UserId::new());
        let result = user.handle(&UserCommand::Create(CreateUser {
            account_id: AccountId::new(),
            user_id: user.id,
            email: "carol@example.com".to_string(),
            display_name: "Carol".to_string(),
            role: Role::Manager,
            branch_ids: vec![],
            actor_role: Role::Manager,
            occurred_at: Utc::now(),
        }));
        assert_eq!(result.unwrap_err(), DomainError::Unauthorized);
    }

    #[test]
    fn manager_cannot_promote_cashier_to_admin() {
        let account_id = AccountId::new();
        let user = created(account_id, Role::Cashier);

        let result = user.handle(&UserCommand::ChangeRole(ChangeRole {
            account_id,
            user_id: user.id,
            role: Role::Admin,
            actor_role: Role::Manager,
            occurred_at: Utc::now(),
        }));
        assert_eq!(result.unwrap_err(), DomainError::Unauthorized);
    }

    #[test]
    fn change_role_records_previous_role() {
        let account_id = AccountId::new();
        let mut user = created(account_id, Role::Cashier);

        let events = user
            .execute(&UserCommand::ChangeRole(ChangeRole {
                account_id,
                user_id: user.id,
                role: Role::Manager,
                actor_role: Role::Admin,
                occurred_at: Utc::now(),
            }))
            .unwrap();

        let UserEvent::RoleChanged(e) = &events[0] else {
            panic!("expected RoleChanged");
        };
        assert_eq!(e.previous, Role::Cashier);
        assert_eq!(user.role, Role::Manager);
    }

    #[test]
    fn assign_branches_deduplicates() {
        let account_id = AccountId::new();
        let mut user = created(account_id, Role::Cashier);
        let b = BranchId::new();

        user.execute(&UserCommand::AssignBranches(AssignBranches {
            account_id,
            user_id: user.id,
            branch_ids: vec![b, b],
            actor_role: Role::Manager,
            occurred_at: Utc::now(),
        }))
        .unwrap();

        assert_eq!(user.branch_ids, vec![b]);
    }

    #[test]
    fn removed_user_rejects_further_commands() {
        let account_id = AccountId::new();
        let mut user = created(account_id, Role::Cashier);

        user.execute(&UserCommand::Remove(RemoveUser {
            account_id,
            user_id: user.id,
            actor_id: UserId::new(),
            actor_role: Role::Owner,
            occurred_at: Utc::now(),
        }))
        .unwrap();
        assert_eq!(user.status, UserStatus::Removed);

        let err = user
            .handle(&UserCommand::AssignBranches(AssignBranches {
                account_id,
                user_id: user.id,
                branch_ids: vec![],
                actor_role: Role::Owner,
                occurred_at: Utc::now(),
            }))
            .unwrap_err();
        assert!(err.to_string().contains("removed"));
    }

    #[test]
    fn account_isolation_enforced() {
        let user = created(AccountId::new(), Role::Cashier);

        let err = user
            .handle(&UserCommand::ChangeRole(ChangeRole {
                account_id: AccountId::new(),
                user_id: user.id,
                role: Role::Manager,
                actor_role: Role::Owner,
                occurred_at: Utc::now(),
            }))
            .unwrap_err();
        assert!(err.to_string().contains("account"));
    }
}
