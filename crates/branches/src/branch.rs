use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use branchpos_core::{AccountId, Aggregate, AggregateRoot, BranchId, DomainError};
use branchpos_events::Event;
use branchpos_registers::RegisterId;

/// Aggregate root: Branch.
///
/// A branch is created together with its cash register; the register id is
/// fixed for the branch's lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Branch {
    id: BranchId,
    account_id: Option<AccountId>,
    name: String,
    address: String,
    register_id: Option<RegisterId>,
    active: bool,
    version: u64,
    created: bool,
}

impl Branch {
    pub fn empty(id: BranchId) -> Self {
        Self {
            id,
            account_id: None,
            name: String::new(),
            address: String::new(),
            register_id: None,
            active: false,
            version: 0,
            created: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn register_id(&self) -> Option<RegisterId> {
        self.register_id
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    pub fn is_active(&self) -> bool {
        self.created && self.active
    }

    /// Guard used by other workflows (sessions, transfers, reservations).
    pub fn ensure_operational(&self, account_id: AccountId) -> Result<(), DomainError> {
        self.ensure_exists(account_id)?;
        if !self.active {
            return Err(DomainError::invariant(format!("branch '{}' is inactive", self.name)));
        }
        Ok(())
    }

    fn ensure_exists(&self, account_id: AccountId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.account_id != Some(account_id) {
            return Err(DomainError::invariant("account mismatch"));
        }
        Ok(())
    }
}

impl AggregateRoot for Branch {
    type Id = BranchId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateBranch {
    pub account_id: AccountId,
    pub branch_id: BranchId,
    pub name: String,
    pub address: String,
    pub register_id: RegisterId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateBranch {
    pub account_id: AccountId,
    pub branch_id: BranchId,
    pub name: String,
    pub address: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeactivateBranch {
    pub account_id: AccountId,
    pub branch_id: BranchId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BranchCommand {
    Create(CreateBranch),
    Update(UpdateBranch),
    Deactivate(DeactivateBranch),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchCreated {
    pub account_id: AccountId,
    pub branch_id: BranchId,
    pub name: String,
    pub address: String,
    pub register_id: RegisterId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchUpdated {
    pub account_id: AccountId,
    pub branch_id: BranchId,
    pub name: String,
    pub address: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchDeactivated {
    pub account_id: AccountId,
    pub branch_id: BranchId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BranchEvent {
    Created(BranchCreated),
    Updated(BranchUpdated),
    Deactivated(BranchDeactivated),
}

impl Event for BranchEvent {
    fn event_type(&self) -> &'static str {
        match self {
            BranchEvent::Created(_) => "branches.branch.created",
            BranchEvent::Updated(_) => "branches.branch.updated",
            BranchEvent::Deactivated(_) => "branches.branch.deactivated",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            BranchEvent::Created(e) => e.occurred_at,
            BranchEvent::Updated(e) => e.occurred_at,
            BranchEvent::Deactivated(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Branch {
    type Command = BranchCommand;
    type Event = BranchEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            BranchEvent::Created(e) => {
                self.id = e.branch_id;
                self.account_id = Some(e.account_id);
                self.name = e.name.clone();
                self.address = e.address.clone();
                self.register_id = Some(e.register_id);
                self.active = true;
                self.created = true;
            }
            BranchEvent::Updated(e) => {
                self.name = e.name.clone();
                self.address = e.address.clone();
            }
            BranchEvent::Deactivated(_) => self.active = false,
        }
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            BranchCommand::Create(cmd) => {
                if self.created {
                    return Err(DomainError::conflict("branch already exists"));
                }
                let name = validated_name(&cmd.name)?;
                Ok(vec![BranchEvent::Created(BranchCreated {
                    account_id: cmd.account_id,
                    branch_id: cmd.branch_id,
                    name,
                    address: cmd.address.trim().to_string(),
                    register_id: cmd.register_id,
                    occurred_at: cmd.occurred_at,
                })])
            }
            BranchCommand::Update(cmd) => {
                self.ensure_exists(cmd.account_id)?;
                let name = validated_name(&cmd.name)?;
                let address = cmd.address.trim().to_string();
                if name == self.name && address == self.address {
                    return Ok(vec![]);
                }
                Ok(vec![BranchEvent::Updated(BranchUpdated {
                    account_id: cmd.account_id,
                    branch_id: cmd.branch_id,
                    name,
                    address,
                    occurred_at: cmd.occurred_at,
                })])
            }
            BranchCommand::Deactivate(cmd) => {
                self.ensure_exists(cmd.account_id)?;
                if !self.active {
                    return Err(DomainError::invariant("branch is already inactive"));
                }
                Ok(vec![BranchEvent::Deactivated(BranchDeactivated {
                    account_id: cmd.account_id,
                    branch_id: cmd.branch_id,
                    occurred_at: cmd.occurred_at,
                })])
            }
        }
    }
}

fn validated_name(name: &str) -> Result<String, DomainError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(DomainError::validation("branch name cannot be empty"));
    }
    Ok(name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn created() -> (AccountId, Branch) {
        let account_id = AccountId::new();
        let branch_id = BranchId::new();
        let mut branch = Branch::empty(branch_id);
        branch
            .execute(&BranchCommand::Create(CreateBranch {
                account_id,
                branch_id,
                name: " Downtown ".to_string(),
                address: "1 Main St".to_string(),
                register_id: RegisterId::generate(),
                occurred_at: Utc::now(),
            }))
            .unwrap();
        (account_id, branch)
    }

    #[test]
    fn create_starts_active_with_register() {
        let (account_id, branch) = created();
        assert_eq!(branch.name(), "Downtown");
        assert!(branch.register_id().is_some());
        assert!(branch.ensure_operational(account_id).is_ok());
    }

    #[test]
    fn deactivated_branch_is_not_operational() {
        let (account_id, mut branch) = created();
        let branch_id = *branch.id();
        branch
            .execute(&BranchCommand::Deactivate(DeactivateBranch {
                account_id,
                branch_id,
                occurred_at: Utc::now(),
            }))
            .unwrap();

        let err = branch.ensure_operational(account_id).unwrap_err();
        assert!(err.to_string().contains("inactive"));
    }

    #[test]
    fn unknown_branch_is_not_found() {
        let branch = Branch::empty(BranchId::new());
        assert_eq!(branch.ensure_operational(AccountId::new()), Err(DomainError::NotFound));
    }

    #[test]
    fn update_without_changes_emits_nothing() {
        let (account_id, branch) = created();
        let events = branch
            .handle(&BranchCommand::Update(UpdateBranch {
                account_id,
                branch_id: *branch.id(),
                name: "Downtown".to_string(),
                address: "1 Main St".to_string(),
                occurred_at: Utc::now(),
            }))
            .unwrap();
        assert!(events.is_empty());
    }
}
