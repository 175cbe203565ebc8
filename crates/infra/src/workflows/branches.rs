use chrono::{DateTime, Utc};

use branchpos_branches::{Branch, BranchCommand, CreateBranch, DeactivateBranch, UpdateBranch};
use branchpos_core::{AggregateId, BranchId};
use branchpos_registers::{CashRegister, InitializeRegister, RegisterCommand, RegisterId};

use super::register_of;
use crate::command_dispatcher::{DispatchError, UnitOfWork};

#[derive(Debug, Clone)]
pub struct NewBranch {
    pub branch_id: BranchId,
    pub register_id: RegisterId,
    pub name: String,
    pub address: String,
    pub occurred_at: DateTime<Utc>,
}

/// Create a branch together with its (single) cash register.
pub fn create_branch(uow: &mut UnitOfWork<'_>, input: &NewBranch) -> Result<Branch, DispatchError> {
    let account_id = uow.account_id();
    let branch = uow.execute::<Branch>(
        AggregateId::from(input.branch_id),
        &BranchCommand::Create(CreateBranch {
            account_id,
            branch_id: input.branch_id,
            name: input.name.clone(),
            address: input.address.clone(),
            register_id: input.register_id,
            occurred_at: input.occurred_at,
        }),
    )?;
    uow.execute::<CashRegister>(
        input.register_id.aggregate_id(),
        &RegisterCommand::Initialize(InitializeRegister {
            account_id,
            register_id: input.register_id,
            branch_id: input.branch_id,
            occurred_at: input.occurred_at,
        }),
    )?;
    Ok(branch)
}

pub fn update_branch(
    uow: &mut UnitOfWork<'_>,
    branch_id: BranchId,
    name: &str,
    address: &str,
    occurred_at: DateTime<Utc>,
) -> Result<Branch, DispatchError> {
    let account_id = uow.account_id();
    uow.execute::<Branch>(
        AggregateId::from(branch_id),
        &BranchCommand::Update(UpdateBranch {
            account_id,
            branch_id,
            name: name.to_string(),
            address: address.to_string(),
            occurred_at,
        }),
    )
}

/// Deactivation is refused while the branch register has an open session.
pub fn deactivate_branch(
    uow: &mut UnitOfWork<'_>,
    branch_id: BranchId,
    occurred_at: DateTime<Utc>,
) -> Result<Branch, DispatchError> {
    let account_id = uow.account_id();
    let current = uow.load::<Branch>(AggregateId::from(branch_id))?;
    if current.is_created() {
        let register = uow.load::<CashRegister>(register_of(&current)?.aggregate_id())?;
        if register.is_open() {
            return Err(DispatchError::InvariantViolation(format!(
                "branch '{}' still has an open cash session",
                current.name()
            )));
        }
    }

    uow.execute::<Branch>(
        AggregateId::from(branch_id),
        &BranchCommand::Deactivate(DeactivateBranch {
            account_id,
            branch_id,
            occurred_at,
        }),
    )
}
