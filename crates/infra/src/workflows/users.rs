use chrono::{DateTime, Utc};

use branchpos_auth::{AssignBranches, CreateUser, Role, User, UserCommand};
use branchpos_branches::Branch;
use branchpos_core::{AggregateId, BranchId, UserId};

use crate::command_dispatcher::{DispatchError, UnitOfWork};

#[derive(Debug, Clone)]
pub struct NewUser {
    pub user_id: UserId,
    pub email: String,
    pub display_name: String,
    pub role: Role,
    pub branch_ids: Vec<BranchId>,
    pub actor_role: Role,
    pub occurred_at: DateTime<Utc>,
}

pub fn create_user(uow: &mut UnitOfWork<'_>, input: &NewUser) -> Result<User, DispatchError> {
    let account_id = uow.account_id();
    ensure_branches_exist(uow, &input.branch_ids)?;
    uow.execute::<User>(
        AggregateId::from(input.user_id),
        &UserCommand::Create(CreateUser {
            account_id,
            user_id: input.user_id,
            email: input.email.clone(),
            display_name: input.display_name.clone(),
            role: input.role,
            branch_ids: input.branch_ids.clone(),
            actor_role: input.actor_role,
            occurred_at: input.occurred_at,
        }),
    )
}

pub fn assign_branches(
    uow: &mut UnitOfWork<'_>,
    user_id: UserId,
    branch_ids: &[BranchId],
    actor_role: Role,
    occurred_at: DateTime<Utc>,
) -> Result<User, DispatchError> {
    let account_id = uow.account_id();
    ensure_branches_exist(uow, branch_ids)?;
    uow.execute::<User>(
        AggregateId::from(user_id),
        &UserCommand::AssignBranches(AssignBranches {
            account_id,
            user_id,
            branch_ids: branch_ids.to_vec(),
            actor_role,
            occurred_at,
        }),
    )
}

fn ensure_branches_exist(uow: &UnitOfWork<'_>, branch_ids: &[BranchId]) -> Result<(), DispatchError> {
    for branch_id in branch_ids {
        let branch = uow.load::<Branch>(AggregateId::from(*branch_id))?;
        if !branch.is_created() {
            return Err(DispatchError::Validation(format!("unknown branch {branch_id}")));
        }
    }
    Ok(())
}
