//! Multi-aggregate units of work.
//!
//! Each function stages its commands on a [`UnitOfWork`] and is meant to run
//! inside [`CommandDispatcher::transact`](crate::command_dispatcher::CommandDispatcher::transact),
//! which commits every touched stream atomically and re-runs the whole
//! function when another writer got there first. The functions are therefore
//! free of side effects beyond staging.

use branchpos_branches::Branch;
use branchpos_core::{AggregateId, BranchId};
use branchpos_registers::{CashRegister, RegisterId, SessionId};

use crate::command_dispatcher::{DispatchError, UnitOfWork};

pub mod branches;
pub mod products;
pub mod registers;
pub mod reservations;
pub mod sales;
pub mod transfers;
pub mod users;

/// Load a branch and require it to exist in this account and be active.
pub(crate) fn operational_branch(uow: &UnitOfWork<'_>, branch_id: BranchId) -> Result<Branch, DispatchError> {
    let branch = uow.load::<Branch>(AggregateId::from(branch_id))?;
    branch.ensure_operational(uow.account_id())?;
    Ok(branch)
}

pub(crate) fn register_of(branch: &Branch) -> Result<RegisterId, DispatchError> {
    branch.register_id().ok_or(DispatchError::NotFound)
}

/// The branch's register and its open session.
pub(crate) fn open_session_of(uow: &UnitOfWork<'_>, branch: &Branch) -> Result<(RegisterId, SessionId), DispatchError> {
    let register_id = register_of(branch)?;
    let register = uow.load::<CashRegister>(register_id.aggregate_id())?;
    let session = register.current_session().ok_or_else(|| {
        DispatchError::InvariantViolation(format!("no cash session is open at branch '{}'", branch.name()))
    })?;
    Ok((register_id, session.session_id))
}
