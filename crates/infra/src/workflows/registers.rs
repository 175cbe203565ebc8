use chrono::{DateTime, Utc};

use branchpos_branches::Branch;
use branchpos_core::{AggregateId, BranchId, UserId};
use branchpos_registers::{CashRegister, CloseSession, OpenSession, RegisterCommand, SessionId};

use super::{open_session_of, operational_branch, register_of};
use crate::command_dispatcher::{DispatchError, UnitOfWork};

/// Open a cash session at an active branch.
///
/// Two tills racing to open the same register both stage against the same
/// stream version; the loser is re-run and then rejected with `Conflict`.
pub fn open_session(
    uow: &mut UnitOfWork<'_>,
    branch_id: BranchId,
    session_id: SessionId,
    opened_by: UserId,
    opening_balance: u64,
    occurred_at: DateTime<Utc>,
) -> Result<CashRegister, DispatchError> {
    let account_id = uow.account_id();
    let branch = operational_branch(uow, branch_id)?;
    let register_id = register_of(&branch)?;

    uow.execute::<CashRegister>(
        register_id.aggregate_id(),
        &RegisterCommand::OpenSession(OpenSession {
            account_id,
            session_id,
            opened_by,
            opening_balance,
            occurred_at,
        }),
    )
}

/// Close and reconcile the open session. Works on inactive branches too.
///
/// Without a `session_id` whichever session is open gets closed; with one,
/// a stale id (session already closed and reopened) is rejected.
pub fn close_session(
    uow: &mut UnitOfWork<'_>,
    branch_id: BranchId,
    session_id: Option<SessionId>,
    closed_by: UserId,
    counted_cash: u64,
    occurred_at: DateTime<Utc>,
) -> Result<CashRegister, DispatchError> {
    let account_id = uow.account_id();
    let branch = uow.load::<Branch>(AggregateId::from(branch_id))?;
    if !branch.is_created() {
        return Err(DispatchError::NotFound);
    }
    let (register_id, session_id) = match session_id {
        Some(id) => (register_of(&branch)?, id),
        None => open_session_of(uow, &branch)?,
    };

    uow.execute::<CashRegister>(
        register_id.aggregate_id(),
        &RegisterCommand::CloseSession(CloseSession {
            account_id,
            session_id,
            closed_by,
            counted_cash,
            occurred_at,
        }),
    )
}
