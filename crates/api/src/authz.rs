//! API-side authorization guard for commands.
//!
//! This enforces authorization at the command boundary (before dispatch),
//! while keeping domain aggregates and infra auth-agnostic.

use branchpos_auth::{AuthzError, Permission, authorize};
use branchpos_core::BranchId;

use crate::context::{AccountContext, PrincipalContext};

/// Check that the caller holds `required`, and, for branch-scoped roles,
/// that `branch` is one of theirs.
///
/// This is intended to be called **before** dispatching a command.
pub fn authorize_command(
    account: &AccountContext,
    principal: &PrincipalContext,
    required: &Permission,
    branch: Option<BranchId>,
) -> Result<(), AuthzError> {
    let p = principal.principal();
    if p.active_account_id != account.account_id() {
        return Err(AuthzError::AccountMismatch);
    }
    authorize(p, required, branch)
}
