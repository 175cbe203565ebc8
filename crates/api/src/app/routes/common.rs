use std::str::FromStr;

use axum::http::StatusCode;
use axum::response::Response;

use branchpos_auth::{BranchScope, Permission, policy_for};
use branchpos_core::BranchId;

use crate::app::errors;
use crate::authz;
use crate::context::{AccountContext, PrincipalContext};

/// Handlers return the error response on the `Err` side so `?` can be used
/// between parsing, authorization and dispatch.
pub type ApiResult = Result<Response, Response>;

pub fn parse_id<T: FromStr>(raw: &str, what: &'static str) -> Result<T, Response> {
    raw.parse()
        .map_err(|_| errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", format!("invalid {what} id")))
}

/// Permission (and branch scope) check before dispatch.
pub fn guard(
    account: &AccountContext,
    principal: &PrincipalContext,
    required: &Permission,
    branch: Option<BranchId>,
) -> Result<(), Response> {
    authz::authorize_command(account, principal, required, branch).map_err(errors::authz_error_to_response)
}

/// Read-side listing guard: branch-scoped roles only see their branches.
pub fn visible_branch(principal: &PrincipalContext, branch_id: BranchId) -> bool {
    match policy_for(principal.role()).branch_scope {
        BranchScope::All => true,
        BranchScope::Assigned => principal.branch_ids().contains(&branch_id),
    }
}
