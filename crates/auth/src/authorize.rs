use serde::Serialize;
use thiserror::Error;

use branchpos_core::{AccountId, BranchId, UserId};

use crate::policy::{BranchScope, policy_for};
use crate::{Permission, Principal};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("account mismatch")]
    AccountMismatch,

    #[error("forbidden: missing permission '{0}'")]
    Forbidden(String),

    #[error("forbidden: branch {0} is not assigned to this user")]
    BranchNotAssigned(BranchId),
}

/// Authorize a principal within its active account.
///
/// `branch` is the branch the operation touches, if any. Roles with an
/// assigned branch scope may only act on branches in their membership.
///
/// - No IO
/// - No panics
pub fn authorize(
    principal: &Principal,
    required: &Permission,
    branch: Option<BranchId>,
) -> Result<(), AuthzError> {
    if principal.active_account_id != principal.membership.account_id {
        return Err(AuthzError::AccountMismatch);
    }

    let policy = policy_for(principal.membership.role);
    if !policy.grants(required) {
        return Err(AuthzError::Forbidden(required.as_str().to_string()));
    }

    if let (BranchScope::Assigned, Some(branch_id)) = (policy.branch_scope, branch) {
        if !principal.membership.branch_ids.contains(&branch_id) {
            return Err(AuthzError::BranchNotAssigned(branch_id));
        }
    }

    Ok(())
}

/// Detailed explanation of an authorization decision.
#[derive(Debug, Clone, Serialize)]
pub struct AuthorizationExplanation {
    pub required_permission: String,
    pub branch_id: Option<BranchId>,
    pub granted: bool,
    pub reason: String,
    pub principal: PrincipalState,
    pub denial: Option<DenialKind>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PrincipalState {
    pub user_id: UserId,
    pub active_account_id: AccountId,
    pub membership_account_id: AccountId,
    pub role: String,
    pub branch_scope: BranchScope,
    pub assigned_branches: Vec<BranchId>,
    pub effective_permissions: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DenialKind {
    AccountMismatch,
    MissingPermission,
    BranchNotAssigned,
}

/// Explain why an authorization decision was (or would be) made.
///
/// Always agrees with [`authorize`]; it only adds the principal's effective
/// policy so the admin UI can show why a request was refused.
pub fn explain_authorization(
    principal: &Principal,
    required: &Permission,
    branch: Option<BranchId>,
) -> AuthorizationExplanation {
    let policy = policy_for(principal.membership.role);

    let mut effective: Vec<String> = policy
        .permissions
        .iter()
        .map(|p| p.as_str().to_string())
        .collect();
    effective.sort();

    let state = PrincipalState {
        user_id: principal.user_id,
        active_account_id: principal.active_account_id,
        membership_account_id: principal.membership.account_id,
        role: principal.membership.role.to_string(),
        branch_scope: policy.branch_scope,
        assigned_branches: principal.membership.branch_ids.clone(),
        effective_permissions: effective,
    };

    let (granted, reason, denial) = match authorize(principal, required, branch) {
        Ok(()) => {
            let reason = if policy.permissions.iter().any(Permission::is_wildcard) {
                format!("role '{}' holds the wildcard permission", principal.membership.role)
            } else {
                format!("role '{}' grants '{}'", principal.membership.role, required)
            };
            (true, reason, None)
        }
        Err(AuthzError::AccountMismatch) => (
            false,
            format!(
                "principal is active in account {} but is a member of account {}",
                principal.active_account_id, principal.membership.account_id
            ),
            Some(DenialKind::AccountMismatch),
        ),
        Err(AuthzError::Forbidden(_)) => (
            false,
            format!("role '{}' does not grant '{}'", principal.membership.role, required),
            Some(DenialKind::MissingPermission),
        ),
        Err(AuthzError::BranchNotAssigned(b)) => (
            false,
            format!("branch {b} is outside the principal's assigned branches"),
            Some(DenialKind::BranchNotAssigned),
        ),
    };

    AuthorizationExplanation {
        required_permission: required.as_str().to_string(),
        branch_id: branch,
        granted,
        reason,
        principal: state,
        denial,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{AccountMembership, Role};

    fn principal(role: Role, branches: Vec<BranchId>) -> Principal {
        let account_id = AccountId::new();
        Principal {
            user_id: UserId::new(),
            active_account_id: account_id,
            membership: AccountMembership {
                account_id,
                role,
                branch_ids: branches,
            },
        }
    }

    #[test]
    fn owner_may_act_on_any_branch() {
        let p = principal(Role::Owner, vec![]);
        assert!(authorize(&p, &Permission::INVENTORY_ADJUST, Some(BranchId::new())).is_ok());
    }

    #[test]
    fn cashier_is_limited_to_assigned_branches() {
        let home = BranchId::new();
        let other = BranchId::new();
        let p = principal(Role::Cashier, vec![home]);

        assert!(authorize(&p, &Permission::SALES_CREATE, Some(home)).is_ok());
        assert_eq!(
            authorize(&p, &Permission::SALES_CREATE, Some(other)),
            Err(AuthzError::BranchNotAssigned(other))
        );
    }

    #[test]
    fn missing_permission_is_forbidden_before_branch_check() {
        let p = principal(Role::Cashier, vec![]);
        let err = authorize(&p, &Permission::TRANSFERS_APPROVE, Some(BranchId::new())).unwrap_err();
        assert_eq!(err, AuthzError::Forbidden("transfers.approve".to_string()));
    }

    #[test]
    fn account_mismatch_is_rejected() {
        let mut p = principal(Role::Owner, vec![]);
        p.active_account_id = AccountId::new();
        assert_eq!(
            authorize(&p, &Permission::SALES_READ, None),
            Err(AuthzError::AccountMismatch)
        );
    }

    #[test]
    fn explanation_matches_decision() {
        let p = principal(Role::Manager, vec![]);
        let branch = BranchId::new();

        let explained = explain_authorization(&p, &Permission::SALES_RETURN, Some(branch));
        assert!(!explained.granted);
        assert_eq!(explained.denial, Some(DenialKind::BranchNotAssigned));

        let explained = explain_authorization(&p, &Permission::SALES_RETURN, None);
        assert!(explained.granted);
        assert!(explained.principal.effective_permissions.contains(&"sales.return".to_string()));
    }
}
