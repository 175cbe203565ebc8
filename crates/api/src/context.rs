use branchpos_auth::{Principal, Role, policy_for};
use branchpos_core::{AccountId, BranchId, UserId};

/// Account (tenant) context for a request.
///
/// This is immutable and must be present for all domain routes.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct AccountContext {
    account_id: AccountId,
}

impl AccountContext {
    pub fn new(account_id: AccountId) -> Self {
        Self { account_id }
    }

    pub fn account_id(&self) -> AccountId {
        self.account_id
    }
}

/// Principal context for a request (authenticated user, role and branches).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrincipalContext {
    principal: Principal,
}

impl PrincipalContext {
    pub fn new(principal: Principal) -> Self {
        Self { principal }
    }

    pub fn principal(&self) -> &Principal {
        &self.principal
    }

    pub fn user_id(&self) -> UserId {
        self.principal.user_id
    }

    pub fn role(&self) -> Role {
        self.principal.role()
    }

    pub fn branch_ids(&self) -> &[BranchId] {
        &self.principal.membership.branch_ids
    }

    /// Largest per-line discount the caller may grant.
    pub fn discount_limit_bps(&self) -> u32 {
        policy_for(self.role()).max_discount_bps
    }
}
