use serde::{Deserialize, Serialize};

use branchpos_core::{AccountId, BranchId, UserId};

use crate::{JwtClaims, Role};

/// A user's membership in an account.
///
/// This is an authorization boundary object: it states *which account* the
/// user acts within, their role there, and the branches they are assigned to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountMembership {
    pub account_id: AccountId,
    pub role: Role,
    pub branch_ids: Vec<BranchId>,
}

/// A fully resolved principal for authorization decisions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub user_id: UserId,
    pub active_account_id: AccountId,
    pub membership: AccountMembership,
}

impl Principal {
    pub fn from_claims(claims: &JwtClaims) -> Self {
        Self {
            user_id: claims.sub,
            active_account_id: claims.account_id,
            membership: AccountMembership {
                account_id: claims.account_id,
                role: claims.role,
                branch_ids: claims.branch_ids.clone(),
            },
        }
    }

    pub fn role(&self) -> Role {
        self.membership.role
    }
}
