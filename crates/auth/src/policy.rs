//! Declarative role policy.
//!
//! One static table drives both the server-side checks in [`crate::authorize`]
//! and the read-only copy exported to clients for UI gating (`GET /policy`).

use serde::Serialize;

use crate::{Permission, Role};

/// Which branches a role may act on.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BranchScope {
    /// Every branch in the account.
    All,
    /// Only the branches listed on the principal's membership.
    Assigned,
}

/// Policy entry for a single role.
#[derive(Debug, Clone, Serialize)]
pub struct RolePolicy {
    pub role: Role,
    pub permissions: Vec<Permission>,
    pub branch_scope: BranchScope,
    /// Largest per-line discount this role may grant, in basis points.
    pub max_discount_bps: u32,
}

impl RolePolicy {
    pub fn grants(&self, permission: &Permission) -> bool {
        self.permissions
            .iter()
            .any(|p| p.is_wildcard() || p == permission)
    }
}

/// Serializable snapshot of the whole policy.
#[derive(Debug, Clone, Serialize)]
pub struct PolicyTable {
    pub roles: Vec<RolePolicy>,
}

const CASHIER_PERMISSIONS: &[Permission] = &[
    Permission::BRANCHES_READ,
    Permission::PRODUCTS_READ,
    Permission::INVENTORY_READ,
    Permission::SALES_READ,
    Permission::SALES_CREATE,
    Permission::REGISTERS_READ,
    Permission::REGISTERS_OPERATE,
    Permission::TRANSFERS_READ,
    Permission::TRANSFERS_RECEIVE,
    Permission::RESERVATIONS_READ,
    Permission::RESERVATIONS_CREATE,
    Permission::RESERVATIONS_COMPLETE,
    Permission::RESERVATIONS_CANCEL,
];

const MANAGER_EXTRA_PERMISSIONS: &[Permission] = &[
    Permission::PRODUCTS_WRITE,
    Permission::INVENTORY_ADJUST,
    Permission::SALES_RETURN,
    Permission::TRANSFERS_REQUEST,
    Permission::TRANSFERS_APPROVE,
    Permission::TRANSFERS_SHIP,
    Permission::RESERVATIONS_EXPIRE,
    Permission::USERS_READ,
    Permission::USERS_MANAGE,
];

/// Resolve the policy entry for a role.
pub fn policy_for(role: Role) -> RolePolicy {
    match role {
        Role::Owner | Role::Admin => RolePolicy {
            role,
            permissions: vec![Permission::WILDCARD],
            branch_scope: BranchScope::All,
            max_discount_bps: 10_000,
        },
        Role::Manager => RolePolicy {
            role,
            permissions: CASHIER_PERMISSIONS
                .iter()
                .chain(MANAGER_EXTRA_PERMISSIONS)
                .cloned()
                .collect(),
            branch_scope: BranchScope::Assigned,
            max_discount_bps: 3_000,
        },
        Role::Cashier => RolePolicy {
            role,
            permissions: CASHIER_PERMISSIONS.to_vec(),
            branch_scope: BranchScope::Assigned,
            max_discount_bps: 1_000,
        },
    }
}

pub fn policy_table() -> PolicyTable {
    PolicyTable {
        roles: Role::ALL.into_iter().map(policy_for).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cashier_cannot_adjust_inventory_or_approve_transfers() {
        let cashier = policy_for(Role::Cashier);
        assert!(cashier.grants(&Permission::SALES_CREATE));
        assert!(!cashier.grants(&Permission::INVENTORY_ADJUST));
        assert!(!cashier.grants(&Permission::TRANSFERS_APPROVE));
    }

    #[test]
    fn manager_includes_every_cashier_permission() {
        let manager = policy_for(Role::Manager);
        for p in CASHIER_PERMISSIONS {
            assert!(manager.grants(p), "manager lacks {p}");
        }
    }

    #[test]
    fn discount_limits_shrink_with_rank() {
        let limits: Vec<u32> = Role::ALL
            .into_iter()
            .map(|r| policy_for(r).max_discount_bps)
            .collect();
        assert!(limits.windows(2).all(|w| w[0] >= w[1]));
    }

    #[test]
    fn table_serializes_scope_in_snake_case() {
        let json = serde_json::to_value(policy_table()).unwrap();
        assert_eq!(json["roles"][0]["role"], "owner");
        assert_eq!(json["roles"][3]["branch_scope"], "assigned");
    }
}
