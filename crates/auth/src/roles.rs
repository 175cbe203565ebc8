use serde::{Deserialize, Serialize};

use branchpos_core::DomainError;

/// Role held by a user within an account.
///
/// Roles are strictly ordered: `owner > admin > manager > cashier`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Owner,
    Admin,
    Manager,
    Cashier,
}

impl Role {
    pub const ALL: [Role; 4] = [Role::Owner, Role::Admin, Role::Manager, Role::Cashier];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Owner => "owner",
            Role::Admin => "admin",
            Role::Manager => "manager",
            Role::Cashier => "cashier",
        }
    }

    /// Higher rank means more privilege.
    pub fn rank(&self) -> u8 {
        match self {
            Role::Owner => 4,
            Role::Admin => 3,
            Role::Manager => 2,
            Role::Cashier => 1,
        }
    }

    /// Whether an actor with this role may create or modify a user holding `target`.
    ///
    /// Only strictly lower roles can be managed.
    pub fn can_manage(&self, target: Role) -> bool {
        self.rank() > target.rank()
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for Role {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "owner" => Ok(Role::Owner),
            "admin" => Ok(Role::Admin),
            "manager" => Ok(Role::Manager),
            "cashier" => Ok(Role::Cashier),
            other => Err(DomainError::validation(format!("unknown role '{other}'"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ranks_are_strictly_ordered() {
        let ranks: Vec<u8> = Role::ALL.iter().map(Role::rank).collect();
        assert!(ranks.windows(2).all(|w| w[0] > w[1]));
    }

    #[test]
    fn managers_only_manage_cashiers() {
        assert!(Role::Manager.can_manage(Role::Cashier));
        assert!(!Role::Manager.can_manage(Role::Manager));
        assert!(!Role::Manager.can_manage(Role::Admin));
    }

    #[test]
    fn admins_cannot_manage_admins_but_owners_can() {
        assert!(!Role::Admin.can_manage(Role::Admin));
        assert!(Role::Owner.can_manage(Role::Admin));
        assert!(!Role::Owner.can_manage(Role::Owner));
    }

    #[test]
    fn parses_case_insensitively() {
        assert_eq!("Manager".parse::<Role>().unwrap(), Role::Manager);
        assert!("root".parse::<Role>().is_err());
    }
}
