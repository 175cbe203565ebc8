use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// Permission identifier.
///
/// Permissions are opaque strings (e.g. "sales.create"). The wildcard `"*"`
/// grants everything and is only handed out by the policy table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permission(Cow<'static, str>);

impl Permission {
    pub const WILDCARD: Permission = Permission::from_static("*");

    pub const BRANCHES_READ: Permission = Permission::from_static("branches.read");
    pub const BRANCHES_WRITE: Permission = Permission::from_static("branches.write");

    pub const PRODUCTS_READ: Permission = Permission::from_static("products.read");
    pub const PRODUCTS_WRITE: Permission = Permission::from_static("products.write");

    pub const INVENTORY_READ: Permission = Permission::from_static("inventory.read");
    pub const INVENTORY_ADJUST: Permission = Permission::from_static("inventory.adjust");

    pub const SALES_READ: Permission = Permission::from_static("sales.read");
    pub const SALES_CREATE: Permission = Permission::from_static("sales.create");
    pub const SALES_RETURN: Permission = Permission::from_static("sales.return");

    pub const REGISTERS_READ: Permission = Permission::from_static("registers.read");
    pub const REGISTERS_OPERATE: Permission = Permission::from_static("registers.operate");

    pub const TRANSFERS_READ: Permission = Permission::from_static("transfers.read");
    pub const TRANSFERS_REQUEST: Permission = Permission::from_static("transfers.request");
    pub const TRANSFERS_APPROVE: Permission = Permission::from_static("transfers.approve");
    pub const TRANSFERS_SHIP: Permission = Permission::from_static("transfers.ship");
    pub const TRANSFERS_RECEIVE: Permission = Permission::from_static("transfers.receive");

    pub const RESERVATIONS_READ: Permission = Permission::from_static("reservations.read");
    pub const RESERVATIONS_CREATE: Permission = Permission::from_static("reservations.create");
    pub const RESERVATIONS_COMPLETE: Permission = Permission::from_static("reservations.complete");
    pub const RESERVATIONS_CANCEL: Permission = Permission::from_static("reservations.cancel");
    pub const RESERVATIONS_EXPIRE: Permission = Permission::from_static("reservations.expire");

    pub const USERS_READ: Permission = Permission::from_static("users.read");
    pub const USERS_MANAGE: Permission = Permission::from_static("users.manage");

    pub const fn from_static(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }

    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_wildcard(&self) -> bool {
        self.as_str() == "*"
    }

    /// The part before the first dot ("sales" for "sales.create").
    pub fn category(&self) -> &str {
        self.as_str().split('.').next().unwrap_or_default()
    }
}

impl core::fmt::Display for Permission {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}
