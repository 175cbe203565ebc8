//! `branchpos-auth`: authentication/authorization boundary.
//!
//! Decoupled from HTTP and storage: token verification, the role policy
//! table, pure permission checks, and the `User` aggregate.

pub mod authorize;
pub mod claims;
pub mod jwt;
pub mod permissions;
pub mod policy;
pub mod principal;
pub mod roles;
pub mod user;

pub use authorize::{AuthorizationExplanation, AuthzError, DenialKind, authorize, explain_authorization};
pub use claims::{JwtClaims, TokenValidationError, validate_claims};
pub use jwt::{Hs256JwtValidator, JwtValidator};
pub use permissions::Permission;
pub use policy::{BranchScope, PolicyTable, RolePolicy, policy_for, policy_table};
pub use principal::{AccountMembership, Principal};
pub use roles::Role;
pub use user::{
    AssignBranches, BranchesAssigned, ChangeRole, CreateUser, RemoveUser, RoleChanged, User,
    UserCommand, UserCreated, UserEvent, UserRemoved, UserStatus,
};
