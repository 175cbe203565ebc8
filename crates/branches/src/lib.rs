//! Branches (stores and warehouses) of an account.

pub mod branch;

pub use branch::{
    Branch, BranchCommand, BranchCreated, BranchDeactivated, BranchEvent, BranchUpdated,
    CreateBranch, DeactivateBranch, UpdateBranch,
};
