use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use branchpos_core::{BranchId, DomainError, DomainResult};

use crate::StockMovement;

/// Per-branch stock for a single product.
///
/// # Invariants
/// - `on_hand(b) >= 0` (unsigned).
/// - `reserved(b) <= on_hand(b)` for every branch.
/// - Branches with nothing reserved have no entry in `reserved`.
///
/// `reserved` covers both customer reservations and units held by shipped
/// transfers.
///
/// Movements are validated with [`BranchStock::check`] and then applied with
/// [`BranchStock::apply`]. `apply` on an unchecked movement saturates instead
/// of panicking, but callers (the `Product` aggregate) always check first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchStock {
    on_hand: BTreeMap<BranchId, u64>,
    reserved: BTreeMap<BranchId, u64>,
}

impl BranchStock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_hand(&self, branch_id: BranchId) -> u64 {
        self.on_hand.get(&branch_id).copied().unwrap_or(0)
    }

    pub fn reserved(&self, branch_id: BranchId) -> u64 {
        self.reserved.get(&branch_id).copied().unwrap_or(0)
    }

    /// Units that can be sold, reserved or shipped right now.
    pub fn available(&self, branch_id: BranchId) -> u64 {
        self.on_hand(branch_id).saturating_sub(self.reserved(branch_id))
    }

    pub fn total_on_hand(&self) -> u64 {
        self.on_hand.values().sum()
    }

    pub fn total_reserved(&self) -> u64 {
        self.reserved.values().sum()
    }

    pub fn branches(&self) -> impl Iterator<Item = BranchId> + '_ {
        self.on_hand.keys().copied()
    }

    pub fn on_hand_map(&self) -> &BTreeMap<BranchId, u64> {
        &self.on_hand
    }

    pub fn reserved_map(&self) -> &BTreeMap<BranchId, u64> {
        &self.reserved
    }

    /// Validate a movement against the current ledger without mutating it.
    pub fn check(&self, movement: &StockMovement) -> DomainResult<()> {
        let branch_id = movement.branch_id();

        match movement {
            StockMovement::Adjusted { delta, .. } => {
                if *delta == 0 {
                    return Err(DomainError::validation("adjustment delta cannot be zero"));
                }
                if *delta > 0 {
                    self.on_hand(branch_id)
                        .checked_add(delta.unsigned_abs())
                        .ok_or_else(|| DomainError::validation("stock quantity overflow"))?;
                } else {
                    let removed = delta.unsigned_abs();
                    if removed > self.available(branch_id) {
                        return Err(DomainError::insufficient_stock(format!(
                            "branch {branch_id}: cannot remove {removed}, only {} unreserved on hand",
                            self.available(branch_id)
                        )));
                    }
                }
            }
            _ => {
                let quantity = movement.quantity();
                if quantity == 0 {
                    return Err(DomainError::validation("quantity must be positive"));
                }
                match movement {
                    StockMovement::Sold { .. }
                    | StockMovement::Reserved { .. }
                    | StockMovement::HeldForTransfer { .. } => {
                        self.require_available(branch_id, quantity)?;
                    }
                    StockMovement::Fulfilled { .. } | StockMovement::TransferredOut { .. } => {
                        let from_reserved = quantity.min(self.reserved(branch_id));
                        self.require_available(branch_id, quantity - from_reserved)?;
                    }
                    StockMovement::Returned { .. } | StockMovement::TransferredIn { .. } => {
                        self.on_hand(branch_id)
                            .checked_add(quantity)
                            .ok_or_else(|| DomainError::validation("stock quantity overflow"))?;
                    }
                    // Releases are floored at zero and never fail.
                    StockMovement::Released { .. } | StockMovement::Adjusted { .. } => {}
                }
            }
        }

        Ok(())
    }

    /// Apply a movement previously accepted by [`BranchStock::check`].
    pub fn apply(&mut self, movement: &StockMovement) {
        let branch_id = movement.branch_id();
        let quantity = movement.quantity();

        match movement {
            StockMovement::Adjusted { delta, .. } => {
                if *delta >= 0 {
                    self.add_on_hand(branch_id, quantity);
                } else {
                    self.remove_on_hand(branch_id, quantity);
                }
            }
            StockMovement::Sold { .. } => {
                self.remove_on_hand(branch_id, quantity);
            }
            StockMovement::Returned { .. } | StockMovement::TransferredIn { .. } => {
                self.add_on_hand(branch_id, quantity);
            }
            StockMovement::Reserved { .. } | StockMovement::HeldForTransfer { .. } => {
                *self.reserved.entry(branch_id).or_insert(0) += quantity;
            }
            StockMovement::Released { .. } => {
                self.release(branch_id, quantity);
            }
            StockMovement::Fulfilled { .. } | StockMovement::TransferredOut { .. } => {
                self.release(branch_id, quantity);
                self.remove_on_hand(branch_id, quantity);
            }
        }
    }

    fn require_available(&self, branch_id: BranchId, quantity: u64) -> DomainResult<()> {
        let available = self.available(branch_id);
        if quantity > available {
            return Err(DomainError::insufficient_stock(format!(
                "branch {branch_id}: requested {quantity}, available {available}"
            )));
        }
        Ok(())
    }

    fn add_on_hand(&mut self, branch_id: BranchId, quantity: u64) {
        let entry = self.on_hand.entry(branch_id).or_insert(0);
        *entry = entry.saturating_add(quantity);
    }

    fn remove_on_hand(&mut self, branch_id: BranchId, quantity: u64) {
        let entry = self.on_hand.entry(branch_id).or_insert(0);
        *entry = entry.saturating_sub(quantity);
    }

    fn release(&mut self, branch_id: BranchId, quantity: u64) {
        if let Some(reserved) = self.reserved.get_mut(&branch_id) {
            *reserved = reserved.saturating_sub(quantity);
            if *reserved == 0 {
                self.reserved.remove(&branch_id);
            }
        }
    }
}
