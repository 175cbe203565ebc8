use serde::{Deserialize, Serialize};

use branchpos_core::{AggregateId, BranchId};

/// A single change to a product's stock at one branch.
///
/// Every variant except `Adjusted` references the aggregate that caused it
/// (sale, reservation or transfer) so the ledger history is traceable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StockMovement {
    /// Manual correction (stock count, damage, initial load).
    Adjusted {
        branch_id: BranchId,
        delta: i64,
        note: String,
    },
    Sold {
        branch_id: BranchId,
        quantity: u64,
        sale_id: AggregateId,
    },
    Returned {
        branch_id: BranchId,
        quantity: u64,
        sale_id: AggregateId,
    },
    Reserved {
        branch_id: BranchId,
        quantity: u64,
        reservation_id: AggregateId,
    },
    Released {
        branch_id: BranchId,
        quantity: u64,
        reservation_id: AggregateId,
    },
    /// A reservation was picked up: reserved units leave the branch.
    Fulfilled {
        branch_id: BranchId,
        quantity: u64,
        reservation_id: AggregateId,
    },
    /// A shipped transfer holds its units at the source until received.
    HeldForTransfer {
        branch_id: BranchId,
        quantity: u64,
        transfer_id: AggregateId,
    },
    /// Units leave the source; a transfer hold is consumed first.
    TransferredOut {
        branch_id: BranchId,
        quantity: u64,
        transfer_id: AggregateId,
    },
    TransferredIn {
        branch_id: BranchId,
        quantity: u64,
        transfer_id: AggregateId,
    },
}

impl StockMovement {
    pub fn branch_id(&self) -> BranchId {
        match self {
            StockMovement::Adjusted { branch_id, .. }
            | StockMovement::Sold { branch_id, .. }
            | StockMovement::Returned { branch_id, .. }
            | StockMovement::Reserved { branch_id, .. }
            | StockMovement::Released { branch_id, .. }
            | StockMovement::Fulfilled { branch_id, .. }
            | StockMovement::HeldForTransfer { branch_id, .. }
            | StockMovement::TransferredOut { branch_id, .. }
            | StockMovement::TransferredIn { branch_id, .. } => *branch_id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            StockMovement::Adjusted { .. } => "adjusted",
            StockMovement::Sold { .. } => "sold",
            StockMovement::Returned { .. } => "returned",
            StockMovement::Reserved { .. } => "reserved",
            StockMovement::Released { .. } => "released",
            StockMovement::Fulfilled { .. } => "fulfilled",
            StockMovement::HeldForTransfer { .. } => "held_for_transfer",
            StockMovement::TransferredOut { .. } => "transferred_out",
            StockMovement::TransferredIn { .. } => "transferred_in",
        }
    }

    /// Units moved. For adjustments this is the absolute delta.
    pub fn quantity(&self) -> u64 {
        match self {
            StockMovement::Adjusted { delta, .. } => delta.unsigned_abs(),
            StockMovement::Sold { quantity, .. }
            | StockMovement::Returned { quantity, .. }
            | StockMovement::Reserved { quantity, .. }
            | StockMovement::Released { quantity, .. }
            | StockMovement::Fulfilled { quantity, .. }
            | StockMovement::HeldForTransfer { quantity, .. }
            | StockMovement::TransferredOut { quantity, .. }
            | StockMovement::TransferredIn { quantity, .. } => *quantity,
        }
    }

    /// Whether the movement takes units out of the sellable pool.
    pub fn consumes_available(&self) -> bool {
        matches!(
            self,
            StockMovement::Sold { .. } | StockMovement::Reserved { .. } | StockMovement::HeldForTransfer { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_kind_tag() {
        let m = StockMovement::Sold {
            branch_id: BranchId::new(),
            quantity: 3,
            sale_id: AggregateId::new(),
        };
        let json = serde_json::to_value(&m).unwrap();
        assert_eq!(json["kind"], "sold");
        assert_eq!(json["quantity"], 3);
    }

    #[test]
    fn adjustment_quantity_is_absolute() {
        let m = StockMovement::Adjusted {
            branch_id: BranchId::new(),
            delta: -4,
            note: "breakage".to_string(),
        };
        assert_eq!(m.quantity(), 4);
        assert!(!m.consumes_available());
    }
}
