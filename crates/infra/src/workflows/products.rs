use chrono::{DateTime, Utc};

use branchpos_branches::Branch;
use branchpos_core::{AggregateId, BranchId};
use branchpos_inventory::StockMovement;
use branchpos_products::{MoveStock, Product, ProductCommand, ProductId};

use crate::command_dispatcher::{DispatchError, UnitOfWork};

/// Manual stock correction at one branch (counts, damage, initial load).
///
/// The branch must exist; inactive branches can still be counted down.
pub fn adjust_stock(
    uow: &mut UnitOfWork<'_>,
    product_id: ProductId,
    branch_id: BranchId,
    delta: i64,
    note: &str,
    occurred_at: DateTime<Utc>,
) -> Result<Product, DispatchError> {
    let account_id = uow.account_id();
    let branch = uow.load::<Branch>(AggregateId::from(branch_id))?;
    if !branch.is_created() {
        return Err(DispatchError::NotFound);
    }
    if !branch.is_active() && delta > 0 {
        return Err(DispatchError::InvariantViolation(format!(
            "branch '{}' is inactive",
            branch.name()
        )));
    }

    uow.execute::<Product>(
        product_id.aggregate_id(),
        &ProductCommand::MoveStock(MoveStock {
            account_id,
            product_id,
            movements: vec![StockMovement::Adjusted {
                branch_id,
                delta,
                note: note.trim().to_string(),
            }],
            occurred_at,
        }),
    )
}
