use chrono::{DateTime, Utc};

use branchpos_core::{BranchId, UserId};
use branchpos_inventory::StockMovement;
use branchpos_products::{MoveStock, Product, ProductCommand};
use branchpos_transfers::{Transfer, TransferCommand, TransferId, TransferLine};

use super::operational_branch;
use super::sales::move_stock;
use crate::command_dispatcher::{DispatchError, UnitOfWork};

#[derive(Debug, Clone)]
pub struct TransferRequest {
    pub transfer_id: TransferId,
    pub source_branch_id: BranchId,
    pub destination_branch_id: BranchId,
    pub lines: Vec<TransferLine>,
    pub requested_by: UserId,
    pub note: String,
    pub occurred_at: DateTime<Utc>,
}

/// Request a transfer between two active branches. No stock moves yet.
pub fn request_transfer(uow: &mut UnitOfWork<'_>, request: &TransferRequest) -> Result<Transfer, DispatchError> {
    let account_id = uow.account_id();
    if request.source_branch_id != request.destination_branch_id {
        operational_branch(uow, request.source_branch_id)?;
        operational_branch(uow, request.destination_branch_id)?;
    }

    uow.execute::<Transfer>(
        request.transfer_id.aggregate_id(),
        &TransferCommand::Request {
            account_id,
            transfer_id: request.transfer_id,
            source_branch_id: request.source_branch_id,
            destination_branch_id: request.destination_branch_id,
            lines: request.lines.clone(),
            requested_by: request.requested_by,
            note: request.note.clone(),
            occurred_at: request.occurred_at,
        },
    )
}

/// Single-stream status changes (approve, reject, cancel).
pub fn transition(uow: &mut UnitOfWork<'_>, transfer_id: TransferId, command: &TransferCommand) -> Result<Transfer, DispatchError> {
    uow.execute::<Transfer>(transfer_id.aggregate_id(), command)
}

/// Ship an approved transfer and hold its units at the source, so they can
/// no longer be sold, reserved or adjusted away while in transit. Fails with
/// nothing written if the source cannot cover every line.
pub fn ship_transfer(
    uow: &mut UnitOfWork<'_>,
    transfer_id: TransferId,
    shipped_by: UserId,
    occurred_at: DateTime<Utc>,
) -> Result<Transfer, DispatchError> {
    let account_id = uow.account_id();
    let transfer = uow.execute::<Transfer>(
        transfer_id.aggregate_id(),
        &TransferCommand::Ship {
            account_id,
            shipped_by,
            occurred_at,
        },
    )?;
    let source = transfer.source_branch_id().ok_or(DispatchError::NotFound)?;

    for line in transfer.lines() {
        move_stock(
            uow,
            line.product_id,
            StockMovement::HeldForTransfer {
                branch_id: source,
                quantity: line.quantity,
                transfer_id: transfer_id.aggregate_id(),
            },
            occurred_at,
        )?;
    }

    tracing::debug!(%account_id, %transfer_id, lines = transfer.lines().len(), "transfer shipment staged");
    Ok(transfer)
}

/// Receive an in-transit transfer.
///
/// The transfer is completed and, per product, the held units leave the
/// source and are credited to the destination in the same commit.
pub fn complete_transfer(
    uow: &mut UnitOfWork<'_>,
    transfer_id: TransferId,
    received_by: UserId,
    occurred_at: DateTime<Utc>,
) -> Result<Transfer, DispatchError> {
    let account_id = uow.account_id();
    let current = uow.load::<Transfer>(transfer_id.aggregate_id())?;
    if let Some(destination) = current.destination_branch_id() {
        operational_branch(uow, destination)?;
    }

    let transfer = uow.execute::<Transfer>(
        transfer_id.aggregate_id(),
        &TransferCommand::Complete {
            account_id,
            received_by,
            occurred_at,
        },
    )?;
    let (source, destination) = match (transfer.source_branch_id(), transfer.destination_branch_id()) {
        (Some(s), Some(d)) => (s, d),
        _ => return Err(DispatchError::NotFound),
    };

    for line in transfer.lines() {
        uow.execute::<Product>(
            line.product_id.aggregate_id(),
            &ProductCommand::MoveStock(MoveStock {
                account_id,
                product_id: line.product_id,
                movements: vec![
                    StockMovement::TransferredOut {
                        branch_id: source,
                        quantity: line.quantity,
                        transfer_id: transfer_id.aggregate_id(),
                    },
                    StockMovement::TransferredIn {
                        branch_id: destination,
                        quantity: line.quantity,
                        transfer_id: transfer_id.aggregate_id(),
                    },
                ],
                occurred_at,
            }),
        )?;
    }

    tracing::debug!(%account_id, %transfer_id, lines = transfer.lines().len(), "transfer completion staged");
    Ok(transfer)
}
