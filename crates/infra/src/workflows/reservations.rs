use chrono::{DateTime, Utc};

use branchpos_core::{BranchId, UserId};
use branchpos_inventory::StockMovement;
use branchpos_registers::{self as registers, CashRegister, PaymentMethod, RegisterCommand};
use branchpos_reservations::{Reservation, ReservationCommand, ReservationId, ReservationItem};
use branchpos_sales::{RecordSale, Sale, SaleCommand, SaleId, SaleLineInput};

use super::sales::move_stock;
use super::{open_session_of, operational_branch};
use crate::command_dispatcher::{DispatchError, UnitOfWork};

#[derive(Debug, Clone)]
pub struct ReservationRequest {
    pub reservation_id: ReservationId,
    pub branch_id: BranchId,
    pub items: Vec<ReservationItem>,
    pub customer_name: String,
    pub expiry_date: DateTime<Utc>,
    pub created_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Create a reservation and hold its units at the branch.
pub fn create_reservation(uow: &mut UnitOfWork<'_>, request: &ReservationRequest) -> Result<Reservation, DispatchError> {
    let account_id = uow.account_id();
    operational_branch(uow, request.branch_id)?;

    let reservation = uow.execute::<Reservation>(
        request.reservation_id.aggregate_id(),
        &ReservationCommand::Create {
            account_id,
            reservation_id: request.reservation_id,
            branch_id: request.branch_id,
            items: request.items.clone(),
            customer_name: request.customer_name.clone(),
            expiry_date: request.expiry_date,
            created_by: request.created_by,
            occurred_at: request.occurred_at,
        },
    )?;

    for item in reservation.items() {
        move_stock(
            uow,
            item.product_id,
            StockMovement::Reserved {
                branch_id: request.branch_id,
                quantity: item.quantity,
                reservation_id: request.reservation_id.aggregate_id(),
            },
            request.occurred_at,
        )?;
    }
    Ok(reservation)
}

#[derive(Debug, Clone)]
pub struct CompleteReservation {
    pub reservation_id: ReservationId,
    pub sale_id: SaleId,
    pub completed_by: UserId,
    pub payment_method: PaymentMethod,
    pub occurred_at: DateTime<Utc>,
}

/// Hand the reserved goods over: fulfil the held units, record a sale at
/// catalog prices and put the takings in the branch's open session.
pub fn complete_reservation(
    uow: &mut UnitOfWork<'_>,
    request: &CompleteReservation,
) -> Result<(Reservation, Sale), DispatchError> {
    let account_id = uow.account_id();
    let reservation = uow.execute::<Reservation>(
        request.reservation_id.aggregate_id(),
        &ReservationCommand::Complete {
            account_id,
            completed_by: request.completed_by,
            occurred_at: request.occurred_at,
        },
    )?;
    let branch_id = reservation.branch_id().ok_or(DispatchError::NotFound)?;
    let branch = operational_branch(uow, branch_id)?;
    let (register_id, session_id) = open_session_of(uow, &branch)?;

    let mut lines = Vec::with_capacity(reservation.items().len());
    for item in reservation.items() {
        let product = move_stock(
            uow,
            item.product_id,
            StockMovement::Fulfilled {
                branch_id,
                quantity: item.quantity,
                reservation_id: request.reservation_id.aggregate_id(),
            },
            request.occurred_at,
        )?;
        lines.push(SaleLineInput {
            product_id: item.product_id,
            quantity: item.quantity,
            unit_price: product.pricing().price,
            list_price: product.pricing().price,
            discount_bps: 0,
        });
    }

    let sale = uow.execute::<Sale>(
        request.sale_id.aggregate_id(),
        &SaleCommand::Record(RecordSale {
            account_id,
            sale_id: request.sale_id,
            branch_id,
            session_id,
            cashier_id: request.completed_by,
            lines,
            payment_method: request.payment_method,
            discount_limit_bps: 0,
            reservation_id: Some(request.reservation_id.aggregate_id()),
            occurred_at: request.occurred_at,
        }),
    )?;

    uow.execute::<CashRegister>(
        register_id.aggregate_id(),
        &RegisterCommand::RecordSale(registers::RecordSale {
            account_id,
            sale_id: request.sale_id.aggregate_id(),
            total: sale.totals().total,
            payment_method: request.payment_method,
            occurred_at: request.occurred_at,
        }),
    )?;

    Ok((reservation, sale))
}

pub fn cancel_reservation(
    uow: &mut UnitOfWork<'_>,
    reservation_id: ReservationId,
    cancelled_by: UserId,
    reason: &str,
    occurred_at: DateTime<Utc>,
) -> Result<Reservation, DispatchError> {
    let account_id = uow.account_id();
    let reservation = uow.execute::<Reservation>(
        reservation_id.aggregate_id(),
        &ReservationCommand::Cancel {
            account_id,
            cancelled_by,
            reason: reason.to_string(),
            occurred_at,
        },
    )?;
    release(uow, &reservation, occurred_at)?;
    Ok(reservation)
}

/// Expire one overdue pending reservation (`now` past its expiry date).
pub fn expire_reservation(
    uow: &mut UnitOfWork<'_>,
    reservation_id: ReservationId,
    now: DateTime<Utc>,
) -> Result<Reservation, DispatchError> {
    let account_id = uow.account_id();
    let reservation = uow.execute::<Reservation>(
        reservation_id.aggregate_id(),
        &ReservationCommand::Expire {
            account_id,
            occurred_at: now,
        },
    )?;
    release(uow, &reservation, now)?;
    Ok(reservation)
}

fn release(uow: &mut UnitOfWork<'_>, reservation: &Reservation, occurred_at: DateTime<Utc>) -> Result<(), DispatchError> {
    let branch_id = reservation.branch_id().ok_or(DispatchError::NotFound)?;
    for item in reservation.items() {
        move_stock(
            uow,
            item.product_id,
            StockMovement::Released {
                branch_id,
                quantity: item.quantity,
                reservation_id: reservation.id_typed().aggregate_id(),
            },
            occurred_at,
        )?;
    }
    Ok(())
}
