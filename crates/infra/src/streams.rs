//! Binding between domain aggregates and their event streams.

use branchpos_auth::User;
use branchpos_branches::Branch;
use branchpos_core::{Aggregate, AggregateId, BranchId, DomainError, UserId};
use branchpos_products::{Product, ProductId};
use branchpos_registers::{CashRegister, RegisterId};
use branchpos_reservations::{Reservation, ReservationId};
use branchpos_sales::{Sale, SaleId};
use branchpos_transfers::{Transfer, TransferId};

pub const PRODUCT: &str = "products.product";
pub const BRANCH: &str = "branches.branch";
pub const REGISTER: &str = "registers.register";
pub const SALE: &str = "sales.sale";
pub const TRANSFER: &str = "transfers.transfer";
pub const RESERVATION: &str = "reservations.reservation";
pub const USER: &str = "auth.user";

/// An aggregate that can be stored in (and rebuilt from) an event stream.
pub trait EventSourced: Aggregate<Error = DomainError> {
    /// Stable stream type recorded with every event (`context.aggregate`).
    const AGGREGATE_TYPE: &'static str;

    /// Fresh, uncreated instance for rehydration.
    fn blank(id: AggregateId) -> Self;
}

impl EventSourced for Product {
    const AGGREGATE_TYPE: &'static str = PRODUCT;

    fn blank(id: AggregateId) -> Self {
        Product::empty(ProductId::new(id))
    }
}

impl EventSourced for Branch {
    const AGGREGATE_TYPE: &'static str = BRANCH;

    fn blank(id: AggregateId) -> Self {
        Branch::empty(BranchId::from_uuid(*id.as_uuid()))
    }
}

impl EventSourced for CashRegister {
    const AGGREGATE_TYPE: &'static str = REGISTER;

    fn blank(id: AggregateId) -> Self {
        CashRegister::empty(RegisterId::new(id))
    }
}

impl EventSourced for Sale {
    const AGGREGATE_TYPE: &'static str = SALE;

    fn blank(id: AggregateId) -> Self {
        Sale::empty(SaleId::new(id))
    }
}

impl EventSourced for Transfer {
    const AGGREGATE_TYPE: &'static str = TRANSFER;

    fn blank(id: AggregateId) -> Self {
        Transfer::empty(TransferId::new(id))
    }
}

impl EventSourced for Reservation {
    const AGGREGATE_TYPE: &'static str = RESERVATION;

    fn blank(id: AggregateId) -> Self {
        Reservation::empty(ReservationId::new(id))
    }
}

impl EventSourced for User {
    const AGGREGATE_TYPE: &'static str = USER;

    fn blank(id: AggregateId) -> Self {
        User::empty(UserId::from_uuid(*id.as_uuid()))
    }
}
