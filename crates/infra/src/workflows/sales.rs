use chrono::{DateTime, Utc};
use uuid::Uuid;

use branchpos_core::{AggregateId, BranchId, UserId};
use branchpos_inventory::StockMovement;
use branchpos_products::{MoveStock, Product, ProductCommand, ProductId};
use branchpos_registers::{self as registers, CashRegister, PaymentMethod, RegisterCommand};
use branchpos_sales::{RecordSale, RegisterReturn, ReturnLineInput, Sale, SaleCommand, SaleId, SaleLineInput};

use super::{open_session_of, operational_branch};
use crate::command_dispatcher::{DispatchError, UnitOfWork};

#[derive(Debug, Clone)]
pub struct SaleRequestLine {
    pub product_id: ProductId,
    pub quantity: u64,
    /// Catalog price when absent. A lower price is a discount and counts
    /// against `discount_limit_bps`.
    pub unit_price: Option<u64>,
    pub discount_bps: u32,
}

#[derive(Debug, Clone)]
pub struct SaleRequest {
    pub sale_id: SaleId,
    pub branch_id: BranchId,
    pub cashier_id: UserId,
    pub lines: Vec<SaleRequestLine>,
    pub payment_method: PaymentMethod,
    pub discount_limit_bps: u32,
    pub occurred_at: DateTime<Utc>,
}

/// Record a sale: the sale itself, one `Sold` movement per line and the
/// takings in the branch's open cash session, all or nothing.
pub fn record_sale(uow: &mut UnitOfWork<'_>, request: &SaleRequest) -> Result<Sale, DispatchError> {
    let account_id = uow.account_id();
    let branch = operational_branch(uow, request.branch_id)?;
    let (register_id, session_id) = open_session_of(uow, &branch)?;

    let mut lines = Vec::with_capacity(request.lines.len());
    for line in &request.lines {
        let list_price = catalog_price(uow, line.product_id)?;
        lines.push(SaleLineInput {
            product_id: line.product_id,
            quantity: line.quantity,
            unit_price: line.unit_price.unwrap_or(list_price),
            list_price,
            discount_bps: line.discount_bps,
        });
    }

    let sale = uow.execute::<Sale>(
        request.sale_id.aggregate_id(),
        &SaleCommand::Record(RecordSale {
            account_id,
            sale_id: request.sale_id,
            branch_id: request.branch_id,
            session_id,
            cashier_id: request.cashier_id,
            lines,
            payment_method: request.payment_method,
            discount_limit_bps: request.discount_limit_bps,
            reservation_id: None,
            occurred_at: request.occurred_at,
        }),
    )?;

    for line in sale.lines() {
        move_stock(
            uow,
            line.product_id,
            StockMovement::Sold {
                branch_id: request.branch_id,
                quantity: line.quantity,
                sale_id: request.sale_id.aggregate_id(),
            },
            request.occurred_at,
        )?;
    }

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

    tracing::debug!(%account_id, sale_id = %request.sale_id, total = sale.totals().total, "sale staged");
    Ok(sale)
}

#[derive(Debug, Clone)]
pub struct ReturnRequest {
    pub sale_id: SaleId,
    pub return_id: Uuid,
    pub lines: Vec<ReturnLineInput>,
    pub refund_method: PaymentMethod,
    pub processed_by: UserId,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

/// Register a (partial) return: credit record on the sale, returned units
/// back on the shelf of the selling branch, refund out of the open session.
pub fn register_return(uow: &mut UnitOfWork<'_>, request: &ReturnRequest) -> Result<Sale, DispatchError> {
    let account_id = uow.account_id();
    let before = uow.load::<Sale>(request.sale_id.aggregate_id())?;
    let branch_id = before.branch_id().ok_or(DispatchError::NotFound)?;
    let branch = uow.load::<branchpos_branches::Branch>(AggregateId::from(branch_id))?;
    let (register_id, _) = open_session_of(uow, &branch)?;

    let after = uow.execute::<Sale>(
        request.sale_id.aggregate_id(),
        &SaleCommand::RegisterReturn(RegisterReturn {
            account_id,
            sale_id: request.sale_id,
            return_id: request.return_id,
            lines: request.lines.clone(),
            refund_method: request.refund_method,
            processed_by: request.processed_by,
            reason: request.reason.clone(),
            occurred_at: request.occurred_at,
        }),
    )?;

    for line in &request.lines {
        move_stock(
            uow,
            line.product_id,
            StockMovement::Returned {
                branch_id,
                quantity: line.quantity,
                sale_id: request.sale_id.aggregate_id(),
            },
            request.occurred_at,
        )?;
    }

    let refund = after.refunded_total().saturating_sub(before.refunded_total());
    uow.execute::<CashRegister>(
        register_id.aggregate_id(),
        &RegisterCommand::RecordRefund(registers::RecordRefund {
            account_id,
            sale_id: request.sale_id.aggregate_id(),
            amount: refund,
            refund_method: request.refund_method,
            occurred_at: request.occurred_at,
        }),
    )?;

    Ok(after)
}

pub(crate) fn catalog_price(uow: &UnitOfWork<'_>, product_id: ProductId) -> Result<u64, DispatchError> {
    let product = uow.load::<Product>(product_id.aggregate_id())?;
    if !product.is_created() {
        return Err(DispatchError::Validation(format!("unknown product {product_id}")));
    }
    Ok(product.pricing().price)
}

pub(crate) fn move_stock(
    uow: &mut UnitOfWork<'_>,
    product_id: ProductId,
    movement: StockMovement,
    occurred_at: DateTime<Utc>,
) -> Result<Product, DispatchError> {
    let account_id = uow.account_id();
    uow.execute::<Product>(
        product_id.aggregate_id(),
        &ProductCommand::MoveStock(MoveStock {
            account_id,
            product_id,
            movements: vec![movement],
            occurred_at,
        }),
    )
}
