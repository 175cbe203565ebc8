use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use branchpos_core::{AccountId, Aggregate, AggregateId, AggregateRoot, BranchId, DomainError, UserId, aggregate_id};
use branchpos_events::Event;
use branchpos_products::ProductId;
use branchpos_registers::{PaymentMethod, SessionId};

use crate::pricing::{LineAmounts, effective_discount_bps, line_amounts, line_refund};

aggregate_id!(
    /// Sale identifier (account-scoped via `account_id` fields in events/commands).
    SaleId
);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SaleStatus {
    Completed,
    PartiallyReturned,
    Returned,
}

/// Line as submitted at the till.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleLineInput {
    pub product_id: ProductId,
    pub quantity: u64,
    pub unit_price: u64,
    /// Catalog price the line is measured against for the discount limit.
    pub list_price: u64,
    #[serde(default)]
    pub discount_bps: u32,
}

/// Priced line as recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleLine {
    pub product_id: ProductId,
    pub quantity: u64,
    pub unit_price: u64,
    pub discount_bps: u32,
    pub amounts: LineAmounts,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleTotals {
    pub gross: u64,
    pub discount: u64,
    pub total: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnLineInput {
    pub product_id: ProductId,
    pub quantity: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnLine {
    pub product_id: ProductId,
    pub quantity: u64,
    pub refund: u64,
}

/// Aggregate root: Sale.
///
/// # Invariants
/// - A sale has at least one line and no product appears twice.
/// - Per-line discounts, price overrides included, never exceed the
///   seller's discount limit.
/// - Returned quantity per product never exceeds sold quantity.
/// - Refunds for a line add up to exactly its total once fully returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sale {
    id: SaleId,
    account_id: Option<AccountId>,
    branch_id: Option<BranchId>,
    session_id: Option<SessionId>,
    payment_method: PaymentMethod,
    lines: Vec<SaleLine>,
    totals: SaleTotals,
    returned: BTreeMap<ProductId, u64>,
    refunded: BTreeMap<ProductId, u64>,
    refunded_total: u64,
    status: SaleStatus,
    version: u64,
    created: bool,
}

impl Sale {
    pub fn empty(id: SaleId) -> Self {
        Self {
            id,
            account_id: None,
            branch_id: None,
            session_id: None,
            payment_method: PaymentMethod::Cash,
            lines: Vec::new(),
            totals: SaleTotals::default(),
            returned: BTreeMap::new(),
            refunded: BTreeMap::new(),
            refunded_total: 0,
            status: SaleStatus::Completed,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> SaleId {
        self.id
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    pub fn branch_id(&self) -> Option<BranchId> {
        self.branch_id
    }

    pub fn session_id(&self) -> Option<SessionId> {
        self.session_id
    }

    pub fn payment_method(&self) -> PaymentMethod {
        self.payment_method
    }

    pub fn lines(&self) -> &[SaleLine] {
        &self.lines
    }

    pub fn totals(&self) -> SaleTotals {
        self.totals
    }

    pub fn status(&self) -> SaleStatus {
        self.status
    }

    pub fn refunded_total(&self) -> u64 {
        self.refunded_total
    }

    pub fn returned_quantity(&self, product_id: ProductId) -> u64 {
        self.returned.get(&product_id).copied().unwrap_or(0)
    }

    /// Quantity of `product_id` that can still be returned.
    pub fn returnable_quantity(&self, product_id: ProductId) -> u64 {
        self.lines
            .iter()
            .find(|l| l.product_id == product_id)
            .map(|l| l.quantity.saturating_sub(self.returned_quantity(product_id)))
            .unwrap_or(0)
    }

    fn ensure_exists(&self, account_id: AccountId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.account_id != Some(account_id) {
            return Err(DomainError::invariant("account mismatch"));
        }
        Ok(())
    }
}

impl AggregateRoot for Sale {
    type Id = SaleId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordSale {
    pub account_id: AccountId,
    pub sale_id: SaleId,
    pub branch_id: BranchId,
    pub session_id: SessionId,
    pub cashier_id: UserId,
    pub lines: Vec<SaleLineInput>,
    pub payment_method: PaymentMethod,
    /// Largest per-line discount the cashier may grant, in basis points.
    pub discount_limit_bps: u32,
    /// Set when the sale settles a reservation.
    pub reservation_id: Option<AggregateId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterReturn {
    pub account_id: AccountId,
    pub sale_id: SaleId,
    pub return_id: Uuid,
    pub lines: Vec<ReturnLineInput>,
    pub refund_method: PaymentMethod,
    pub processed_by: UserId,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SaleCommand {
    Record(RecordSale),
    RegisterReturn(RegisterReturn),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleRecorded {
    pub account_id: AccountId,
    pub sale_id: SaleId,
    pub branch_id: BranchId,
    pub session_id: SessionId,
    pub cashier_id: UserId,
    pub lines: Vec<SaleLine>,
    pub totals: SaleTotals,
    pub payment_method: PaymentMethod,
    pub reservation_id: Option<AggregateId>,
    pub occurred_at: DateTime<Utc>,
}

/// Credit record for a (partial) return.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnRegistered {
    pub account_id: AccountId,
    pub sale_id: SaleId,
    pub return_id: Uuid,
    pub branch_id: BranchId,
    pub lines: Vec<ReturnLine>,
    pub refund_total: u64,
    pub refund_method: PaymentMethod,
    pub processed_by: UserId,
    pub reason: String,
    pub status_after: SaleStatus,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SaleEvent {
    Recorded(SaleRecorded),
    ReturnRegistered(ReturnRegistered),
}

impl Event for SaleEvent {
    fn event_type(&self) -> &'static str {
        match self {
            SaleEvent::Recorded(_) => "sales.sale.recorded",
            SaleEvent::ReturnRegistered(_) => "sales.sale.return_registered",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            SaleEvent::Recorded(e) => e.occurred_at,
            SaleEvent::ReturnRegistered(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Sale {
    type Command = SaleCommand;
    type Event = SaleEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            SaleEvent::Recorded(e) => {
                self.id = e.sale_id;
                self.account_id = Some(e.account_id);
                self.branch_id = Some(e.branch_id);
                self.session_id = Some(e.session_id);
                self.payment_method = e.payment_method;
                self.lines = e.lines.clone();
                self.totals = e.totals;
                self.status = SaleStatus::Completed;
                self.created = true;
            }
            SaleEvent::ReturnRegistered(e) => {
                for line in &e.lines {
                    *self.returned.entry(line.product_id).or_insert(0) += line.quantity;
                    *self.refunded.entry(line.product_id).or_insert(0) += line.refund;
                }
                self.refunded_total += e.refund_total;
                self.status = e.status_after;
            }
        }
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            SaleCommand::Record(cmd) => self.handle_record(cmd),
            SaleCommand::RegisterReturn(cmd) => self.handle_return(cmd),
        }
    }
}

impl Sale {
    fn handle_record(&self, cmd: &RecordSale) -> Result<Vec<SaleEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("sale already recorded"));
        }
        if cmd.lines.is_empty() {
            return Err(DomainError::validation("a sale needs at least one line"));
        }

        let mut lines = Vec::with_capacity(cmd.lines.len());
        let mut totals = SaleTotals::default();

        for input in &cmd.lines {
            if input.quantity == 0 {
                return Err(DomainError::validation("line quantity must be positive"));
            }
            if lines.iter().any(|l: &SaleLine| l.product_id == input.product_id) {
                return Err(DomainError::validation(format!(
                    "product {} appears on more than one line",
                    input.product_id
                )));
            }
            let granted = effective_discount_bps(input.list_price, input.unit_price, input.discount_bps)
                .max(input.discount_bps);
            if granted > cmd.discount_limit_bps {
                return Err(DomainError::validation(format!(
                    "discount of {granted} bps exceeds the allowed {} bps",
                    cmd.discount_limit_bps
                )));
            }

            let amounts = line_amounts(input.quantity, input.unit_price, input.discount_bps)?;
            totals.gross = add(totals.gross, amounts.gross)?;
            totals.discount = add(totals.discount, amounts.discount)?;
            totals.total = add(totals.total, amounts.total)?;

            lines.push(SaleLine {
                product_id: input.product_id,
                quantity: input.quantity,
                unit_price: input.unit_price,
                discount_bps: input.discount_bps,
                amounts,
            });
        }

        Ok(vec![SaleEvent::Recorded(SaleRecorded {
            account_id: cmd.account_id,
            sale_id: cmd.sale_id,
            branch_id: cmd.branch_id,
            session_id: cmd.session_id,
            cashier_id: cmd.cashier_id,
            lines,
            totals,
            payment_method: cmd.payment_method,
            reservation_id: cmd.reservation_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_return(&self, cmd: &RegisterReturn) -> Result<Vec<SaleEvent>, DomainError> {
        self.ensure_exists(cmd.account_id)?;
        if self.status == SaleStatus::Returned {
            return Err(DomainError::invariant("sale has already been fully returned"));
        }
        if cmd.lines.is_empty() {
            return Err(DomainError::validation("a return needs at least one line"));
        }

        let mut lines: Vec<ReturnLine> = Vec::with_capacity(cmd.lines.len());
        for input in &cmd.lines {
            if input.quantity == 0 {
                return Err(DomainError::validation("return quantity must be positive"));
            }
            if lines.iter().any(|l| l.product_id == input.product_id) {
                return Err(DomainError::validation(format!(
                    "product {} appears on more than one return line",
                    input.product_id
                )));
            }
            let sold = self
                .lines
                .iter()
                .find(|l| l.product_id == input.product_id)
                .ok_or_else(|| {
                    DomainError::validation(format!("product {} was not part of this sale", input.product_id))
                })?;

            let returnable = self.returnable_quantity(input.product_id);
            if input.quantity > returnable {
                return Err(DomainError::invariant(format!(
                    "cannot return {} of product {}: only {} returnable",
                    input.quantity, input.product_id, returnable
                )));
            }

            lines.push(ReturnLine {
                product_id: input.product_id,
                quantity: input.quantity,
                refund: line_refund(
                    sold.amounts.total,
                    input.quantity,
                    sold.quantity,
                    self.returned_quantity(sold.product_id),
                    self.refunded.get(&sold.product_id).copied().unwrap_or(0),
                ),
            });
        }

        let fully_returned = self.lines.iter().all(|sold| {
            let now_returned = lines
                .iter()
                .find(|l| l.product_id == sold.product_id)
                .map(|l| l.quantity)
                .unwrap_or(0);
            self.returned_quantity(sold.product_id) + now_returned >= sold.quantity
        });

        let refund_total: u64 = lines.iter().map(|l| l.refund).sum();

        Ok(vec![SaleEvent::ReturnRegistered(ReturnRegistered {
            account_id: cmd.account_id,
            sale_id: cmd.sale_id,
            return_id: cmd.return_id,
            branch_id: self.branch_id.ok_or_else(DomainError::not_found)?,
            lines,
            refund_total,
            refund_method: cmd.refund_method,
            processed_by: cmd.processed_by,
            reason: cmd.reason.trim().to_string(),
            status_after: if fully_returned {
                SaleStatus::Returned
            } else {
                SaleStatus::PartiallyReturned
            },
            occurred_at: cmd.occurred_at,
        })])
    }
}

fn add(a: u64, b: u64) -> Result<u64, DomainError> {
    a.checked_add(b)
        .ok_or_else(|| DomainError::validation("sale total overflow"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(product_id: ProductId, quantity: u64, unit_price: u64, discount_bps: u32) -> SaleLineInput {
        SaleLineInput {
            product_id,
            quantity,
            unit_price,
            list_price: unit_price,
            discount_bps,
        }
    }

    fn record(account_id: AccountId, sale_id: SaleId, lines: Vec<SaleLineInput>, limit: u32) -> SaleCommand {
        SaleCommand::Record(RecordSale {
            account_id,
            sale_id,
            branch_id: BranchId::new(),
            session_id: SessionId::new(),
            cashier_id: UserId::new(),
            lines,
            payment_method: PaymentMethod::Cash,
            discount_limit_bps: limit,
            reservation_id: None,
            occurred_at: Utc::now(),
        })
    }

    fn return_cmd(account_id: AccountId, sale_id: SaleId, lines: Vec<ReturnLineInput>) -> SaleCommand {
        SaleCommand::RegisterReturn(RegisterReturn {
            account_id,
            sale_id,
            return_id: Uuid::now_v7(),
            lines,
            refund_method: PaymentMethod::Cash,
            processed_by: UserId::new(),
            reason: "damaged".to_string(),
            occurred_at: Utc::now(),
        })
    }

    fn recorded(lines: Vec<SaleLineInput>) -> (AccountId, Sale) {
        let account_id = AccountId::new();
        let sale_id = SaleId::generate();
        let mut sale = Sale::empty(sale_id);
        sale.execute(&record(account_id, sale_id, lines, 10_000)).unwrap();
        (account_id, sale)
    }

    #[test]
    fn totals_sum_discounted_lines() {
        let (a, b) = (ProductId::generate(), ProductId::generate());
        let (_, sale) = recorded(vec![line(a, 2, 1_000, 0), line(b, 3, 333, 1_500)]);

        assert_eq!(
            sale.totals(),
            SaleTotals {
                gross: 2_999,
                discount: 149,
                total: 2_850,
            }
        );
        assert_eq!(sale.status(), SaleStatus::Completed);
    }

    #[test]
    fn discount_above_limit_is_rejected() {
        let sale = Sale::empty(SaleId::generate());
        let cmd = record(
            AccountId::new(),
            sale.id_typed(),
            vec![line(ProductId::generate(), 1, 1_000, 1_500)],
            1_000,
        );
        let err = sale.handle(&cmd).unwrap_err();
        assert!(err.to_string().contains("exceeds the allowed"));
    }

    #[test]
    fn price_override_below_list_counts_against_the_limit() {
        let sale = Sale::empty(SaleId::generate());
        let mut cut = line(ProductId::generate(), 1, 1, 0);
        cut.list_price = 100_000;
        let err = sale
            .handle(&record(AccountId::new(), sale.id_typed(), vec![cut.clone()], 1_000))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));

        cut.unit_price = 90_000;
        assert!(sale.handle(&record(AccountId::new(), sale.id_typed(), vec![cut.clone()], 1_000)).is_ok());

        cut.discount_bps = 500;
        assert!(sale.handle(&record(AccountId::new(), sale.id_typed(), vec![cut], 1_000)).is_err());
    }

    #[test]
    fn returning_a_line_piece_by_piece_refunds_its_total() {
        let p = ProductId::generate();
        let (account_id, mut sale) = recorded(vec![line(p, 3, 333, 1_500)]);
        let sale_id = sale.id_typed();

        for _ in 0..3 {
            sale.execute(&return_cmd(account_id, sale_id, vec![ReturnLineInput { product_id: p, quantity: 1 }]))
                .unwrap();
        }
        assert_eq!(sale.status(), SaleStatus::Returned);
        assert_eq!(sale.refunded_total(), 850);
    }

    #[test]
    fn duplicate_products_are_rejected() {
        let p = ProductId::generate();
        let sale = Sale::empty(SaleId::generate());
        let cmd = record(AccountId::new(), sale.id_typed(), vec![line(p, 1, 10, 0), line(p, 2, 10, 0)], 0);
        assert!(matches!(sale.handle(&cmd), Err(DomainError::Validation(_))));
    }

    #[test]
    fn empty_sale_is_rejected() {
        let sale = Sale::empty(SaleId::generate());
        let cmd = record(AccountId::new(), sale.id_typed(), vec![], 0);
        assert!(matches!(sale.handle(&cmd), Err(DomainError::Validation(_))));
    }

    #[test]
    fn partial_then_full_return_updates_status() {
        let p = ProductId::generate();
        let (account_id, mut sale) = recorded(vec![line(p, 3, 1_000, 0)]);
        let sale_id = sale.id_typed();

        sale.execute(&return_cmd(account_id, sale_id, vec![ReturnLineInput { product_id: p, quantity: 1 }]))
            .unwrap();
        assert_eq!(sale.status(), SaleStatus::PartiallyReturned);
        assert_eq!(sale.returnable_quantity(p), 2);
        assert_eq!(sale.refunded_total(), 1_000);

        sale.execute(&return_cmd(account_id, sale_id, vec![ReturnLineInput { product_id: p, quantity: 2 }]))
            .unwrap();
        assert_eq!(sale.status(), SaleStatus::Returned);
        assert_eq!(sale.refunded_total(), 3_000);
    }

    #[test]
    fn cannot_return_more_than_sold() {
        let p = ProductId::generate();
        let (account_id, sale) = recorded(vec![line(p, 2, 500, 0)]);

        let err = sale
            .handle(&return_cmd(
                account_id,
                sale.id_typed(),
                vec![ReturnLineInput { product_id: p, quantity: 3 }],
            ))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn cannot_return_foreign_product() {
        let (account_id, sale) = recorded(vec![line(ProductId::generate(), 1, 500, 0)]);
        let err = sale
            .handle(&return_cmd(
                account_id,
                sale.id_typed(),
                vec![ReturnLineInput {
                    product_id: ProductId::generate(),
                    quantity: 1,
                }],
            ))
            .unwrap_err();
        assert!(err.to_string().contains("not part of this sale"));
    }

    #[test]
    fn refund_respects_line_discount() {
        let p = ProductId::generate();
        let (account_id, sale) = recorded(vec![line(p, 4, 1_000, 2_500)]);

        let events = sale
            .handle(&return_cmd(
                account_id,
                sale.id_typed(),
                vec![ReturnLineInput { product_id: p, quantity: 1 }],
            ))
            .unwrap();
        let SaleEvent::ReturnRegistered(e) = &events[0] else {
            panic!("expected ReturnRegistered");
        };
        assert_eq!(e.refund_total, 750);
    }
}
