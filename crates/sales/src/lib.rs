//! Sales domain module (event-sourced).
//!
//! Immutable sale records with their pricing math, discount limits and
//! return (credit) bookkeeping. Stock and cash effects are coordinated by the
//! infrastructure workflows, not here.

pub mod pricing;
pub mod sale;

pub use pricing::{BPS_DENOMINATOR, LineAmounts, effective_discount_bps, line_amounts, line_refund, prorated_refund};
pub use sale::{
    RecordSale, RegisterReturn, ReturnLine, ReturnLineInput, ReturnRegistered, Sale, SaleCommand,
    SaleEvent, SaleId, SaleLine, SaleLineInput, SaleRecorded, SaleStatus, SaleTotals,
};
