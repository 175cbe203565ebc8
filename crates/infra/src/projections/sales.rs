use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;
use uuid::Uuid;

use branchpos_core::{AccountId, AggregateId, BranchId, UserId};
use branchpos_events::EventEnvelope;
use branchpos_registers::{PaymentMethod, SessionId};
use branchpos_sales::{ReturnLine, SaleEvent, SaleId, SaleLine, SaleStatus, SaleTotals};

use super::cursor_store::{InMemoryCursorStore, ProjectionCursorStore};
use super::{ProjectionError, decode, ensure_account};
use crate::read_model::TenantStore;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReturnSummary {
    pub return_id: Uuid,
    pub lines: Vec<ReturnLine>,
    pub refund_total: u64,
    pub refund_method: PaymentMethod,
    pub processed_by: UserId,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SaleReadModel {
    pub sale_id: SaleId,
    pub branch_id: BranchId,
    pub session_id: SessionId,
    pub cashier_id: UserId,
    pub lines: Vec<SaleLine>,
    pub totals: SaleTotals,
    pub payment_method: PaymentMethod,
    pub reservation_id: Option<AggregateId>,
    pub status: SaleStatus,
    pub refunded_total: u64,
    pub returns: Vec<ReturnSummary>,
    pub occurred_at: DateTime<Utc>,
}

/// Optional filters for sale listings.
#[derive(Debug, Clone, Copy, Default)]
pub struct SaleFilter {
    pub branch_id: Option<BranchId>,
    pub session_id: Option<SessionId>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl SaleFilter {
    fn matches(&self, sale: &SaleReadModel) -> bool {
        self.branch_id.is_none_or(|b| sale.branch_id == b)
            && self.session_id.is_none_or(|s| sale.session_id == s)
            && self.from.is_none_or(|from| sale.occurred_at >= from)
            && self.to.is_none_or(|to| sale.occurred_at < to)
    }
}

#[derive(Debug)]
pub struct SalesProjection<S>
where
    S: TenantStore<SaleId, SaleReadModel>,
{
    store: S,
    cursors: InMemoryCursorStore,
}

impl<S> SalesProjection<S>
where
    S: TenantStore<SaleId, SaleReadModel>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: InMemoryCursorStore::new(),
        }
    }

    pub fn get(&self, account_id: AccountId, sale_id: &SaleId) -> Option<SaleReadModel> {
        self.store.get(account_id, sale_id)
    }

    /// Matching sales, newest first.
    pub fn list(&self, account_id: AccountId, filter: SaleFilter) -> Vec<SaleReadModel> {
        let mut sales: Vec<_> = self
            .store
            .list(account_id)
            .into_iter()
            .filter(|s| filter.matches(s))
            .collect();
        sales.sort_by(|a, b| b.occurred_at.cmp(&a.occurred_at));
        sales
    }

    pub fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        if !self.cursors.should_apply(envelope)? {
            return Ok(());
        }
        let account_id = envelope.account_id();
        let event: SaleEvent = decode(envelope)?;

        match event {
            SaleEvent::Recorded(e) => {
                ensure_account(envelope, e.account_id)?;
                self.store.upsert(
                    account_id,
                    e.sale_id,
                    SaleReadModel {
                        sale_id: e.sale_id,
                        branch_id: e.branch_id,
                        session_id: e.session_id,
                        cashier_id: e.cashier_id,
                        lines: e.lines,
                        totals: e.totals,
                        payment_method: e.payment_method,
                        reservation_id: e.reservation_id,
                        status: SaleStatus::Completed,
                        refunded_total: 0,
                        returns: Vec::new(),
                        occurred_at: e.occurred_at,
                    },
                );
            }
            SaleEvent::ReturnRegistered(e) => {
                ensure_account(envelope, e.account_id)?;
                if let Some(mut rm) = self.store.get(account_id, &e.sale_id) {
                    rm.status = e.status_after;
                    rm.refunded_total += e.refund_total;
                    rm.returns.push(ReturnSummary {
                        return_id: e.return_id,
                        lines: e.lines,
                        refund_total: e.refund_total,
                        refund_method: e.refund_method,
                        processed_by: e.processed_by,
                        reason: e.reason,
                        occurred_at: e.occurred_at,
                    });
                    self.store.upsert(account_id, e.sale_id, rm);
                }
            }
        }

        self.cursors.advance(envelope);
        Ok(())
    }

    pub fn clear(&self, accounts: &[AccountId]) {
        self.cursors.clear();
        for account_id in accounts {
            self.store.clear_account(*account_id);
        }
    }
}
