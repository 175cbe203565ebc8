use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;

use branchpos_core::{AccountId, BranchId, UserId};
use branchpos_events::EventEnvelope;
use branchpos_registers::{PaymentMethod, RegisterEvent, RegisterId, SessionId, SessionTotals};

use super::cursor_store::{InMemoryCursorStore, ProjectionCursorStore};
use super::{ProjectionError, decode, ensure_account};
use crate::read_model::TenantStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CashSessionStatus {
    Open,
    Closed,
}

/// One open/close cycle of a branch register, with its reconciliation once closed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CashSessionReadModel {
    pub session_id: SessionId,
    pub register_id: RegisterId,
    pub branch_id: BranchId,
    pub status: CashSessionStatus,
    pub opened_by: UserId,
    pub opened_at: DateTime<Utc>,
    pub totals: SessionTotals,
    pub expected_cash: u64,
    pub closed_by: Option<UserId>,
    pub closed_at: Option<DateTime<Utc>>,
    pub counted_cash: Option<u64>,
    pub variance: Option<i64>,
}

#[derive(Debug)]
pub struct CashSessionsProjection<S>
where
    S: TenantStore<SessionId, CashSessionReadModel>,
{
    store: S,
    cursors: InMemoryCursorStore,
}

impl<S> CashSessionsProjection<S>
where
    S: TenantStore<SessionId, CashSessionReadModel>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: InMemoryCursorStore::new(),
        }
    }

    pub fn get(&self, account_id: AccountId, session_id: &SessionId) -> Option<CashSessionReadModel> {
        self.store.get(account_id, session_id)
    }

    /// Newest first.
    pub fn list_for_branch(&self, account_id: AccountId, branch_id: BranchId) -> Vec<CashSessionReadModel> {
        let mut sessions: Vec<_> = self
            .store
            .list(account_id)
            .into_iter()
            .filter(|s| s.branch_id == branch_id)
            .collect();
        sessions.sort_by(|a, b| b.opened_at.cmp(&a.opened_at));
        sessions
    }

    pub fn current_for_branch(&self, account_id: AccountId, branch_id: BranchId) -> Option<CashSessionReadModel> {
        self.list_for_branch(account_id, branch_id)
            .into_iter()
            .find(|s| s.status == CashSessionStatus::Open)
    }

    pub fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        if !self.cursors.should_apply(envelope)? {
            return Ok(());
        }
        let account_id = envelope.account_id();
        let event: RegisterEvent = decode(envelope)?;

        match event {
            RegisterEvent::Initialized(e) => {
                ensure_account(envelope, e.account_id)?;
            }
            RegisterEvent::SessionOpened(e) => {
                ensure_account(envelope, e.account_id)?;
                let totals = SessionTotals {
                    opening_balance: e.opening_balance,
                    ..SessionTotals::default()
                };
                self.store.upsert(
                    account_id,
                    e.session_id,
                    CashSessionReadModel {
                        session_id: e.session_id,
                        register_id: e.register_id,
                        branch_id: e.branch_id,
                        status: CashSessionStatus::Open,
                        opened_by: e.opened_by,
                        opened_at: e.occurred_at,
                        totals,
                        expected_cash: totals.expected_cash(),
                        closed_by: None,
                        closed_at: None,
                        counted_cash: None,
                        variance: None,
                    },
                );
            }
            RegisterEvent::SaleRecorded(e) => {
                ensure_account(envelope, e.account_id)?;
                if let Some(mut rm) = self.store.get(account_id, &e.session_id) {
                    let t = &mut rm.totals;
                    match e.payment_method {
                        PaymentMethod::Cash => t.cash_sales += e.total,
                        PaymentMethod::Card => t.card_sales += e.total,
                        PaymentMethod::BankTransfer => t.bank_transfer_sales += e.total,
                        PaymentMethod::Other => t.other_sales += e.total,
                    }
                    t.sale_count += 1;
                    rm.expected_cash = rm.totals.expected_cash();
                    self.store.upsert(account_id, e.session_id, rm);
                }
            }
            RegisterEvent::RefundRecorded(e) => {
                ensure_account(envelope, e.account_id)?;
                if let Some(mut rm) = self.store.get(account_id, &e.session_id) {
                    let t = &mut rm.totals;
                    match e.refund_method {
                        PaymentMethod::Cash => t.cash_refunds += e.amount,
                        _ => t.non_cash_refunds += e.amount,
                    }
                    t.refund_count += 1;
                    rm.expected_cash = rm.totals.expected_cash();
                    self.store.upsert(account_id, e.session_id, rm);
                }
            }
            RegisterEvent::SessionClosed(e) => {
                ensure_account(envelope, e.account_id)?;
                if let Some(mut rm) = self.store.get(account_id, &e.session_id) {
                    rm.status = CashSessionStatus::Closed;
                    rm.totals = e.totals;
                    rm.expected_cash = e.expected_cash;
                    rm.closed_by = Some(e.closed_by);
                    rm.closed_at = Some(e.occurred_at);
                    rm.counted_cash = Some(e.counted_cash);
                    rm.variance = Some(e.variance);
                    self.store.upsert(account_id, e.session_id, rm);
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
