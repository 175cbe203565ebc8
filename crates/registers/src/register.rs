use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use branchpos_core::{AccountId, Aggregate, AggregateId, AggregateRoot, BranchId, DomainError, UserId, aggregate_id};
use branchpos_events::Event;

aggregate_id!(
    /// Cash register identifier. Each branch owns exactly one register.
    RegisterId
);

/// Identifier of a single open/close cycle of a register.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Display for SessionId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    Card,
    BankTransfer,
    Other,
}

/// Running totals of an open session (amounts in minor currency units).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionTotals {
    pub opening_balance: u64,
    pub cash_sales: u64,
    pub card_sales: u64,
    pub bank_transfer_sales: u64,
    pub other_sales: u64,
    pub cash_refunds: u64,
    pub non_cash_refunds: u64,
    pub sale_count: u64,
    pub refund_count: u64,
}

impl SessionTotals {
    /// Cash that should be in the drawer.
    pub fn expected_cash(&self) -> u64 {
        (self.opening_balance + self.cash_sales).saturating_sub(self.cash_refunds)
    }

    pub fn gross_sales(&self) -> u64 {
        self.cash_sales + self.card_sales + self.bank_transfer_sales + self.other_sales
    }

    fn record_sale(&mut self, total: u64, method: PaymentMethod) {
        match method {
            PaymentMethod::Cash => self.cash_sales += total,
            PaymentMethod::Card => self.card_sales += total,
            PaymentMethod::BankTransfer => self.bank_transfer_sales += total,
            PaymentMethod::Other => self.other_sales += total,
        }
        self.sale_count += 1;
    }

    fn record_refund(&mut self, amount: u64, method: PaymentMethod) {
        match method {
            PaymentMethod::Cash => self.cash_refunds += amount,
            _ => self.non_cash_refunds += amount,
        }
        self.refund_count += 1;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenSessionState {
    pub session_id: SessionId,
    pub opened_by: UserId,
    pub opened_at: DateTime<Utc>,
    pub totals: SessionTotals,
}

/// Aggregate root: CashRegister.
///
/// # Invariants
/// - At most one session is open at any time.
/// - Sales and refunds can only be recorded into the open session.
/// - Cash refunds cannot exceed the cash expected in the drawer.
///
/// Concurrent "open" attempts race on this aggregate's stream version; the
/// loser reloads, sees the open session and is rejected with `Conflict`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CashRegister {
    id: RegisterId,
    account_id: Option<AccountId>,
    branch_id: Option<BranchId>,
    current: Option<OpenSessionState>,
    closed_sessions: u64,
    version: u64,
    initialized: bool,
}

impl CashRegister {
    pub fn empty(id: RegisterId) -> Self {
        Self {
            id,
            account_id: None,
            branch_id: None,
            current: None,
            closed_sessions: 0,
            version: 0,
            initialized: false,
        }
    }

    pub fn branch_id(&self) -> Option<BranchId> {
        self.branch_id
    }

    pub fn current_session(&self) -> Option<&OpenSessionState> {
        self.current.as_ref()
    }

    pub fn is_open(&self) -> bool {
        self.current.is_some()
    }

    pub fn closed_sessions(&self) -> u64 {
        self.closed_sessions
    }

    fn ensure_initialized(&self, account_id: AccountId) -> Result<(), DomainError> {
        if !self.initialized {
            return Err(DomainError::not_found());
        }
        if self.account_id != Some(account_id) {
            return Err(DomainError::invariant("account mismatch"));
        }
        Ok(())
    }

    fn open_session(&self) -> Result<&OpenSessionState, DomainError> {
        self.current
            .as_ref()
            .ok_or_else(|| DomainError::invariant("no cash session is open at this branch"))
    }
}

impl AggregateRoot for CashRegister {
    type Id = RegisterId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitializeRegister {
    pub account_id: AccountId,
    pub register_id: RegisterId,
    pub branch_id: BranchId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenSession {
    pub account_id: AccountId,
    pub session_id: SessionId,
    pub opened_by: UserId,
    pub opening_balance: u64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordSale {
    pub account_id: AccountId,
    pub sale_id: AggregateId,
    pub total: u64,
    pub payment_method: PaymentMethod,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordRefund {
    pub account_id: AccountId,
    pub sale_id: AggregateId,
    pub amount: u64,
    pub refund_method: PaymentMethod,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloseSession {
    pub account_id: AccountId,
    pub session_id: SessionId,
    pub closed_by: UserId,
    pub counted_cash: u64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegisterCommand {
    Initialize(InitializeRegister),
    OpenSession(OpenSession),
    RecordSale(RecordSale),
    RecordRefund(RecordRefund),
    CloseSession(CloseSession),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterInitialized {
    pub account_id: AccountId,
    pub register_id: RegisterId,
    pub branch_id: BranchId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionOpened {
    pub account_id: AccountId,
    pub register_id: RegisterId,
    pub branch_id: BranchId,
    pub session_id: SessionId,
    pub opened_by: UserId,
    pub opening_balance: u64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleRecorded {
    pub account_id: AccountId,
    pub register_id: RegisterId,
    pub branch_id: BranchId,
    pub session_id: SessionId,
    pub sale_id: AggregateId,
    pub total: u64,
    pub payment_method: PaymentMethod,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundRecorded {
    pub account_id: AccountId,
    pub register_id: RegisterId,
    pub branch_id: BranchId,
    pub session_id: SessionId,
    pub sale_id: AggregateId,
    pub amount: u64,
    pub refund_method: PaymentMethod,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClosed {
    pub account_id: AccountId,
    pub register_id: RegisterId,
    pub branch_id: BranchId,
    pub session_id: SessionId,
    pub closed_by: UserId,
    pub totals: SessionTotals,
    pub expected_cash: u64,
    pub counted_cash: u64,
    /// `counted_cash - expected_cash`; negative means the drawer is short.
    pub variance: i64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegisterEvent {
    Initialized(RegisterInitialized),
    SessionOpened(SessionOpened),
    SaleRecorded(SaleRecorded),
    RefundRecorded(RefundRecorded),
    SessionClosed(SessionClosed),
}

impl Event for RegisterEvent {
    fn event_type(&self) -> &'static str {
        match self {
            RegisterEvent::Initialized(_) => "registers.register.initialized",
            RegisterEvent::SessionOpened(_) => "registers.register.session_opened",
            RegisterEvent::SaleRecorded(_) => "registers.register.sale_recorded",
            RegisterEvent::RefundRecorded(_) => "registers.register.refund_recorded",
            RegisterEvent::SessionClosed(_) => "registers.register.session_closed",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            RegisterEvent::Initialized(e) => e.occurred_at,
            RegisterEvent::SessionOpened(e) => e.occurred_at,
            RegisterEvent::SaleRecorded(e) => e.occurred_at,
            RegisterEvent::RefundRecorded(e) => e.occurred_at,
            RegisterEvent::SessionClosed(e) => e.occurred_at,
        }
    }
}

impl Aggregate for CashRegister {
    type Command = RegisterCommand;
    type Event = RegisterEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            RegisterEvent::Initialized(e) => {
                self.id = e.register_id;
                self.account_id = Some(e.account_id);
                self.branch_id = Some(e.branch_id);
                self.initialized = true;
            }
            RegisterEvent::SessionOpened(e) => {
                self.current = Some(OpenSessionState {
                    session_id: e.session_id,
                    opened_by: e.opened_by,
                    opened_at: e.occurred_at,
                    totals: SessionTotals {
                        opening_balance: e.opening_balance,
                        ..SessionTotals::default()
                    },
                });
            }
            RegisterEvent::SaleRecorded(e) => {
                if let Some(session) = self.current.as_mut() {
                    session.totals.record_sale(e.total, e.payment_method);
                }
            }
            RegisterEvent::RefundRecorded(e) => {
                if let Some(session) = self.current.as_mut() {
                    session.totals.record_refund(e.amount, e.refund_method);
                }
            }
            RegisterEvent::SessionClosed(_) => {
                self.current = None;
                self.closed_sessions += 1;
            }
        }
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            RegisterCommand::Initialize(cmd) => self.handle_initialize(cmd),
            RegisterCommand::OpenSession(cmd) => self.handle_open(cmd),
            RegisterCommand::RecordSale(cmd) => self.handle_record_sale(cmd),
            RegisterCommand::RecordRefund(cmd) => self.handle_record_refund(cmd),
            RegisterCommand::CloseSession(cmd) => self.handle_close(cmd),
        }
    }
}

impl CashRegister {
    fn branch(&self) -> Result<BranchId, DomainError> {
        self.branch_id.ok_or_else(DomainError::not_found)
    }

    fn handle_initialize(&self, cmd: &InitializeRegister) -> Result<Vec<RegisterEvent>, DomainError> {
        if self.initialized {
            return Err(DomainError::conflict("register already initialized"));
        }
        Ok(vec![RegisterEvent::Initialized(RegisterInitialized {
            account_id: cmd.account_id,
            register_id: cmd.register_id,
            branch_id: cmd.branch_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_open(&self, cmd: &OpenSession) -> Result<Vec<RegisterEvent>, DomainError> {
        self.ensure_initialized(cmd.account_id)?;
        if let Some(open) = &self.current {
            return Err(DomainError::conflict(format!(
                "a cash session ({}) is already open at this branch",
                open.session_id
            )));
        }

        Ok(vec![RegisterEvent::SessionOpened(SessionOpened {
            account_id: cmd.account_id,
            register_id: self.id,
            branch_id: self.branch()?,
            session_id: cmd.session_id,
            opened_by: cmd.opened_by,
            opening_balance: cmd.opening_balance,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_record_sale(&self, cmd: &RecordSale) -> Result<Vec<RegisterEvent>, DomainError> {
        self.ensure_initialized(cmd.account_id)?;
        let session = self.open_session()?;

        Ok(vec![RegisterEvent::SaleRecorded(SaleRecorded {
            account_id: cmd.account_id,
            register_id: self.id,
            branch_id: self.branch()?,
            session_id: session.session_id,
            sale_id: cmd.sale_id,
            total: cmd.total,
            payment_method: cmd.payment_method,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_record_refund(&self, cmd: &RecordRefund) -> Result<Vec<RegisterEvent>, DomainError> {
        self.ensure_initialized(cmd.account_id)?;
        let session = self.open_session()?;

        if cmd.refund_method == PaymentMethod::Cash && cmd.amount > session.totals.expected_cash() {
            return Err(DomainError::invariant(format!(
                "cash refund of {} exceeds the {} expected in the drawer",
                cmd.amount,
                session.totals.expected_cash()
            )));
        }

        Ok(vec![RegisterEvent::RefundRecorded(RefundRecorded {
            account_id: cmd.account_id,
            register_id: self.id,
            branch_id: self.branch()?,
            session_id: session.session_id,
            sale_id: cmd.sale_id,
            amount: cmd.amount,
            refund_method: cmd.refund_method,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_close(&self, cmd: &CloseSession) -> Result<Vec<RegisterEvent>, DomainError> {
        self.ensure_initialized(cmd.account_id)?;
        let session = self.open_session()?;
        if session.session_id != cmd.session_id {
            return Err(DomainError::conflict(format!(
                "session {} is not the open session",
                cmd.session_id
            )));
        }

        let expected_cash = session.totals.expected_cash();
        let variance = cmd.counted_cash as i64 - expected_cash as i64;

        Ok(vec![RegisterEvent::SessionClosed(SessionClosed {
            account_id: cmd.account_id,
            register_id: self.id,
            branch_id: self.branch()?,
            session_id: session.session_id,
            closed_by: cmd.closed_by,
            totals: session.totals,
            expected_cash,
            counted_cash: cmd.counted_cash,
            variance,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn initialized() -> (AccountId, CashRegister) {
        let account_id = AccountId::new();
        let register_id = RegisterId::generate();
        let mut register = CashRegister::empty(register_id);
        register
            .execute(&RegisterCommand::Initialize(InitializeRegister {
                account_id,
                register_id,
                branch_id: BranchId::new(),
                occurred_at: Utc::now(),
            }))
            .unwrap();
        (account_id, register)
    }

    fn open(account_id: AccountId, opening_balance: u64) -> RegisterCommand {
        RegisterCommand::OpenSession(OpenSession {
            account_id,
            session_id: SessionId::new(),
            opened_by: UserId::new(),
            opening_balance,
            occurred_at: Utc::now(),
        })
    }

    fn sale(account_id: AccountId, total: u64, payment_method: PaymentMethod) -> RegisterCommand {
        RegisterCommand::RecordSale(RecordSale {
            account_id,
            sale_id: AggregateId::new(),
            total,
            payment_method,
            occurred_at: Utc::now(),
        })
    }

    #[test]
    fn second_open_is_a_conflict() {
        let (account_id, mut register) = initialized();
        register.execute(&open(account_id, 0)).unwrap();

        let err = register.handle(&open(account_id, 0)).unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
    }

    #[test]
    fn sale_without_open_session_is_rejected() {
        let (account_id, register) = initialized();
        let err = register.handle(&sale(account_id, 100, PaymentMethod::Cash)).unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn close_computes_expected_cash_and_variance() {
        let (account_id, mut register) = initialized();
        register.execute(&open(account_id, 10_000)).unwrap();
        let session_id = register.current_session().unwrap().session_id;

        register.execute(&sale(account_id, 2_500, PaymentMethod::Cash)).unwrap();
        register.execute(&sale(account_id, 4_000, PaymentMethod::Card)).unwrap();
        register
            .execute(&RegisterCommand::RecordRefund(RecordRefund {
                account_id,
                sale_id: AggregateId::new(),
                amount: 500,
                refund_method: PaymentMethod::Cash,
                occurred_at: Utc::now(),
            }))
            .unwrap();

        let events = register
            .execute(&RegisterCommand::CloseSession(CloseSession {
                account_id,
                session_id,
                closed_by: UserId::new(),
                counted_cash: 11_900,
                occurred_at: Utc::now(),
            }))
            .unwrap();

        let RegisterEvent::SessionClosed(closed) = &events[0] else {
            panic!("expected SessionClosed");
        };
        assert_eq!(closed.expected_cash, 12_000);
        assert_eq!(closed.variance, -100);
        assert_eq!(closed.totals.gross_sales(), 6_500);
        assert!(!register.is_open());
        assert_eq!(register.closed_sessions(), 1);
    }

    #[test]
    fn cash_refund_cannot_exceed_drawer() {
        let (account_id, mut register) = initialized();
        register.execute(&open(account_id, 100)).unwrap();

        let err = register
            .handle(&RegisterCommand::RecordRefund(RecordRefund {
                account_id,
                sale_id: AggregateId::new(),
                amount: 101,
                refund_method: PaymentMethod::Cash,
                occurred_at: Utc::now(),
            }))
            .unwrap_err();
        assert!(err.to_string().contains("exceeds"));
    }

    #[test]
    fn closing_a_stale_session_id_is_a_conflict() {
        let (account_id, mut register) = initialized();
        register.execute(&open(account_id, 0)).unwrap();

        let err = register
            .handle(&RegisterCommand::CloseSession(CloseSession {
                account_id,
                session_id: SessionId::new(),
                closed_by: UserId::new(),
                counted_cash: 0,
                occurred_at: Utc::now(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
    }

    #[test]
    fn reopen_after_close_is_allowed() {
        let (account_id, mut register) = initialized();
        register.execute(&open(account_id, 0)).unwrap();
        let session_id = register.current_session().unwrap().session_id;
        register
            .execute(&RegisterCommand::CloseSession(CloseSession {
                account_id,
                session_id,
                closed_by: UserId::new(),
                counted_cash: 0,
                occurred_at: Utc::now(),
            }))
            .unwrap();

        assert!(register.handle(&open(account_id, 0)).is_ok());
    }
}
