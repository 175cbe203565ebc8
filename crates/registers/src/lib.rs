//! Cash registers: one per branch, holding at most one open session.

pub mod register;

pub use register::{
    CashRegister, CloseSession, InitializeRegister, OpenSession, OpenSessionState, PaymentMethod,
    RecordRefund, RecordSale, RefundRecorded, RegisterCommand, RegisterEvent, RegisterId,
    RegisterInitialized, SaleRecorded, SessionClosed, SessionId, SessionOpened, SessionTotals,
};
