use chrono::{DateTime, Utc};
use serde::Deserialize;

use branchpos_auth::Role;
use branchpos_core::BranchId;
use branchpos_products::ProductId;
use branchpos_registers::{PaymentMethod, SessionId};
use branchpos_reservations::{ReservationItem, ReservationStatus};
use branchpos_sales::ReturnLineInput;
use branchpos_transfers::{TransferLine, TransferStatus};

// -------------------------
// Branches
// -------------------------

#[derive(Debug, Deserialize)]
pub struct CreateBranchRequest {
    pub name: String,
    #[serde(default)]
    pub address: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateBranchRequest {
    pub name: String,
    #[serde(default)]
    pub address: String,
}

// -------------------------
// Products and stock
// -------------------------

#[derive(Debug, Deserialize)]
pub struct CreateProductRequest {
    pub sku: String,
    pub name: String,
    #[serde(default)]
    pub category: String,
    pub price: u64,
    #[serde(default)]
    pub cost_price: u64,
}

#[derive(Debug, Deserialize)]
pub struct UpdateProductRequest {
    pub sku: String,
    pub name: String,
    #[serde(default)]
    pub category: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdatePricingRequest {
    pub price: u64,
    #[serde(default)]
    pub cost_price: u64,
}

#[derive(Debug, Deserialize)]
pub struct AdjustStockRequest {
    pub product_id: ProductId,
    pub branch_id: BranchId,
    pub delta: i64,
    #[serde(default)]
    pub note: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct InventoryQuery {
    pub branch_id: Option<BranchId>,
}

// -------------------------
// Sales and registers
// -------------------------

#[derive(Debug, Deserialize)]
pub struct SaleLineRequest {
    pub product_id: ProductId,
    pub quantity: u64,
    /// Catalog price when omitted. Going below catalog uses up the
    /// caller's discount allowance.
    pub unit_price: Option<u64>,
    #[serde(default)]
    pub discount_bps: u32,
}

#[derive(Debug, Deserialize)]
pub struct CreateSaleRequest {
    pub branch_id: BranchId,
    pub lines: Vec<SaleLineRequest>,
    pub payment_method: PaymentMethod,
}

#[derive(Debug, Default, Deserialize)]
pub struct SalesQuery {
    pub branch_id: Option<BranchId>,
    pub session_id: Option<SessionId>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct ReturnRequestBody {
    pub lines: Vec<ReturnLineInput>,
    /// Defaults to the sale's payment method.
    pub refund_method: Option<PaymentMethod>,
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct OpenSessionRequest {
    #[serde(default)]
    pub opening_balance: u64,
}

#[derive(Debug, Deserialize)]
pub struct CloseSessionRequest {
    pub counted_cash: u64,
    /// Guards against closing a session other than the one the till saw.
    pub session_id: Option<SessionId>,
}

// -------------------------
// Transfers
// -------------------------

#[derive(Debug, Deserialize)]
pub struct CreateTransferRequest {
    pub source_branch_id: BranchId,
    pub destination_branch_id: BranchId,
    pub lines: Vec<TransferLine>,
    #[serde(default)]
    pub note: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ReasonRequest {
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct TransfersQuery {
    pub branch_id: Option<BranchId>,
    pub status: Option<TransferStatus>,
}

// -------------------------
// Reservations
// -------------------------

#[derive(Debug, Deserialize)]
pub struct CreateReservationRequest {
    pub branch_id: BranchId,
    pub items: Vec<ReservationItem>,
    #[serde(default)]
    pub customer_name: String,
    pub expiry_date: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CompleteReservationRequest {
    pub payment_method: PaymentMethod,
}

#[derive(Debug, Default, Deserialize)]
pub struct ReservationsQuery {
    pub branch_id: Option<BranchId>,
    pub status: Option<ReservationStatus>,
}

// -------------------------
// Users and access control
// -------------------------

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub email: String,
    #[serde(default)]
    pub display_name: String,
    pub role: Role,
    #[serde(default)]
    pub branch_ids: Vec<BranchId>,
}

#[derive(Debug, Deserialize)]
pub struct ChangeRoleRequest {
    pub role: Role,
}

#[derive(Debug, Deserialize)]
pub struct AssignBranchesRequest {
    pub branch_ids: Vec<BranchId>,
}

#[derive(Debug, Deserialize)]
pub struct ExplainQuery {
    pub permission: String,
    pub branch_id: Option<BranchId>,
}
