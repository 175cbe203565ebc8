use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use uuid::Uuid;

use branchpos_auth::Permission;
use branchpos_infra::projections::SaleFilter;
use branchpos_infra::workflows::sales::{self as flows, ReturnRequest, SaleRequest, SaleRequestLine};
use branchpos_sales::{Sale, SaleId};

use crate::app::routes::common::{ApiResult, guard, parse_id, visible_branch};
use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::{AccountContext, PrincipalContext};

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_sale).get(list_sales))
        .route("/:id", get(get_sale))
        .route("/:id/returns", post(register_return))
}

pub async fn create_sale(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(account): Extension<AccountContext>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<dto::CreateSaleRequest>,
) -> ApiResult {
    guard(&account, &principal, &Permission::SALES_CREATE, Some(body.branch_id))?;

    let request = SaleRequest {
        sale_id: SaleId::generate(),
        branch_id: body.branch_id,
        cashier_id: principal.user_id(),
        lines: body
            .lines
            .into_iter()
            .map(|l| SaleRequestLine {
                product_id: l.product_id,
                quantity: l.quantity,
                unit_price: l.unit_price,
                discount_bps: l.discount_bps,
            })
            .collect(),
        payment_method: body.payment_method,
        discount_limit_bps: principal.discount_limit_bps(),
        occurred_at: Utc::now(),
    };

    let committed = services
        .transact(account.account_id(), |uow| flows::record_sale(uow, &request))
        .map_err(errors::dispatch_error_to_response)?;
    let sale = committed.value;

    tracing::info!(
        account_id = %account.account_id(),
        sale_id = %request.sale_id,
        branch_id = %request.branch_id,
        total = sale.totals().total,
        "sale recorded"
    );

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({
            "id": request.sale_id.to_string(),
            "session_id": sale.session_id().map(|s| s.to_string()),
            "totals": sale.totals(),
            "lines": sale.lines(),
            "status": sale.status(),
            "events_committed": committed.events.len(),
        })),
    )
        .into_response())
}

/// Sales, newest first, filtered by `branch_id`, `session_id` and a
/// `[from, to)` window.
pub async fn list_sales(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(account): Extension<AccountContext>,
    Extension(principal): Extension<PrincipalContext>,
    Query(q): Query<dto::SalesQuery>,
) -> ApiResult {
    guard(&account, &principal, &Permission::SALES_READ, q.branch_id)?;

    let filter = SaleFilter {
        branch_id: q.branch_id,
        session_id: q.session_id,
        from: q.from,
        to: q.to,
    };
    let sales: Vec<_> = services
        .read_models()
        .sales
        .list(account.account_id(), filter)
        .into_iter()
        .filter(|s| visible_branch(&principal, s.branch_id))
        .collect();
    Ok(Json(sales).into_response())
}

pub async fn get_sale(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(account): Extension<AccountContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> ApiResult {
    let sale_id: SaleId = parse_id(&id, "sale")?;
    let sale = services
        .read_models()
        .sales
        .get(account.account_id(), &sale_id)
        .ok_or_else(|| errors::not_found("sale"))?;
    guard(&account, &principal, &Permission::SALES_READ, Some(sale.branch_id))?;
    Ok(Json(sale).into_response())
}

pub async fn register_return(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(account): Extension<AccountContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::ReturnRequestBody>,
) -> ApiResult {
    let sale_id: SaleId = parse_id(&id, "sale")?;

    // Scope check against the stream, not the (possibly lagging) listing.
    let current = services
        .load::<Sale>(account.account_id(), sale_id.aggregate_id())
        .map_err(errors::dispatch_error_to_response)?;
    let branch_id = match current.branch_id() {
        Some(branch_id) if current.is_created() => branch_id,
        _ => return Err(errors::not_found("sale")),
    };
    guard(&account, &principal, &Permission::SALES_RETURN, Some(branch_id))?;

    let request = ReturnRequest {
        sale_id,
        return_id: Uuid::now_v7(),
        lines: body.lines,
        refund_method: body.refund_method.unwrap_or(current.payment_method()),
        processed_by: principal.user_id(),
        reason: body.reason,
        occurred_at: Utc::now(),
    };
    let committed = services
        .transact(account.account_id(), |uow| flows::register_return(uow, &request))
        .map_err(errors::dispatch_error_to_response)?;
    let sale = committed.value;

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({
            "sale_id": sale_id.to_string(),
            "return_id": request.return_id.to_string(),
            "refunded_total": sale.refunded_total(),
            "status": sale.status(),
            "events_committed": committed.events.len(),
        })),
    )
        .into_response())
}
