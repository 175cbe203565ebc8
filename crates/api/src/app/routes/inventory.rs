use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;

use branchpos_auth::Permission;
use branchpos_infra::projections::StockLevelReadModel;
use branchpos_infra::workflows::products::adjust_stock;
use branchpos_products::ProductId;

use crate::app::routes::common::{ApiResult, guard, parse_id, visible_branch};
use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::{AccountContext, PrincipalContext};

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_stock))
        .route("/adjust", post(adjust))
        .route("/:product_id", get(get_stock))
}

/// Hide branches outside the caller's scope, totals included.
fn scoped(mut level: StockLevelReadModel, principal: &PrincipalContext) -> StockLevelReadModel {
    level.branches.retain(|branch_id, _| visible_branch(principal, *branch_id));
    level.total_on_hand = level.branches.values().map(|l| l.on_hand).sum();
    level.total_reserved = level.branches.values().map(|l| l.reserved).sum();
    level
}

/// Stock levels; with `?branch_id=` one row per product stocked there.
pub async fn list_stock(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(account): Extension<AccountContext>,
    Extension(principal): Extension<PrincipalContext>,
    Query(q): Query<dto::InventoryQuery>,
) -> ApiResult {
    guard(&account, &principal, &Permission::INVENTORY_READ, q.branch_id)?;
    let stock = &services.read_models().stock;

    match q.branch_id {
        Some(branch_id) => {
            let rows: Vec<_> = stock
                .list_for_branch(account.account_id(), branch_id)
                .into_iter()
                .map(|(product, level)| {
                    serde_json::json!({
                        "product_id": product.product_id.to_string(),
                        "sku": product.sku,
                        "name": product.name,
                        "branch_id": branch_id.to_string(),
                        "on_hand": level.on_hand,
                        "reserved": level.reserved,
                        "available": level.available,
                    })
                })
                .collect();
            Ok(Json(rows).into_response())
        }
        None => {
            let levels: Vec<_> = stock
                .list(account.account_id())
                .into_iter()
                .map(|level| scoped(level, &principal))
                .collect();
            Ok(Json(levels).into_response())
        }
    }
}

pub async fn get_stock(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(account): Extension<AccountContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(product_id): Path<String>,
) -> ApiResult {
    guard(&account, &principal, &Permission::INVENTORY_READ, None)?;
    let product_id: ProductId = parse_id(&product_id, "product")?;

    match services.read_models().stock.get(account.account_id(), &product_id) {
        Some(level) => Ok(Json(scoped(level, &principal)).into_response()),
        None => Err(errors::not_found("product")),
    }
}

pub async fn adjust(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(account): Extension<AccountContext>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<dto::AdjustStockRequest>,
) -> ApiResult {
    guard(&account, &principal, &Permission::INVENTORY_ADJUST, Some(body.branch_id))?;

    let now = Utc::now();
    let committed = services
        .transact(account.account_id(), |uow| {
            adjust_stock(uow, body.product_id, body.branch_id, body.delta, &body.note, now)
        })
        .map_err(errors::dispatch_error_to_response)?;

    let stock = committed.value.stock();
    Ok(Json(serde_json::json!({
        "product_id": body.product_id.to_string(),
        "branch_id": body.branch_id.to_string(),
        "on_hand": stock.on_hand(body.branch_id),
        "reserved": stock.reserved(body.branch_id),
        "available": stock.available(body.branch_id),
        "events_committed": committed.events.len(),
    }))
    .into_response())
}
