use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;

use branchpos_auth::Permission;
use branchpos_core::BranchId;
use branchpos_infra::workflows::branches::{self as flows, NewBranch};
use branchpos_registers::RegisterId;

use crate::app::routes::common::{ApiResult, guard, parse_id, visible_branch};
use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::{AccountContext, PrincipalContext};

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_branch).get(list_branches))
        .route("/:id", get(get_branch).put(update_branch))
        .route("/:id/deactivate", post(deactivate_branch))
}

pub async fn create_branch(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(account): Extension<AccountContext>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<dto::CreateBranchRequest>,
) -> ApiResult {
    guard(&account, &principal, &Permission::BRANCHES_WRITE, None)?;

    let input = NewBranch {
        branch_id: BranchId::new(),
        register_id: RegisterId::generate(),
        name: body.name,
        address: body.address,
        occurred_at: Utc::now(),
    };
    let committed = services
        .transact(account.account_id(), |uow| flows::create_branch(uow, &input))
        .map_err(errors::dispatch_error_to_response)?;

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({
            "id": input.branch_id.to_string(),
            "register_id": input.register_id.to_string(),
            "events_committed": committed.events.len(),
        })),
    )
        .into_response())
}

pub async fn list_branches(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(account): Extension<AccountContext>,
    Extension(principal): Extension<PrincipalContext>,
) -> ApiResult {
    guard(&account, &principal, &Permission::BRANCHES_READ, None)?;

    let branches: Vec<_> = services
        .read_models()
        .branches
        .list(account.account_id())
        .into_iter()
        .filter(|b| visible_branch(&principal, b.branch_id))
        .collect();
    Ok(Json(branches).into_response())
}

pub async fn get_branch(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(account): Extension<AccountContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> ApiResult {
    let branch_id: BranchId = parse_id(&id, "branch")?;
    guard(&account, &principal, &Permission::BRANCHES_READ, Some(branch_id))?;

    match services.read_models().branches.get(account.account_id(), &branch_id) {
        Some(branch) => Ok(Json(branch).into_response()),
        None => Err(errors::not_found("branch")),
    }
}

pub async fn update_branch(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(account): Extension<AccountContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::UpdateBranchRequest>,
) -> ApiResult {
    let branch_id: BranchId = parse_id(&id, "branch")?;
    guard(&account, &principal, &Permission::BRANCHES_WRITE, Some(branch_id))?;

    let now = Utc::now();
    let committed = services
        .transact(account.account_id(), |uow| {
            flows::update_branch(uow, branch_id, &body.name, &body.address, now)
        })
        .map_err(errors::dispatch_error_to_response)?;

    Ok(Json(serde_json::json!({
        "id": branch_id.to_string(),
        "name": committed.value.name(),
        "address": committed.value.address(),
        "events_committed": committed.events.len(),
    }))
    .into_response())
}

pub async fn deactivate_branch(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(account): Extension<AccountContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> ApiResult {
    let branch_id: BranchId = parse_id(&id, "branch")?;
    guard(&account, &principal, &Permission::BRANCHES_WRITE, Some(branch_id))?;

    let now = Utc::now();
    let committed = services
        .transact(account.account_id(), |uow| flows::deactivate_branch(uow, branch_id, now))
        .map_err(errors::dispatch_error_to_response)?;

    Ok(Json(serde_json::json!({
        "id": branch_id.to_string(),
        "active": committed.value.is_active(),
        "events_committed": committed.events.len(),
    }))
    .into_response())
}
