use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;

use branchpos_auth::Permission;
use branchpos_core::BranchId;
use branchpos_infra::workflows::transfers::{self as flows, TransferRequest};
use branchpos_transfers::{Transfer, TransferCommand, TransferId};

use crate::app::routes::common::{ApiResult, guard, parse_id, visible_branch};
use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::{AccountContext, PrincipalContext};

pub fn router() -> Router {
    Router::new()
        .route("/", post(request_transfer).get(list_transfers))
        .route("/:id", get(get_transfer))
        .route("/:id/approve", post(approve_transfer))
        .route("/:id/reject", post(reject_transfer))
        .route("/:id/ship", post(ship_transfer))
        .route("/:id/cancel", post(cancel_transfer))
        .route("/:id/complete", post(complete_transfer))
}

fn transfer_response(id: TransferId, transfer: &Transfer, events: usize) -> axum::response::Response {
    Json(serde_json::json!({
        "id": id.to_string(),
        "status": transfer.status(),
        "events_committed": events,
    }))
    .into_response()
}

#[derive(Clone, Copy)]
enum Side {
    Source,
    Destination,
}

/// Load the transfer from its stream and check `required` against the
/// branch on the given side.
fn authorize_on(
    services: &AppServices,
    account: &AccountContext,
    principal: &PrincipalContext,
    transfer_id: TransferId,
    required: &Permission,
    side: Side,
) -> Result<(), axum::response::Response> {
    let transfer = services
        .load::<Transfer>(account.account_id(), transfer_id.aggregate_id())
        .map_err(errors::dispatch_error_to_response)?;
    if !transfer.is_created() {
        return Err(errors::not_found("transfer"));
    }
    let branch: Option<BranchId> = match side {
        Side::Source => transfer.source_branch_id(),
        Side::Destination => transfer.destination_branch_id(),
    };
    guard(account, principal, required, branch)
}

pub async fn request_transfer(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(account): Extension<AccountContext>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<dto::CreateTransferRequest>,
) -> ApiResult {
    guard(&account, &principal, &Permission::TRANSFERS_REQUEST, Some(body.source_branch_id))?;

    let request = TransferRequest {
        transfer_id: TransferId::generate(),
        source_branch_id: body.source_branch_id,
        destination_branch_id: body.destination_branch_id,
        lines: body.lines,
        requested_by: principal.user_id(),
        note: body.note,
        occurred_at: Utc::now(),
    };
    let committed = services
        .transact(account.account_id(), |uow| flows::request_transfer(uow, &request))
        .map_err(errors::dispatch_error_to_response)?;

    Ok((
        StatusCode::CREATED,
        transfer_response(request.transfer_id, &committed.value, committed.events.len()),
    )
        .into_response())
}

pub async fn list_transfers(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(account): Extension<AccountContext>,
    Extension(principal): Extension<PrincipalContext>,
    Query(q): Query<dto::TransfersQuery>,
) -> ApiResult {
    guard(&account, &principal, &Permission::TRANSFERS_READ, q.branch_id)?;

    let transfers: Vec<_> = services
        .read_models()
        .transfers
        .list(account.account_id(), q.branch_id, q.status)
        .into_iter()
        .filter(|t| visible_branch(&principal, t.source_branch_id) || visible_branch(&principal, t.destination_branch_id))
        .collect();
    Ok(Json(transfers).into_response())
}

pub async fn get_transfer(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(account): Extension<AccountContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> ApiResult {
    guard(&account, &principal, &Permission::TRANSFERS_READ, None)?;
    let transfer_id: TransferId = parse_id(&id, "transfer")?;

    match services.read_models().transfers.get(account.account_id(), &transfer_id) {
        Some(t) if visible_branch(&principal, t.source_branch_id) || visible_branch(&principal, t.destination_branch_id) => {
            Ok(Json(t).into_response())
        }
        _ => Err(errors::not_found("transfer")),
    }
}

pub async fn approve_transfer(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(account): Extension<AccountContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> ApiResult {
    let transfer_id: TransferId = parse_id(&id, "transfer")?;
    authorize_on(&services, &account, &principal, transfer_id, &Permission::TRANSFERS_APPROVE, Side::Source)?;

    let cmd = TransferCommand::Approve {
        account_id: account.account_id(),
        approved_by: principal.user_id(),
        occurred_at: Utc::now(),
    };
    let committed = services
        .transact(account.account_id(), |uow| flows::transition(uow, transfer_id, &cmd))
        .map_err(errors::dispatch_error_to_response)?;
    Ok(transfer_response(transfer_id, &committed.value, committed.events.len()))
}

pub async fn reject_transfer(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(account): Extension<AccountContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    body: Option<Json<dto::ReasonRequest>>,
) -> ApiResult {
    let transfer_id: TransferId = parse_id(&id, "transfer")?;
    authorize_on(&services, &account, &principal, transfer_id, &Permission::TRANSFERS_APPROVE, Side::Source)?;

    let cmd = TransferCommand::Reject {
        account_id: account.account_id(),
        rejected_by: principal.user_id(),
        reason: body.map(|Json(b)| b.reason).unwrap_or_default(),
        occurred_at: Utc::now(),
    };
    let committed = services
        .transact(account.account_id(), |uow| flows::transition(uow, transfer_id, &cmd))
        .map_err(errors::dispatch_error_to_response)?;
    Ok(transfer_response(transfer_id, &committed.value, committed.events.len()))
}

pub async fn ship_transfer(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(account): Extension<AccountContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> ApiResult {
    let transfer_id: TransferId = parse_id(&id, "transfer")?;
    authorize_on(&services, &account, &principal, transfer_id, &Permission::TRANSFERS_SHIP, Side::Source)?;

    let now = Utc::now();
    let committed = services
        .transact(account.account_id(), |uow| {
            flows::ship_transfer(uow, transfer_id, principal.user_id(), now)
        })
        .map_err(errors::dispatch_error_to_response)?;
    Ok(transfer_response(transfer_id, &committed.value, committed.events.len()))
}

pub async fn cancel_transfer(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(account): Extension<AccountContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    body: Option<Json<dto::ReasonRequest>>,
) -> ApiResult {
    let transfer_id: TransferId = parse_id(&id, "transfer")?;
    authorize_on(&services, &account, &principal, transfer_id, &Permission::TRANSFERS_REQUEST, Side::Source)?;

    let cmd = TransferCommand::Cancel {
        account_id: account.account_id(),
        cancelled_by: principal.user_id(),
        reason: body.map(|Json(b)| b.reason).unwrap_or_default(),
        occurred_at: Utc::now(),
    };
    let committed = services
        .transact(account.account_id(), |uow| flows::transition(uow, transfer_id, &cmd))
        .map_err(errors::dispatch_error_to_response)?;
    Ok(transfer_response(transfer_id, &committed.value, committed.events.len()))
}

/// Receive at the destination; stock moves in the same commit.
pub async fn complete_transfer(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(account): Extension<AccountContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> ApiResult {
    let transfer_id: TransferId = parse_id(&id, "transfer")?;
    authorize_on(
        &services,
        &account,
        &principal,
        transfer_id,
        &Permission::TRANSFERS_RECEIVE,
        Side::Destination,
    )?;

    let now = Utc::now();
    let committed = services
        .transact(account.account_id(), |uow| {
            flows::complete_transfer(uow, transfer_id, principal.user_id(), now)
        })
        .map_err(errors::dispatch_error_to_response)?;
    Ok(transfer_response(transfer_id, &committed.value, committed.events.len()))
}
