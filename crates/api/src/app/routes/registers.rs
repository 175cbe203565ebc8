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
use branchpos_infra::event_store::StoredEvent;
use branchpos_infra::streams;
use branchpos_infra::workflows::registers as flows;
use branchpos_registers::{RegisterEvent, SessionClosed, SessionId};

use crate::app::routes::common::{ApiResult, guard, parse_id};
use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::{AccountContext, PrincipalContext};

pub fn router() -> Router {
    Router::new()
        .route("/:branch_id", get(current_session))
        .route("/:branch_id/sessions", get(list_sessions))
        .route("/:branch_id/open", post(open_session))
        .route("/:branch_id/close", post(close_session))
}

pub async fn current_session(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(account): Extension<AccountContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(branch_id): Path<String>,
) -> ApiResult {
    let branch_id: BranchId = parse_id(&branch_id, "branch")?;
    guard(&account, &principal, &Permission::REGISTERS_READ, Some(branch_id))?;

    match services
        .read_models()
        .cash_sessions
        .current_for_branch(account.account_id(), branch_id)
    {
        Some(session) => Ok(Json(session).into_response()),
        None => Err(errors::not_found("open cash session")),
    }
}

pub async fn list_sessions(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(account): Extension<AccountContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(branch_id): Path<String>,
) -> ApiResult {
    let branch_id: BranchId = parse_id(&branch_id, "branch")?;
    guard(&account, &principal, &Permission::REGISTERS_READ, Some(branch_id))?;

    let sessions = services
        .read_models()
        .cash_sessions
        .list_for_branch(account.account_id(), branch_id);
    Ok(Json(sessions).into_response())
}

pub async fn open_session(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(account): Extension<AccountContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(branch_id): Path<String>,
    body: Option<Json<dto::OpenSessionRequest>>,
) -> ApiResult {
    let branch_id: BranchId = parse_id(&branch_id, "branch")?;
    guard(&account, &principal, &Permission::REGISTERS_OPERATE, Some(branch_id))?;

    let opening_balance = body.map(|Json(b)| b.opening_balance).unwrap_or_default();
    let session_id = SessionId::new();
    let now = Utc::now();
    let committed = services
        .transact(account.account_id(), |uow| {
            flows::open_session(uow, branch_id, session_id, principal.user_id(), opening_balance, now)
        })
        .map_err(errors::dispatch_error_to_response)?;

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({
            "session_id": session_id.to_string(),
            "branch_id": branch_id.to_string(),
            "opening_balance": opening_balance,
            "events_committed": committed.events.len(),
        })),
    )
        .into_response())
}

/// Close the open session and report the reconciliation.
pub async fn close_session(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(account): Extension<AccountContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(branch_id): Path<String>,
    Json(body): Json<dto::CloseSessionRequest>,
) -> ApiResult {
    let branch_id: BranchId = parse_id(&branch_id, "branch")?;
    guard(&account, &principal, &Permission::REGISTERS_OPERATE, Some(branch_id))?;

    let now = Utc::now();
    let committed = services
        .transact(account.account_id(), |uow| {
            flows::close_session(uow, branch_id, body.session_id, principal.user_id(), body.counted_cash, now)
        })
        .map_err(errors::dispatch_error_to_response)?;

    match committed.events.iter().find_map(session_closed) {
        Some(closed) => Ok(Json(closed).into_response()),
        None => Ok(Json(serde_json::json!({ "events_committed": committed.events.len() })).into_response()),
    }
}

fn session_closed(event: &StoredEvent) -> Option<SessionClosed> {
    if event.aggregate_type != streams::REGISTER {
        return None;
    }
    match serde_json::from_value::<RegisterEvent>(event.payload.clone()) {
        Ok(RegisterEvent::SessionClosed(closed)) => Some(closed),
        _ => None,
    }
}
