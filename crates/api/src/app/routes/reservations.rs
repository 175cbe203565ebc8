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
use branchpos_infra::workflows::reservations::{self as flows, CompleteReservation, ReservationRequest};
use branchpos_reservations::{Reservation, ReservationId};
use branchpos_sales::SaleId;

use crate::app::routes::common::{ApiResult, guard, parse_id, visible_branch};
use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::{AccountContext, PrincipalContext};

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_reservation).get(list_reservations))
        .route("/expire", post(expire_overdue))
        .route("/:id", get(get_reservation))
        .route("/:id/complete", post(complete_reservation))
        .route("/:id/cancel", post(cancel_reservation))
}

/// Branch of a reservation, read from its stream.
fn reservation_branch(
    services: &AppServices,
    account: &AccountContext,
    reservation_id: ReservationId,
) -> Result<branchpos_core::BranchId, axum::response::Response> {
    let reservation = services
        .load::<Reservation>(account.account_id(), reservation_id.aggregate_id())
        .map_err(errors::dispatch_error_to_response)?;
    match reservation.branch_id() {
        Some(branch_id) if reservation.is_created() => Ok(branch_id),
        _ => Err(errors::not_found("reservation")),
    }
}

pub async fn create_reservation(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(account): Extension<AccountContext>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<dto::CreateReservationRequest>,
) -> ApiResult {
    guard(&account, &principal, &Permission::RESERVATIONS_CREATE, Some(body.branch_id))?;

    let request = ReservationRequest {
        reservation_id: ReservationId::generate(),
        branch_id: body.branch_id,
        items: body.items,
        customer_name: body.customer_name,
        expiry_date: body.expiry_date,
        created_by: principal.user_id(),
        occurred_at: Utc::now(),
    };
    let committed = services
        .transact(account.account_id(), |uow| flows::create_reservation(uow, &request))
        .map_err(errors::dispatch_error_to_response)?;

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({
            "id": request.reservation_id.to_string(),
            "status": committed.value.status(),
            "expiry_date": request.expiry_date,
            "events_committed": committed.events.len(),
        })),
    )
        .into_response())
}

pub async fn list_reservations(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(account): Extension<AccountContext>,
    Extension(principal): Extension<PrincipalContext>,
    Query(q): Query<dto::ReservationsQuery>,
) -> ApiResult {
    guard(&account, &principal, &Permission::RESERVATIONS_READ, q.branch_id)?;

    let reservations: Vec<_> = services
        .read_models()
        .reservations
        .list(account.account_id(), q.branch_id, q.status)
        .into_iter()
        .filter(|r| visible_branch(&principal, r.branch_id))
        .collect();
    Ok(Json(reservations).into_response())
}

pub async fn get_reservation(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(account): Extension<AccountContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> ApiResult {
    let reservation_id: ReservationId = parse_id(&id, "reservation")?;
    let reservation = services
        .read_models()
        .reservations
        .get(account.account_id(), &reservation_id)
        .ok_or_else(|| errors::not_found("reservation"))?;
    guard(&account, &principal, &Permission::RESERVATIONS_READ, Some(reservation.branch_id))?;
    Ok(Json(reservation).into_response())
}

/// Customer collects: the reservation turns into a sale.
pub async fn complete_reservation(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(account): Extension<AccountContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::CompleteReservationRequest>,
) -> ApiResult {
    let reservation_id: ReservationId = parse_id(&id, "reservation")?;
    let branch_id = reservation_branch(&services, &account, reservation_id)?;
    guard(&account, &principal, &Permission::RESERVATIONS_COMPLETE, Some(branch_id))?;

    let input = CompleteReservation {
        reservation_id,
        sale_id: SaleId::generate(),
        completed_by: principal.user_id(),
        payment_method: body.payment_method,
        occurred_at: Utc::now(),
    };
    let committed = services
        .transact(account.account_id(), |uow| flows::complete_reservation(uow, &input))
        .map_err(errors::dispatch_error_to_response)?;
    let (reservation, sale) = committed.value;

    Ok(Json(serde_json::json!({
        "id": reservation_id.to_string(),
        "status": reservation.status(),
        "sale_id": input.sale_id.to_string(),
        "totals": sale.totals(),
        "events_committed": committed.events.len(),
    }))
    .into_response())
}

pub async fn cancel_reservation(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(account): Extension<AccountContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    body: Option<Json<dto::ReasonRequest>>,
) -> ApiResult {
    let reservation_id: ReservationId = parse_id(&id, "reservation")?;
    let branch_id = reservation_branch(&services, &account, reservation_id)?;
    guard(&account, &principal, &Permission::RESERVATIONS_CANCEL, Some(branch_id))?;

    let reason = body.map(|Json(b)| b.reason).unwrap_or_default();
    let now = Utc::now();
    let committed = services
        .transact(account.account_id(), |uow| {
            flows::cancel_reservation(uow, reservation_id, principal.user_id(), &reason, now)
        })
        .map_err(errors::dispatch_error_to_response)?;

    Ok(Json(serde_json::json!({
        "id": reservation_id.to_string(),
        "status": committed.value.status(),
        "events_committed": committed.events.len(),
    }))
    .into_response())
}

/// Run the expiry sweep for this account now.
pub async fn expire_overdue(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(account): Extension<AccountContext>,
    Extension(principal): Extension<PrincipalContext>,
) -> ApiResult {
    guard(&account, &principal, &Permission::RESERVATIONS_EXPIRE, None)?;

    let svc = Arc::clone(&services);
    let account_id = account.account_id();
    let report = tokio::task::spawn_blocking(move || svc.sweep_reservations(account_id))
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "reservation sweep task failed");
            errors::json_error(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", "reservation sweep failed")
        })?;
    Ok(Json(report).into_response())
}
