use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, put},
    Json, Router,
};
use chrono::Utc;

use branchpos_auth::{ChangeRole, Permission, RemoveUser, User, UserCommand};
use branchpos_core::{AggregateId, UserId};
use branchpos_infra::workflows::users::{self as flows, NewUser};

use crate::app::routes::common::{ApiResult, guard, parse_id};
use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::{AccountContext, PrincipalContext};

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_users).post(create_user))
        .route("/:id", get(get_user).delete(remove_user))
        .route("/:id/role", put(change_role))
        .route("/:id/branches", put(assign_branches))
}

fn user_response(user: &User, events: usize) -> axum::response::Response {
    Json(serde_json::json!({
        "id": user.id.to_string(),
        "email": user.email,
        "display_name": user.display_name,
        "role": user.role,
        "branch_ids": user.branch_ids,
        "status": user.status,
        "events_committed": events,
    }))
    .into_response()
}

pub async fn create_user(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(account): Extension<AccountContext>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<dto::CreateUserRequest>,
) -> ApiResult {
    guard(&account, &principal, &Permission::USERS_MANAGE, None)?;

    if services
        .read_models()
        .users
        .get_by_email(account.account_id(), &body.email)
        .is_some()
    {
        return Err(errors::json_error(
            StatusCode::CONFLICT,
            "conflict",
            format!("a user with email '{}' already exists", body.email.trim()),
        ));
    }

    let input = NewUser {
        user_id: UserId::new(),
        email: body.email,
        display_name: body.display_name,
        role: body.role,
        branch_ids: body.branch_ids,
        actor_role: principal.role(),
        occurred_at: Utc::now(),
    };
    let committed = services
        .transact(account.account_id(), |uow| flows::create_user(uow, &input))
        .map_err(errors::dispatch_error_to_response)?;

    Ok((StatusCode::CREATED, user_response(&committed.value, committed.events.len())).into_response())
}

pub async fn list_users(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(account): Extension<AccountContext>,
    Extension(principal): Extension<PrincipalContext>,
) -> ApiResult {
    guard(&account, &principal, &Permission::USERS_READ, None)?;
    Ok(Json(services.read_models().users.list(account.account_id())).into_response())
}

pub async fn get_user(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(account): Extension<AccountContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> ApiResult {
    guard(&account, &principal, &Permission::USERS_READ, None)?;
    let user_id: UserId = parse_id(&id, "user")?;

    match services.read_models().users.get(account.account_id(), &user_id) {
        Some(user) => Ok(Json(user).into_response()),
        None => Err(errors::not_found("user")),
    }
}

pub async fn change_role(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(account): Extension<AccountContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::ChangeRoleRequest>,
) -> ApiResult {
    guard(&account, &principal, &Permission::USERS_MANAGE, None)?;
    let user_id: UserId = parse_id(&id, "user")?;

    let cmd = UserCommand::ChangeRole(ChangeRole {
        account_id: account.account_id(),
        user_id,
        role: body.role,
        actor_role: principal.role(),
        occurred_at: Utc::now(),
    });
    let committed = services
        .dispatch::<User>(account.account_id(), AggregateId::from(user_id), cmd)
        .map_err(errors::dispatch_error_to_response)?;
    Ok(user_response(&committed.value, committed.events.len()))
}

pub async fn assign_branches(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(account): Extension<AccountContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::AssignBranchesRequest>,
) -> ApiResult {
    guard(&account, &principal, &Permission::USERS_MANAGE, None)?;
    let user_id: UserId = parse_id(&id, "user")?;

    let now = Utc::now();
    let committed = services
        .transact(account.account_id(), |uow| {
            flows::assign_branches(uow, user_id, &body.branch_ids, principal.role(), now)
        })
        .map_err(errors::dispatch_error_to_response)?;
    Ok(user_response(&committed.value, committed.events.len()))
}

pub async fn remove_user(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(account): Extension<AccountContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> ApiResult {
    guard(&account, &principal, &Permission::USERS_MANAGE, None)?;
    let user_id: UserId = parse_id(&id, "user")?;

    let cmd = UserCommand::Remove(RemoveUser {
        account_id: account.account_id(),
        user_id,
        actor_id: principal.user_id(),
        actor_role: principal.role(),
        occurred_at: Utc::now(),
    });
    let committed = services
        .dispatch::<User>(account.account_id(), AggregateId::from(user_id), cmd)
        .map_err(errors::dispatch_error_to_response)?;
    Ok(user_response(&committed.value, committed.events.len()))
}
