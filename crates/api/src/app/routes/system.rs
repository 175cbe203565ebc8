use std::sync::Arc;

use axum::{
    extract::{Extension, Query},
    http::StatusCode,
    response::{sse::Event as SseEvent, IntoResponse},
    Json,
};

use branchpos_auth::{Permission, explain_authorization, policy_table};

use crate::app::dto;
use crate::app::services::{self, AppServices};
use crate::context::{AccountContext, PrincipalContext};

pub async fn health() -> StatusCode {
    StatusCode::OK
}

pub async fn whoami(
    Extension(account): Extension<AccountContext>,
    Extension(principal): Extension<PrincipalContext>,
) -> impl IntoResponse {
    Json(serde_json::json!({
        "account_id": account.account_id().to_string(),
        "user_id": principal.user_id().to_string(),
        "role": principal.role().as_str(),
        "branch_ids": principal.branch_ids(),
        "max_discount_bps": principal.discount_limit_bps(),
    }))
}

/// Declarative role policy, for UI gating. The server still checks every command.
pub async fn policy() -> impl IntoResponse {
    Json(policy_table())
}

/// Why the caller would (or would not) be allowed `permission`.
pub async fn explain(
    Extension(principal): Extension<PrincipalContext>,
    Query(query): Query<dto::ExplainQuery>,
) -> impl IntoResponse {
    let permission = Permission::new(query.permission);
    Json(explain_authorization(principal.principal(), &permission, query.branch_id))
}

pub async fn stream(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(account): Extension<AccountContext>,
) -> axum::response::Sse<impl tokio_stream::Stream<Item = Result<SseEvent, std::convert::Infallible>>> {
    services::account_sse_stream(services, account.account_id())
}
