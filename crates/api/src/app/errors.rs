use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use branchpos_auth::AuthzError;
use branchpos_infra::command_dispatcher::DispatchError;

pub fn dispatch_error_to_response(err: DispatchError) -> axum::response::Response {
    match err {
        DispatchError::Concurrency(msg) => json_error(StatusCode::CONFLICT, "conflict", msg),
        DispatchError::Conflict(msg) => json_error(StatusCode::CONFLICT, "conflict", msg),
        DispatchError::InsufficientStock(msg) => json_error(StatusCode::CONFLICT, "insufficient_stock", msg),
        DispatchError::Validation(msg) => json_error(StatusCode::BAD_REQUEST, "validation_error", msg),
        DispatchError::InvariantViolation(msg) => {
            json_error(StatusCode::UNPROCESSABLE_ENTITY, "invariant_violation", msg)
        }
        DispatchError::Unauthorized => json_error(StatusCode::FORBIDDEN, "forbidden", "not allowed for this role"),
        DispatchError::NotFound => json_error(StatusCode::NOT_FOUND, "not_found", "not found"),
        DispatchError::Deserialize(msg) => {
            tracing::error!(error = %msg, "stored event could not be read back");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "deserialize_error", msg)
        }
        DispatchError::Store(e) => {
            tracing::error!(error = %e, "event store failure");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "store_error", e.to_string())
        }
        DispatchError::Publish(msg) => json_error(StatusCode::BAD_GATEWAY, "publish_error", msg),
        DispatchError::AccountIsolation(msg) => json_error(StatusCode::FORBIDDEN, "account_isolation", msg),
    }
}

pub fn authz_error_to_response(err: AuthzError) -> axum::response::Response {
    json_error(StatusCode::FORBIDDEN, "forbidden", err.to_string())
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

pub fn not_found(what: &str) -> axum::response::Response {
    json_error(StatusCode::NOT_FOUND, "not_found", format!("{what} not found"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stock_and_conflicts_map_to_409() {
        let res = dispatch_error_to_response(DispatchError::InsufficientStock("only 2 available".into()));
        assert_eq!(res.status(), StatusCode::CONFLICT);

        let res = dispatch_error_to_response(DispatchError::Conflict("session already open".into()));
        assert_eq!(res.status(), StatusCode::CONFLICT);

        let res = dispatch_error_to_response(DispatchError::Concurrency("lost race".into()));
        assert_eq!(res.status(), StatusCode::CONFLICT);
    }

    #[test]
    fn domain_rejections_keep_their_classes() {
        assert_eq!(
            dispatch_error_to_response(DispatchError::Validation("empty".into())).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            dispatch_error_to_response(DispatchError::InvariantViolation("closed".into())).status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            dispatch_error_to_response(DispatchError::Unauthorized).status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            dispatch_error_to_response(DispatchError::NotFound).status(),
            StatusCode::NOT_FOUND
        );
    }
}
