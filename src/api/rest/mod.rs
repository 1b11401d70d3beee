use axum::{http::StatusCode, routing::get, Json, Router};
use serde_json::{json, Value};

use crate::services::errors::ServiceError;

pub mod approver_types;
pub mod auth;
pub mod categories;
pub mod health;
pub mod leave_requests;
pub mod levels;
pub mod workflows;

pub type ApiResult = Result<Json<Value>, (StatusCode, Json<Value>)>;

pub fn router() -> Router {
    Router::new()
        .route("/health", get(health::healthcheck))
        .nest("/auth", auth::router())
        .nest("/workflows", workflows::router())
        .nest("/approver-types", approver_types::router())
        .nest("/workflow-categories", categories::router())
        .nest("/workflow-levels", levels::router())
        .nest("/leave-requests", leave_requests::router())
}

pub(crate) fn to_response(err: ServiceError) -> (StatusCode, Json<Value>) {
    let body = match &err {
        ServiceError::Validation(violations) => json!({
            "error": err.to_string(),
            "code": err.code(),
            "violations": violations,
        }),
        _ => json!({ "error": err.to_string(), "code": err.code() }),
    };
    (err.status_code(), Json(body))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_errors_list_violations() {
        let (status, Json(body)) = to_response(ServiceError::Validation(vec![
            "workflow name is required".to_string(),
        ]));

        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["code"], "validation_error");
        assert_eq!(body["violations"][0], "workflow name is required");
    }

    #[test]
    fn conflicts_carry_machine_readable_code() {
        let (status, Json(body)) = to_response(ServiceError::Conflict);

        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["code"], "concurrent_modification");
    }
}
