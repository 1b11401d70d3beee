use std::sync::Arc;

use axum::{extract::Extension, http::StatusCode, routing::post, Json, Router};
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use uuid::Uuid;

use crate::{
    domain::models::Role,
    infrastructure::{auth::issue_token, state::AppState},
};

use super::to_response;

pub fn router() -> Router {
    Router::new().route("/login", post(login))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginRequest {
    employee_id: Uuid,
    credential: String,
}

#[derive(Debug, Serialize)]
struct LoginResponse {
    token: String,
    role: Role,
}

async fn login(
    Extension(state): Extension<Arc<AppState>>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, (StatusCode, Json<serde_json::Value>)> {
    let expected = state.config.auth.developer_credential.as_bytes();
    if expected.is_empty() || !bool::from(payload.credential.as_bytes().ct_eq(expected)) {
        return Err(unauthorized());
    }

    let actor = state
        .store
        .get_actor(payload.employee_id)
        .await
        .map_err(|err| to_response(err.into()))?;

    let Some(actor) = actor.filter(|actor| actor.is_active) else {
        return Err(unauthorized());
    };

    let token = issue_token(&state, &actor).map_err(to_response)?;

    Ok(Json(LoginResponse {
        token,
        role: actor.role,
    }))
}

fn unauthorized() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::UNAUTHORIZED,
        Json(serde_json::json!({ "error": "invalid_credentials" })),
    )
}
