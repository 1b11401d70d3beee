use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::{
    domain::models::ApprovalAction,
    infrastructure::{auth::AuthenticatedUser, state::AppState},
    services::approvals::{
        ApprovalService, DecisionRequest, DeletionDecisionRequest, NewLeaveRequest,
    },
};

use super::{to_response, ApiResult};

pub fn router() -> Router {
    Router::new()
        .route("/:id", get(get_request))
        .route("/:id/submit", post(submit))
        .route("/:id/decision", post(decide))
        .route("/:id/cancel", post(cancel))
        .route("/:id/deletion", post(request_deletion))
        .route("/:id/deletion/decision", post(decide_deletion))
        .route("/:id/can-act", get(can_act))
}

#[derive(Debug, Deserialize)]
struct CanActQuery {
    action: ApprovalAction,
}

async fn get_request(
    Extension(state): Extension<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> ApiResult {
    let request = ApprovalService::new(state)
        .get(&user, id)
        .await
        .map_err(to_response)?;
    Ok(Json(json!({ "leaveRequest": request })))
}

async fn submit(
    Extension(state): Extension<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    payload: Option<Json<NewLeaveRequest>>,
) -> ApiResult {
    let request = ApprovalService::new(state)
        .submit_for_approval(&user, id, payload.map(|Json(body)| body))
        .await
        .map_err(to_response)?;
    Ok(Json(json!({ "leaveRequest": request })))
}

async fn decide(
    Extension(state): Extension<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<DecisionRequest>,
) -> ApiResult {
    let request = ApprovalService::new(state)
        .decide(&user, id, payload)
        .await
        .map_err(to_response)?;
    Ok(Json(json!({ "leaveRequest": request })))
}

async fn cancel(
    Extension(state): Extension<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> ApiResult {
    let request = ApprovalService::new(state)
        .cancel(&user, id)
        .await
        .map_err(to_response)?;
    Ok(Json(json!({ "leaveRequest": request })))
}

async fn request_deletion(
    Extension(state): Extension<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> ApiResult {
    let request = ApprovalService::new(state)
        .request_deletion(&user, id)
        .await
        .map_err(to_response)?;
    Ok(Json(json!({ "leaveRequest": request })))
}

async fn decide_deletion(
    Extension(state): Extension<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<DeletionDecisionRequest>,
) -> ApiResult {
    let request = ApprovalService::new(state)
        .decide_deletion(&user, id, payload)
        .await
        .map_err(to_response)?;
    Ok(Json(json!({ "leaveRequest": request })))
}

async fn can_act(
    Extension(state): Extension<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Query(query): Query<CanActQuery>,
) -> ApiResult {
    let answer = ApprovalService::new(state)
        .can_act(&user, id, query.action)
        .await
        .map_err(to_response)?;
    Ok(Json(json!(answer)))
}
