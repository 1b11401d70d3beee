use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    routing::{get, post, put},
    Json, Router,
};
use serde_json::json;
use uuid::Uuid;

use crate::{
    infrastructure::{auth::AuthenticatedUser, state::AppState},
    services::approver_types::{ApproverTypeInput, ApproverTypeService},
};

use super::{to_response, workflows::ListQuery, ApiResult};

pub fn router() -> Router {
    Router::new()
        .route("/", get(list).post(create))
        .route("/:id", put(update).delete(delete))
        .route("/:id/deactivate", post(deactivate))
}

async fn list(
    Extension(state): Extension<Arc<AppState>>,
    _user: AuthenticatedUser,
    Query(query): Query<ListQuery>,
) -> ApiResult {
    let approver_types = ApproverTypeService::new(state)
        .list(query.include_inactive)
        .await
        .map_err(to_response)?;
    Ok(Json(json!({ "approverTypes": approver_types })))
}

async fn create(
    Extension(state): Extension<Arc<AppState>>,
    user: AuthenticatedUser,
    Json(payload): Json<ApproverTypeInput>,
) -> ApiResult {
    let approver_type = ApproverTypeService::new(state)
        .create(&user, payload)
        .await
        .map_err(to_response)?;
    Ok(Json(json!({ "approverType": approver_type })))
}

async fn update(
    Extension(state): Extension<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<ApproverTypeInput>,
) -> ApiResult {
    let approver_type = ApproverTypeService::new(state)
        .update(&user, id, payload)
        .await
        .map_err(to_response)?;
    Ok(Json(json!({ "approverType": approver_type })))
}

async fn deactivate(
    Extension(state): Extension<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> ApiResult {
    let approver_type = ApproverTypeService::new(state)
        .deactivate(&user, id)
        .await
        .map_err(to_response)?;
    Ok(Json(json!({ "approverType": approver_type })))
}

async fn delete(
    Extension(state): Extension<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> ApiResult {
    ApproverTypeService::new(state)
        .delete(&user, id)
        .await
        .map_err(to_response)?;
    Ok(Json(json!({ "deleted": id })))
}
