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
    infrastructure::{auth::AuthenticatedUser, state::AppState},
    services::workflows::{WorkflowInput, WorkflowService},
};

use super::{to_response, ApiResult};

pub fn router() -> Router {
    Router::new()
        .route("/", get(list).post(create))
        .route("/resolve", get(resolve))
        .route("/:id", get(get_workflow).put(update))
        .route("/:id/deactivate", post(deactivate))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResolveQuery {
    duration_days: f64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ListQuery {
    #[serde(default)]
    pub(crate) include_inactive: bool,
}

async fn resolve(
    Extension(state): Extension<Arc<AppState>>,
    _user: AuthenticatedUser,
    Query(query): Query<ResolveQuery>,
) -> ApiResult {
    let resolved = WorkflowService::new(state)
        .resolve(query.duration_days)
        .await
        .map_err(to_response)?;
    Ok(Json(json!(resolved)))
}

async fn list(
    Extension(state): Extension<Arc<AppState>>,
    _user: AuthenticatedUser,
    Query(query): Query<ListQuery>,
) -> ApiResult {
    let workflows = WorkflowService::new(state)
        .list(query.include_inactive)
        .await
        .map_err(to_response)?;
    Ok(Json(json!({ "workflows": workflows })))
}

async fn get_workflow(
    Extension(state): Extension<Arc<AppState>>,
    _user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> ApiResult {
    let workflow = WorkflowService::new(state)
        .get(id)
        .await
        .map_err(to_response)?;
    Ok(Json(json!({ "workflow": workflow })))
}

async fn create(
    Extension(state): Extension<Arc<AppState>>,
    user: AuthenticatedUser,
    Json(payload): Json<WorkflowInput>,
) -> ApiResult {
    let workflow = WorkflowService::new(state)
        .create(&user, payload)
        .await
        .map_err(to_response)?;
    Ok(Json(json!({ "workflow": workflow })))
}

async fn update(
    Extension(state): Extension<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<WorkflowInput>,
) -> ApiResult {
    let workflow = WorkflowService::new(state)
        .update(&user, id, payload)
        .await
        .map_err(to_response)?;
    Ok(Json(json!({ "workflow": workflow })))
}

async fn deactivate(
    Extension(state): Extension<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> ApiResult {
    let workflow = WorkflowService::new(state)
        .deactivate(&user, id)
        .await
        .map_err(to_response)?;
    Ok(Json(json!({ "workflow": workflow })))
}
