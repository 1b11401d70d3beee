use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::{
    infrastructure::{auth::AuthenticatedUser, state::AppState},
    services::levels::{LevelInput, LevelService},
};

use super::{to_response, ApiResult};

pub fn router() -> Router {
    Router::new()
        .route("/", get(list).post(create))
        .route("/:id", put(update))
        .route("/reset", post(reset))
        .route("/defaults", get(defaults))
}

#[derive(Debug, Deserialize)]
struct DefaultsQuery {
    steps: usize,
}

async fn list(Extension(state): Extension<Arc<AppState>>, _user: AuthenticatedUser) -> ApiResult {
    let levels = LevelService::new(state).list().await.map_err(to_response)?;
    Ok(Json(json!({ "levels": levels })))
}

async fn create(
    Extension(state): Extension<Arc<AppState>>,
    user: AuthenticatedUser,
    Json(payload): Json<LevelInput>,
) -> ApiResult {
    let level = LevelService::new(state)
        .create(&user, payload)
        .await
        .map_err(to_response)?;
    Ok(Json(json!({ "level": level })))
}

async fn update(
    Extension(state): Extension<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<LevelInput>,
) -> ApiResult {
    let level = LevelService::new(state)
        .update(&user, id, payload)
        .await
        .map_err(to_response)?;
    Ok(Json(json!({ "level": level })))
}

async fn reset(Extension(state): Extension<Arc<AppState>>, user: AuthenticatedUser) -> ApiResult {
    let levels = LevelService::new(state)
        .reset(&user)
        .await
        .map_err(to_response)?;
    Ok(Json(json!({ "levels": levels })))
}

async fn defaults(
    Extension(state): Extension<Arc<AppState>>,
    _user: AuthenticatedUser,
    Query(query): Query<DefaultsQuery>,
) -> ApiResult {
    let steps = LevelService::new(state)
        .defaults(query.steps)
        .await
        .map_err(to_response)?;
    Ok(Json(json!({ "approvalLevels": steps })))
}
