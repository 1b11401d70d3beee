use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    routing::{get, post, put},
    Json, Router,
};
use serde_json::json;
use uuid::Uuid;

use crate::{
    infrastructure::{auth::AuthenticatedUser, state::AppState},
    services::categories::{CategoryInput, CategoryService},
};

use super::{to_response, ApiResult};

pub fn router() -> Router {
    Router::new()
        .route("/", get(list).post(create))
        .route("/:id", put(update))
        .route("/:id/deactivate", post(deactivate))
}

async fn list(Extension(state): Extension<Arc<AppState>>, _user: AuthenticatedUser) -> ApiResult {
    let categories = CategoryService::new(state)
        .list()
        .await
        .map_err(to_response)?;
    Ok(Json(json!({ "categories": categories })))
}

async fn create(
    Extension(state): Extension<Arc<AppState>>,
    user: AuthenticatedUser,
    Json(payload): Json<CategoryInput>,
) -> ApiResult {
    let category = CategoryService::new(state)
        .create(&user, payload)
        .await
        .map_err(to_response)?;
    Ok(Json(json!({ "category": category })))
}

async fn update(
    Extension(state): Extension<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<CategoryInput>,
) -> ApiResult {
    let category = CategoryService::new(state)
        .update(&user, id, payload)
        .await
        .map_err(to_response)?;
    Ok(Json(json!({ "category": category })))
}

async fn deactivate(
    Extension(state): Extension<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> ApiResult {
    let category = CategoryService::new(state)
        .deactivate(&user, id)
        .await
        .map_err(to_response)?;
    Ok(Json(json!({ "category": category })))
}
