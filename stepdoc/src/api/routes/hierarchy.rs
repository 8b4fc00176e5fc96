//! Hierarchy routes: systems and their modules.

use axum::extract::{Path, State};
use axum::routing::{get, put};
use axum::{Json, Router};

use crate::api::error::{ApiError, ApiResult};
use crate::api::models::{HierarchyNodeRequest, OkResponse};
use crate::api::server::AppState;
use crate::database::models::{ModuleDbModel, SystemDbModel};

/// Create the hierarchy router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/systems", get(list_systems).post(create_system))
        .route(
            "/systems/{id}",
            put(update_system).delete(delete_system),
        )
        .route(
            "/systems/{id}/modules",
            get(list_modules).post(create_module),
        )
        .route(
            "/modules/{id}",
            put(update_module).delete(delete_module),
        )
}

async fn list_systems(State(state): State<AppState>) -> ApiResult<Json<Vec<SystemDbModel>>> {
    Ok(Json(state.hierarchy.list_systems().await.map_err(ApiError::from)?))
}

async fn create_system(
    State(state): State<AppState>,
    Json(payload): Json<HierarchyNodeRequest>,
) -> ApiResult<Json<SystemDbModel>> {
    let name = required_name(payload.name)?;
    let system = SystemDbModel {
        id: 0,
        name,
        context_prompt: payload.context_prompt,
    };
    let id = state.hierarchy.create_system(&system).await.map_err(ApiError::from)?;
    Ok(Json(state.hierarchy.get_system(id).await.map_err(ApiError::from)?))
}

async fn update_system(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(payload): Json<HierarchyNodeRequest>,
) -> ApiResult<Json<SystemDbModel>> {
    state
        .hierarchy
        .update_system(id, payload.name.as_deref(), payload.context_prompt.as_deref())
        .await
        .map_err(ApiError::from)?;
    Ok(Json(state.hierarchy.get_system(id).await.map_err(ApiError::from)?))
}

async fn delete_system(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<OkResponse>> {
    state.hierarchy.delete_system(id).await.map_err(ApiError::from)?;
    Ok(Json(OkResponse::new()))
}

async fn list_modules(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Vec<ModuleDbModel>>> {
    // 404 for unknown systems rather than an empty list.
    state.hierarchy.get_system(id).await.map_err(ApiError::from)?;
    Ok(Json(state.hierarchy.list_modules(id).await.map_err(ApiError::from)?))
}

async fn create_module(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(payload): Json<HierarchyNodeRequest>,
) -> ApiResult<Json<ModuleDbModel>> {
    let name = required_name(payload.name)?;
    let module = ModuleDbModel {
        id: 0,
        system_id: id,
        name,
        context_prompt: payload.context_prompt,
    };
    let module_id = state.hierarchy.create_module(&module).await.map_err(ApiError::from)?;
    Ok(Json(state.hierarchy.get_module(module_id).await.map_err(ApiError::from)?))
}

async fn update_module(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(payload): Json<HierarchyNodeRequest>,
) -> ApiResult<Json<ModuleDbModel>> {
    state
        .hierarchy
        .update_module(id, payload.name.as_deref(), payload.context_prompt.as_deref())
        .await
        .map_err(ApiError::from)?;
    Ok(Json(state.hierarchy.get_module(id).await.map_err(ApiError::from)?))
}

async fn delete_module(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<OkResponse>> {
    state.hierarchy.delete_module(id).await.map_err(ApiError::from)?;
    Ok(Json(OkResponse::new()))
}

fn required_name(name: Option<String>) -> ApiResult<String> {
    match name {
        Some(name) if !name.trim().is_empty() => Ok(name),
        _ => Err(ApiError::validation("name is required")),
    }
}
