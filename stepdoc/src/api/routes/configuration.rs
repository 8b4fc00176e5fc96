//! Global configuration routes: branding settings and intro/outro assets.

use axum::extract::{Multipart, Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use uuid::Uuid;

use crate::api::error::{ApiError, ApiResult};
use crate::api::models::ConfigurationUpdateRequest;
use crate::api::server::AppState;
use crate::database::models::GlobalConfigDbModel;
use crate::database::repositories::AssetKind;

/// Create the configuration router. Nested under `/configuration`.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(get_configuration).put(update_configuration))
        .route("/assets/{kind}", post(upload_asset))
}

async fn get_configuration(State(state): State<AppState>) -> ApiResult<Json<GlobalConfigDbModel>> {
    Ok(Json(state.configuration.get_or_create().await.map_err(ApiError::from)?))
}

async fn update_configuration(
    State(state): State<AppState>,
    Json(payload): Json<ConfigurationUpdateRequest>,
) -> ApiResult<Json<GlobalConfigDbModel>> {
    let mut config = state.configuration.get_or_create().await.map_err(ApiError::from)?;

    if let Some(color) = payload.primary_color {
        config.primary_color = color;
    }
    if let Some(color) = payload.secondary_color {
        config.secondary_color = color;
    }
    if let Some(intensity) = payload.blur_intensity {
        config.blur_intensity = intensity;
    }
    if let Some(style) = payload.mask_style {
        config.mask_style = style;
    }
    if let Some(enabled) = payload.privacy_default_enabled {
        config.privacy_default_enabled = enabled;
    }
    if let Some(tooltips) = payload.tooltips {
        if !tooltips.is_object() {
            return Err(ApiError::validation("tooltips must be a JSON object"));
        }
        config.tooltips = tooltips.to_string();
    }

    Ok(Json(state.configuration.update(&config).await.map_err(ApiError::from)?))
}

async fn upload_asset(
    State(state): State<AppState>,
    Path(kind): Path<String>,
    mut multipart: Multipart,
) -> ApiResult<Json<GlobalConfigDbModel>> {
    let kind = AssetKind::parse(&kind)
        .ok_or_else(|| ApiError::validation("asset kind must be intro, outro or logo"))?;

    let mut file = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Malformed multipart body: {e}")))?
    {
        if field.name() == Some("file") {
            let file_name = field
                .file_name()
                .map(str::to_string)
                .ok_or_else(|| ApiError::validation("file part needs a filename"))?;
            let content_type = field
                .content_type()
                .map(str::to_string)
                .unwrap_or_else(|| "application/octet-stream".to_string());
            let data = field
                .bytes()
                .await
                .map_err(|e| ApiError::bad_request(format!("Failed to read file: {e}")))?;
            file = Some((file_name, content_type, data));
        }
    }
    let (file_name, content_type, data) =
        file.ok_or_else(|| ApiError::validation("missing file part"))?;
    if data.is_empty() {
        return Err(ApiError::validation("uploaded file is empty"));
    }

    let extension = file_name.rsplit('.').next().unwrap_or("bin");
    let key = format!("assets/{}_{}.{}", kind.as_str(), Uuid::new_v4(), extension);
    state
        .store
        .put(&key, data, &content_type)
        .await
        .map_err(ApiError::from)?;
    state
        .configuration
        .set_asset_key(kind, &key)
        .await
        .map_err(ApiError::from)?;

    Ok(Json(state.configuration.get_or_create().await.map_err(ApiError::from)?))
}
