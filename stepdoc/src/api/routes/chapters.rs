//! Chapter routes: listing, detail, human edits, pipeline actions.

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};

use crate::api::error::{ApiError, ApiResult};
use crate::api::models::{
    ChapterResponse, ChapterUpdateRequest, FeedbackRequest, OkResponse, RegenerateRequest,
    RegenerateResponse, ReprocessRequest,
};
use crate::api::server::AppState;
use crate::database::models::{AuditLogDbModel, ChapterContextRow, ChapterStatus, FeedbackDbModel};
use crate::domain::StructuredContent;
use crate::storage::DEFAULT_URL_TTL;

/// Create the chapters router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/chapters", get(list_chapters))
        .route(
            "/chapters/{id}",
            get(get_chapter).put(update_chapter).delete(delete_chapter),
        )
        .route("/chapters/{id}/reprocess", post(reprocess_chapter))
        .route("/chapters/{id}/cancel", post(cancel_chapter))
        .route("/chapters/{id}/publish", post(publish_chapter))
        .route("/chapters/{id}/regenerate_audio", post(regenerate_audio))
        .route("/chapters/{id}/feedback", post(record_feedback))
}

/// Rewrite stored audio keys into proxy paths a browser can fetch.
fn proxy_audio_urls(content: &mut serde_json::Value) {
    let Some(steps) = content.get_mut("steps").and_then(|s| s.as_array_mut()) else {
        return;
    };
    for step in steps {
        if let Some(key) = step.get("audio_url").and_then(|u| u.as_str()) {
            let proxied = format!("/api/v1/stream?path={key}");
            step["audio_url"] = serde_json::Value::String(proxied);
        }
    }
}

async fn to_response(
    state: &AppState,
    row: ChapterContextRow,
    include_content: bool,
) -> ChapterResponse {
    // A presign failure should not take down the listing; fall back to the
    // raw key and let the client decide.
    let video_url = match state.store.presigned_url(&row.video_key, DEFAULT_URL_TTL).await {
        Ok(url) => url,
        Err(err) => {
            tracing::warn!(video_key = %row.video_key, error = %err, "Could not presign video URL");
            row.video_key.clone()
        }
    };

    let content = if include_content {
        row.content.as_deref().map(|raw| {
            match serde_json::from_str::<serde_json::Value>(raw) {
                Ok(mut value) => {
                    proxy_audio_urls(&mut value);
                    value
                }
                Err(_) => serde_json::Value::String(raw.to_string()),
            }
        })
    } else {
        None
    };

    ChapterResponse {
        id: row.id,
        title: row.title,
        video_url,
        status: row.status,
        created_at: row.created_at,
        system_name: row.system_name,
        module_name: row.module_name,
        content,
    }
}

async fn list_chapters(State(state): State<AppState>) -> ApiResult<Json<Vec<ChapterResponse>>> {
    let rows = state.chapters.list_with_context().await.map_err(ApiError::from)?;
    let mut response = Vec::with_capacity(rows.len());
    for row in rows {
        response.push(to_response(&state, row, false).await);
    }
    Ok(Json(response))
}

async fn get_chapter(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<ChapterResponse>> {
    let row = state.chapters.get_with_context(id).await.map_err(ApiError::from)?;

    let log = AuditLogDbModel::action("VIEW_MANUAL", "Chapter", id);
    if let Err(err) = state.observability.record_audit(&log).await {
        tracing::warn!(chapter_id = id, error = %err, "Failed to record view audit");
    }

    Ok(Json(to_response(&state, row, true).await))
}

async fn update_chapter(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(payload): Json<ChapterUpdateRequest>,
) -> ApiResult<Json<OkResponse>> {
    let chapter = state.chapters.get(id).await.map_err(ApiError::from)?;
    if chapter.status().is_some_and(|s| s.is_busy()) {
        return Err(ApiError::conflict(format!(
            "Cannot edit chapter while status is {}",
            chapter.status
        )));
    }

    let content = match &payload.content {
        Some(value) => {
            // Reject shapes the viewer cannot render.
            serde_json::from_value::<StructuredContent>(value.clone())
                .map_err(|e| ApiError::validation(format!("Invalid structured content: {e}")))?;
            Some(value.to_string())
        }
        None => None,
    };

    state
        .chapters
        .update_editables(id, payload.title.as_deref(), content.as_deref())
        .await
        .map_err(ApiError::from)?;
    Ok(Json(OkResponse::new()))
}

async fn delete_chapter(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<OkResponse>> {
    state.chapters.delete(id).await.map_err(ApiError::from)?;
    Ok(Json(OkResponse::new()))
}

async fn reprocess_chapter(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    payload: Option<Json<ReprocessRequest>>,
) -> ApiResult<Json<OkResponse>> {
    let goal = payload.map(|Json(p)| p.goal).unwrap_or_default();
    state
        .orchestrator
        .reprocess(id, &goal)
        .await
        .map_err(ApiError::from)?;
    Ok(Json(OkResponse::new()))
}

async fn cancel_chapter(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<OkResponse>> {
    state.orchestrator.cancel(id).await.map_err(ApiError::from)?;
    Ok(Json(OkResponse::new()))
}

async fn publish_chapter(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<serde_json::Value>> {
    state.orchestrator.publish(id).await.map_err(ApiError::from)?;
    let chapter = state.chapters.get(id).await.map_err(ApiError::from)?;
    Ok(Json(serde_json::json!({
        "ok": true,
        "status": chapter.status,
        "stitching": chapter.status == ChapterStatus::Publishing.as_str(),
    })))
}

async fn regenerate_audio(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(payload): Json<RegenerateRequest>,
) -> ApiResult<Json<RegenerateResponse>> {
    let content = state
        .orchestrator
        .regenerate_step_audio(id, payload.step_index, &payload.text)
        .await
        .map_err(ApiError::from)?;

    let step = content
        .steps
        .get(payload.step_index)
        .ok_or_else(|| ApiError::internal("regenerated step vanished"))?;
    let audio_key = step
        .audio_url
        .as_deref()
        .ok_or_else(|| ApiError::internal("regenerated step has no audio"))?;

    Ok(Json(RegenerateResponse {
        audio_url: format!("/api/v1/stream?path={audio_key}"),
        duration: step.duration.unwrap_or(0.0),
    }))
}

async fn record_feedback(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(payload): Json<FeedbackRequest>,
) -> ApiResult<Json<OkResponse>> {
    // 404 for unknown chapters instead of a dangling FK error.
    state.chapters.get(id).await.map_err(ApiError::from)?;

    let feedback = FeedbackDbModel {
        id: 0,
        chapter_id: id,
        is_positive: payload.is_positive,
        comment: payload.comment,
        created_at: chrono::Utc::now().to_rfc3339(),
    };
    state
        .observability
        .record_feedback(&feedback)
        .await
        .map_err(ApiError::from)?;
    Ok(Json(OkResponse::new()))
}
