//! Video upload route.
//!
//! One upload creates one Collection with one Chapter (1 video = 1 manual)
//! and enqueues the processing job before the response goes out.

use axum::extract::{Multipart, State};
use axum::routing::post;
use axum::{Json, Router};
use bytes::Bytes;
use tracing::{info, warn};
use uuid::Uuid;

use crate::api::error::{ApiError, ApiResult};
use crate::api::models::UploadResponse;
use crate::api::server::AppState;
use crate::database::models::{ChapterDbModel, CollectionDbModel};
use crate::pipeline::{JobKind, PipelineJob};

/// Create the upload router.
pub fn router() -> Router<AppState> {
    Router::new().route("/upload", post(upload_video))
}

struct UploadForm {
    file_name: String,
    content_type: String,
    data: Bytes,
    title: String,
    module_id: i64,
    goal: String,
}

async fn parse_form(mut multipart: Multipart) -> ApiResult<UploadForm> {
    let mut file: Option<(String, String, Bytes)> = None;
    let mut title: Option<String> = None;
    let mut module_id: Option<i64> = None;
    let mut goal = String::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Malformed multipart body: {e}")))?
    {
        match field.name() {
            Some("file") => {
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
            Some("title") => {
                title = Some(
                    field
                        .text()
                        .await
                        .map_err(|e| ApiError::bad_request(format!("Invalid title field: {e}")))?,
                );
            }
            Some("module_id") => {
                let raw = field
                    .text()
                    .await
                    .map_err(|e| ApiError::bad_request(format!("Invalid module_id field: {e}")))?;
                module_id = Some(
                    raw.trim()
                        .parse()
                        .map_err(|_| ApiError::validation("module_id must be an integer"))?,
                );
            }
            Some("goal") => {
                goal = field
                    .text()
                    .await
                    .map_err(|e| ApiError::bad_request(format!("Invalid goal field: {e}")))?;
            }
            _ => {}
        }
    }

    let (file_name, content_type, data) =
        file.ok_or_else(|| ApiError::validation("missing file part"))?;
    Ok(UploadForm {
        file_name,
        content_type,
        data,
        title: title.ok_or_else(|| ApiError::validation("missing title field"))?,
        module_id: module_id.ok_or_else(|| ApiError::validation("missing module_id field"))?,
        goal,
    })
}

async fn upload_video(
    State(state): State<AppState>,
    multipart: Multipart,
) -> ApiResult<Json<UploadResponse>> {
    let form = parse_form(multipart).await?;

    if !form.file_name.ends_with(".webm") && !form.file_name.ends_with(".mp4") {
        return Err(ApiError::validation(
            "only .webm or .mp4 files are accepted",
        ));
    }
    if form.data.is_empty() {
        return Err(ApiError::validation("uploaded file is empty"));
    }

    // Reject dangling module references before touching the store.
    state
        .hierarchy
        .get_module(form.module_id)
        .await
        .map_err(ApiError::from)?;

    // Unique key so re-uploads of the same recording never collide.
    let video_key = format!("videos/{}_{}", Uuid::new_v4(), form.file_name);
    state
        .store
        .put(&video_key, form.data, &form.content_type)
        .await
        .map_err(ApiError::from)?;

    let collection = CollectionDbModel::new(
        form.module_id,
        &form.title,
        format!("Manual gerado automaticamente a partir do vídeo '{}'", form.title),
    );
    let chapter = ChapterDbModel::new(0, &form.title, &video_key);
    let (collection_id, chapter_id) = state
        .chapters
        .create_with_collection(&collection, &chapter)
        .await
        .map_err(ApiError::from)?;

    if !state.queue.enqueue(PipelineJob {
        chapter_id,
        generation: 0,
        kind: JobKind::Process { goal: form.goal },
    }) {
        // The chapter stays PENDING; a later reprocess picks it up.
        warn!(chapter_id, "Processing job not enqueued, chapter left pending");
    }

    info!(chapter_id, collection_id, video_key, "Upload accepted");
    Ok(Json(UploadResponse {
        status: "success".to_string(),
        chapter_id,
        collection_id,
        video_key,
        message: "Upload recebido! Manual criado e processamento iniciado.".to_string(),
    }))
}
