//! Artifact streaming proxy.
//!
//! Serves artifact-store bytes through the API so browsers never talk to the
//! object store directly (avoids CORS and docker-vs-localhost hostname
//! mismatches, and is the only read path for the local filesystem backend).

use axum::Router;
use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::{HeaderValue, header};
use axum::response::Response;
use axum::routing::get;
use serde::Deserialize;

use crate::api::error::{ApiError, ApiResult};
use crate::api::server::AppState;

/// Create the stream proxy router.
pub fn router() -> Router<AppState> {
    Router::new().route("/stream", get(stream_artifact))
}

#[derive(Debug, Deserialize)]
struct StreamQuery {
    path: String,
}

fn content_type_for(key: &str) -> &'static str {
    match key.rsplit('.').next() {
        Some("mp3") => "audio/mpeg",
        Some("mp4") => "video/mp4",
        Some("webm") => "video/webm",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        _ => "application/octet-stream",
    }
}

async fn stream_artifact(
    State(state): State<AppState>,
    Query(query): Query<StreamQuery>,
) -> ApiResult<Response> {
    let key = query.path.trim();
    if key.is_empty() {
        return Err(ApiError::validation("path query parameter is required"));
    }

    let stream = state.store.get_stream(key).await.map_err(ApiError::from)?;

    let mut response = Response::new(Body::from_stream(stream));
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(content_type_for(key)),
    );
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_types_by_extension() {
        assert_eq!(content_type_for("audio/a.mp3"), "audio/mpeg");
        assert_eq!(content_type_for("videos/v.webm"), "video/webm");
        assert_eq!(content_type_for("stitched/final_v.mp4"), "video/mp4");
        assert_eq!(content_type_for("weird"), "application/octet-stream");
    }
}
