//! API request/response models.

use serde::{Deserialize, Serialize};

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
}

/// Upload acknowledgement.
#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub status: String,
    pub chapter_id: i64,
    pub collection_id: i64,
    pub video_key: String,
    pub message: String,
}

/// Chapter with flattened hierarchy context.
#[derive(Debug, Serialize)]
pub struct ChapterResponse {
    pub id: i64,
    pub title: String,
    /// Browser-fetchable URL (presigned or proxy path).
    pub video_url: String,
    pub status: String,
    pub created_at: String,
    pub system_name: Option<String>,
    pub module_name: Option<String>,
    /// Parsed content: structured manual, failure report, or null.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<serde_json::Value>,
}

/// Human edit of title/content.
#[derive(Debug, Deserialize)]
pub struct ChapterUpdateRequest {
    pub title: Option<String>,
    /// Full replacement structured content.
    pub content: Option<serde_json::Value>,
}

/// Pipeline action body (reprocess).
#[derive(Debug, Default, Deserialize)]
pub struct ReprocessRequest {
    #[serde(default)]
    pub goal: String,
}

/// Step audio regeneration request.
#[derive(Debug, Deserialize)]
pub struct RegenerateRequest {
    pub step_index: usize,
    pub text: String,
}

/// Step audio regeneration result.
#[derive(Debug, Serialize)]
pub struct RegenerateResponse {
    pub audio_url: String,
    pub duration: f64,
}

/// Reader feedback on a manual.
#[derive(Debug, Deserialize)]
pub struct FeedbackRequest {
    pub is_positive: bool,
    pub comment: Option<String>,
}

/// System/module create-or-update payload.
#[derive(Debug, Deserialize)]
pub struct HierarchyNodeRequest {
    pub name: Option<String>,
    pub context_prompt: Option<String>,
}

/// Editable global configuration fields.
#[derive(Debug, Deserialize)]
pub struct ConfigurationUpdateRequest {
    pub primary_color: Option<String>,
    pub secondary_color: Option<String>,
    pub blur_intensity: Option<i64>,
    pub mask_style: Option<String>,
    pub privacy_default_enabled: Option<bool>,
    pub tooltips: Option<serde_json::Value>,
}

/// Generic acknowledgement body.
#[derive(Debug, Serialize)]
pub struct OkResponse {
    pub ok: bool,
}

impl OkResponse {
    pub fn new() -> Self {
        Self { ok: true }
    }
}

impl Default for OkResponse {
    fn default() -> Self {
        Self::new()
    }
}
