//! Chapter database model and lifecycle status.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Chapter database model.
/// One processed video plus its derived manual content.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ChapterDbModel {
    pub id: i64,
    pub collection_id: i64,
    pub title: String,
    /// Artifact-store key of the primary (served) video.
    pub video_key: String,
    /// Artifact-store key of the stitched cut, once publishing ran a stitch.
    pub stitched_video_key: Option<String>,
    /// Serialized `StructuredContent`, or a `FailureReport` when FAILED.
    pub content: Option<String>,
    /// Lifecycle status: PENDING, PROCESSING, DRAFTED, PUBLISHING,
    /// COMPLETED, FAILED.
    pub status: String,
    /// Monotonic counter bumped by reprocess/cancel. A background job only
    /// commits its result while the generation it captured is still current.
    pub generation: i64,
    pub audience_tags: Option<String>,
    pub functionality_tags: Option<String>,
    /// RFC 3339 creation timestamp.
    pub created_at: String,
}

impl ChapterDbModel {
    pub fn new(collection_id: i64, title: impl Into<String>, video_key: impl Into<String>) -> Self {
        Self {
            id: 0,
            collection_id,
            title: title.into(),
            video_key: video_key.into(),
            stitched_video_key: None,
            content: None,
            status: ChapterStatus::Pending.as_str().to_string(),
            generation: 0,
            audience_tags: None,
            functionality_tags: None,
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn status(&self) -> Option<ChapterStatus> {
        ChapterStatus::parse(&self.status)
    }
}

/// Chapter lifecycle status values.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChapterStatus {
    /// Created, waiting for the processing job to start.
    Pending,
    /// Analysis + synthesis in progress.
    Processing,
    /// Automated processing succeeded; awaiting human review.
    Drafted,
    /// Publish requested and a stitch is running.
    Publishing,
    /// Published.
    Completed,
    /// A pipeline stage failed; content holds a diagnostic payload.
    Failed,
}

impl ChapterStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Processing => "PROCESSING",
            Self::Drafted => "DRAFTED",
            Self::Publishing => "PUBLISHING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(Self::Pending),
            "PROCESSING" => Some(Self::Processing),
            "DRAFTED" => Some(Self::Drafted),
            "PUBLISHING" => Some(Self::Publishing),
            "COMPLETED" => Some(Self::Completed),
            "FAILED" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Whether automated processing is currently mutating this chapter.
    /// Human edits are rejected while this is true.
    pub fn is_busy(&self) -> bool {
        matches!(self, Self::Processing | Self::Publishing)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Chapter joined with its context hierarchy, eager-loaded in one query.
#[derive(Debug, Clone, FromRow)]
pub struct ChapterContextRow {
    pub id: i64,
    pub collection_id: i64,
    pub title: String,
    pub video_key: String,
    pub stitched_video_key: Option<String>,
    pub content: Option<String>,
    pub status: String,
    pub generation: i64,
    pub created_at: String,
    pub module_name: Option<String>,
    pub module_context: Option<String>,
    pub system_name: Option<String>,
    pub system_context: Option<String>,
}
