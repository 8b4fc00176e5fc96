//! Append-only observability records.
//!
//! The orchestrator writes these but never reads them for control decisions;
//! status counts feed the dashboard stats endpoint.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// One background processing job, for cost/timing dashboards.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ProcessingJobDbModel {
    pub id: i64,
    pub chapter_id: i64,
    /// pending, processing, completed, failed
    pub status: String,
    pub model_used: Option<String>,
    pub error_log: Option<String>,
    pub created_at: String,
    pub finished_at: Option<String>,
}

impl ProcessingJobDbModel {
    pub fn started(chapter_id: i64, model: impl Into<String>) -> Self {
        Self {
            id: 0,
            chapter_id,
            status: "processing".to_string(),
            model_used: Some(model.into()),
            error_log: None,
            created_at: chrono::Utc::now().to_rfc3339(),
            finished_at: None,
        }
    }
}

/// One user or system action, for the audit trail.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct AuditLogDbModel {
    pub id: i64,
    pub user_id: Option<String>,
    /// VIEW, CREATE, EDIT, DELETE, PUBLISH, ...
    pub action: String,
    pub resource_type: String,
    pub resource_id: Option<String>,
    pub details: Option<String>,
    pub created_at: String,
}

impl AuditLogDbModel {
    pub fn action(
        action: impl Into<String>,
        resource_type: impl Into<String>,
        resource_id: impl std::fmt::Display,
    ) -> Self {
        Self {
            id: 0,
            user_id: None,
            action: action.into(),
            resource_type: resource_type.into(),
            resource_id: Some(resource_id.to_string()),
            details: None,
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Reader feedback on a published manual.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct FeedbackDbModel {
    pub id: i64,
    pub chapter_id: i64,
    pub is_positive: bool,
    pub comment: Option<String>,
    pub created_at: String,
}
