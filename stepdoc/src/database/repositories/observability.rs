//! Observability repository: processing jobs, audit logs, feedback.
//!
//! Append-only from the pipeline's perspective; read back only by the
//! dashboard endpoints.

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::database::models::{AuditLogDbModel, FeedbackDbModel, ProcessingJobDbModel};
use crate::Result;

/// Dashboard stats counters.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct DashboardStats {
    pub total_manuals: i64,
    pub processing_count: i64,
    pub attention_needed: i64,
    pub total_views: i64,
}

/// Observability repository trait.
#[async_trait]
pub trait ObservabilityRepository: Send + Sync {
    async fn record_job_started(&self, job: &ProcessingJobDbModel) -> Result<i64>;
    async fn record_job_finished(
        &self,
        job_id: i64,
        status: &str,
        error_log: Option<&str>,
    ) -> Result<()>;
    async fn record_audit(&self, log: &AuditLogDbModel) -> Result<()>;
    async fn list_recent_audits(&self, limit: i64) -> Result<Vec<AuditLogDbModel>>;
    async fn record_feedback(&self, feedback: &FeedbackDbModel) -> Result<()>;
    async fn dashboard_stats(&self) -> Result<DashboardStats>;
}

/// SQLx implementation of ObservabilityRepository.
pub struct SqlxObservabilityRepository {
    pool: SqlitePool,
}

impl SqlxObservabilityRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ObservabilityRepository for SqlxObservabilityRepository {
    async fn record_job_started(&self, job: &ProcessingJobDbModel) -> Result<i64> {
        let id = sqlx::query(
            r#"
            INSERT INTO processing_jobs (chapter_id, status, model_used, created_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(job.chapter_id)
        .bind(&job.status)
        .bind(&job.model_used)
        .bind(&job.created_at)
        .execute(&self.pool)
        .await?
        .last_insert_rowid();
        Ok(id)
    }

    async fn record_job_finished(
        &self,
        job_id: i64,
        status: &str,
        error_log: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE processing_jobs SET status = ?, error_log = ?, finished_at = ? WHERE id = ?",
        )
        .bind(status)
        .bind(error_log)
        .bind(chrono::Utc::now().to_rfc3339())
        .bind(job_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn record_audit(&self, log: &AuditLogDbModel) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO audit_logs (user_id, action, resource_type, resource_id, details, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&log.user_id)
        .bind(&log.action)
        .bind(&log.resource_type)
        .bind(&log.resource_id)
        .bind(&log.details)
        .bind(&log.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_recent_audits(&self, limit: i64) -> Result<Vec<AuditLogDbModel>> {
        let logs = sqlx::query_as::<_, AuditLogDbModel>(
            "SELECT * FROM audit_logs ORDER BY created_at DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(logs)
    }

    async fn record_feedback(&self, feedback: &FeedbackDbModel) -> Result<()> {
        sqlx::query(
            "INSERT INTO feedbacks (chapter_id, is_positive, comment, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(feedback.chapter_id)
        .bind(feedback.is_positive)
        .bind(&feedback.comment)
        .bind(&feedback.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn dashboard_stats(&self) -> Result<DashboardStats> {
        let (total_manuals,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM collections")
            .fetch_one(&self.pool)
            .await?;
        let (processing_count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM processing_jobs WHERE status = 'processing'")
                .fetch_one(&self.pool)
                .await?;
        let (attention_needed,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM processing_jobs WHERE status = 'failed'")
                .fetch_one(&self.pool)
                .await?;
        let (total_views,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM audit_logs WHERE action = 'VIEW_MANUAL'")
                .fetch_one(&self.pool)
                .await?;

        Ok(DashboardStats {
            total_manuals,
            processing_count,
            attention_needed,
            total_views,
        })
    }
}
