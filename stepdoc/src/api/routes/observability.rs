//! Observability routes: audit trail and dashboard stats.

use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;

use crate::api::error::{ApiError, ApiResult};
use crate::api::server::AppState;
use crate::database::models::AuditLogDbModel;
use crate::database::repositories::DashboardStats;

/// Create the observability router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/audit-logs", get(list_audit_logs))
        .route("/analytics/stats", get(dashboard_stats))
}

#[derive(Debug, Deserialize)]
struct AuditQuery {
    limit: Option<i64>,
}

async fn list_audit_logs(
    State(state): State<AppState>,
    Query(query): Query<AuditQuery>,
) -> ApiResult<Json<Vec<AuditLogDbModel>>> {
    let limit = query.limit.unwrap_or(50).clamp(1, 500);
    Ok(Json(
        state
            .observability
            .list_recent_audits(limit)
            .await
            .map_err(ApiError::from)?,
    ))
}

async fn dashboard_stats(State(state): State<AppState>) -> ApiResult<Json<DashboardStats>> {
    Ok(Json(state.observability.dashboard_stats().await.map_err(ApiError::from)?))
}
