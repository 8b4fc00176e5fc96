//! API route modules.
//!
//! Organizes routes by resource type; everything is mounted under `/api/v1`.

pub mod chapters;
pub mod configuration;
pub mod health;
pub mod hierarchy;
pub mod observability;
pub mod stream;
pub mod upload;

use axum::Router;

use crate::api::server::AppState;

/// Create the main API router with all routes.
pub fn create_router(state: AppState) -> Router {
    let v1 = Router::new()
        .merge(upload::router())
        .merge(chapters::router())
        .merge(stream::router())
        .merge(hierarchy::router())
        .nest("/configuration", configuration::router())
        .merge(observability::router())
        .nest("/health", health::router());

    Router::new().nest("/api/v1", v1).with_state(state)
}
