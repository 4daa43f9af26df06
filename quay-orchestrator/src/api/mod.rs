//! API Module
//!
//! HTTP API layer for the orchestrator.
//! Each submodule handles endpoints for a specific domain.

pub mod error;
pub mod event;
pub mod health;
pub mod run;

use axum::{
    Router,
    routing::{get, post},
};
use std::path::Path;
use std::sync::Arc;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::service::RunService;

/// Create the main API router with all endpoints
///
/// The published site is served read-only under `/pages`.
pub fn create_router(service: Arc<RunService>, live_dir: &Path) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health::health_check))
        // Trigger events
        .route("/events", post(event::receive_event))
        // Run endpoints
        .route("/runs", get(run::list_runs))
        .route("/runs/{id}", get(run::get_run))
        .route("/runs/{id}/cancel", post(run::cancel_run))
        .route("/runs/{id}/logs", get(run::get_run_logs))
        .nest_service("/pages", ServeDir::new(live_dir))
        // Add state and middleware
        .with_state(service)
        .layer(TraceLayer::new_for_http())
}
