//! Run API Handlers
//!
//! HTTP endpoints for run inspection and cancellation.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use quay_core::domain::log::LogEntry;
use quay_core::domain::run::Run;
use quay_core::dto::run::RunSummary;
use std::sync::Arc;
use uuid::Uuid;

use crate::api::error::ApiResult;
use crate::service::RunService;

/// GET /runs
/// List all runs, newest first
pub async fn list_runs(State(service): State<Arc<RunService>>) -> Json<Vec<RunSummary>> {
    tracing::debug!("Listing runs");

    Json(service.list_runs().iter().map(RunSummary::from).collect())
}

/// GET /runs/{id}
/// Get run details, including every job
pub async fn get_run(
    State(service): State<Arc<RunService>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Run>> {
    tracing::debug!("Getting run: {}", id);

    Ok(Json(service.get_run(id)?))
}

/// POST /runs/{id}/cancel
/// Request cancellation; the run reaches Cancelled asynchronously
pub async fn cancel_run(
    State(service): State<Arc<RunService>>,
    Path(id): Path<Uuid>,
) -> ApiResult<(StatusCode, Json<Run>)> {
    tracing::info!("Cancelling run: {}", id);

    let run = service.cancel_run(id)?;
    Ok((StatusCode::ACCEPTED, Json(run)))
}

/// GET /runs/{id}/logs
pub async fn get_run_logs(
    State(service): State<Arc<RunService>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Vec<LogEntry>>> {
    tracing::debug!("Getting logs for run: {}", id);

    Ok(Json(service.get_run_logs(id)?))
}
