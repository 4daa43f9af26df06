//! Trigger Event API Handler

use axum::{Json, extract::State, http::StatusCode};
use quay_core::domain::trigger::TriggerEvent;
use quay_core::dto::event::TriggerResponse;
use std::sync::Arc;

use crate::service::RunService;

/// POST /events
/// Resolve a push or manual-dispatch event; 202 when a run was started
pub async fn receive_event(
    State(service): State<Arc<RunService>>,
    Json(event): Json<TriggerEvent>,
) -> (StatusCode, Json<TriggerResponse>) {
    tracing::info!("Received {}", event);

    let response = service.handle_event(event);
    let status = if response.started {
        StatusCode::ACCEPTED
    } else {
        StatusCode::OK
    };
    (status, Json(response))
}
