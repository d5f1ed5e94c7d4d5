//! Health check endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use serde::Serialize;
use store::Store;

use crate::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub event_bus: &'static str,
    pub running_sagas: usize,
    pub checked_at: DateTime<Utc>,
}

/// GET /health — reports 503 once the event bus has shut down.
pub async fn check<S: Store>(
    State(state): State<Arc<AppState<S>>>,
) -> (StatusCode, Json<HealthResponse>) {
    let closed = state.service.bus().is_closed();
    let (code, status, event_bus) = if closed {
        (StatusCode::SERVICE_UNAVAILABLE, "shutting_down", "closed")
    } else {
        (StatusCode::OK, "ok", "open")
    };
    (
        code,
        Json(HealthResponse {
            status,
            event_bus,
            running_sagas: state.service.sagas().len(),
            checked_at: Utc::now(),
        }),
    )
}
