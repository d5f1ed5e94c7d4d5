//! Operator view of running sagas.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use saga::{SagaId, SagaSummary};
use store::Store;

use super::parse_id;
use crate::AppState;
use crate::error::ApiError;

/// GET /sagas — sagas currently in flight.
pub async fn list<S: Store>(State(state): State<Arc<AppState<S>>>) -> Json<Vec<SagaSummary>> {
    Json(state.service.sagas().active())
}

/// POST /sagas/:id/stop — request cancellation before the saga's next step.
#[tracing::instrument(skip(state))]
pub async fn stop<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let uuid = parse_id(&id, "saga")?;
    if state.service.sagas().stop(SagaId::from_uuid(uuid)) {
        Ok(StatusCode::ACCEPTED)
    } else {
        Err(ApiError::NotFound(format!("Saga {id} is not running")))
    }
}
