//! Challenge endpoints and proof submission.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::{Challenge, ChallengeId, Submission, UserId};
use domain::{CreateChallenge, SubmitProof};
use serde::Deserialize;
use store::Store;

use super::parse_id;
use crate::AppState;
use crate::error::ApiError;

#[derive(Deserialize)]
pub struct SubmitProofRequest {
    pub user_id: String,
    pub proof_url: String,
}

/// POST /challenges — create an active challenge.
#[tracing::instrument(skip(state, req), fields(title = %req.title))]
pub async fn create<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Json(req): Json<CreateChallenge>,
) -> Result<(StatusCode, Json<Challenge>), ApiError> {
    let challenge = state.service.create_challenge(req).await?;
    Ok((StatusCode::CREATED, Json(challenge)))
}

/// GET /challenges — list every challenge.
#[tracing::instrument(skip(state))]
pub async fn list<S: Store>(
    State(state): State<Arc<AppState<S>>>,
) -> Result<Json<Vec<Challenge>>, ApiError> {
    Ok(Json(state.service.list_challenges().await?))
}

/// GET /challenges/:id
#[tracing::instrument(skip(state))]
pub async fn get<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<Challenge>, ApiError> {
    let id: ChallengeId = parse_id(&id, "challenge")?;
    Ok(Json(state.service.get_challenge(id).await?))
}

/// POST /challenges/:id/deactivate — stop accepting submissions.
#[tracing::instrument(skip(state))]
pub async fn deactivate<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<Challenge>, ApiError> {
    let id: ChallengeId = parse_id(&id, "challenge")?;
    Ok(Json(state.service.deactivate_challenge(id).await?))
}

/// POST /challenges/:id/submissions — submit proof for review.
#[tracing::instrument(skip(state, req))]
pub async fn submit<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    Json(req): Json<SubmitProofRequest>,
) -> Result<(StatusCode, Json<Submission>), ApiError> {
    let challenge_id: ChallengeId = parse_id(&id, "challenge")?;
    let user_id: UserId = parse_id(&req.user_id, "user")?;
    let submission = state
        .service
        .submit(SubmitProof::new(challenge_id, user_id, req.proof_url))
        .await?;
    Ok((StatusCode::CREATED, Json(submission)))
}

/// GET /challenges/:id/submissions
#[tracing::instrument(skip(state))]
pub async fn submissions<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<Submission>>, ApiError> {
    let id: ChallengeId = parse_id(&id, "challenge")?;
    Ok(Json(state.service.list_submissions(id).await?))
}
