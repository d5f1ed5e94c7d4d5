//! Submission lookup and voting endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::{Submission, SubmissionId, UserId, Vote};
use domain::{CastVote, Tally};
use serde::{Deserialize, Serialize};
use store::Store;

use super::parse_id;
use crate::AppState;
use crate::error::ApiError;

#[derive(Deserialize)]
pub struct VoteRequest {
    pub voter_id: String,
    pub approved: bool,
    pub review_time_ms: i64,
}

/// A submission together with its current vote counts.
#[derive(Serialize)]
pub struct SubmissionResponse {
    #[serde(flatten)]
    pub submission: Submission,
    pub tally: Tally,
}

/// GET /submissions/:id
#[tracing::instrument(skip(state))]
pub async fn get<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<SubmissionResponse>, ApiError> {
    let id: SubmissionId = parse_id(&id, "submission")?;
    let submission = state.service.get_submission(id).await?;
    let tally = state.service.tally(id).await?;
    Ok(Json(SubmissionResponse { submission, tally }))
}

/// POST /submissions/:id/votes — record a vote.
///
/// The decision, if the vote completes the quorum, is taken asynchronously;
/// poll the submission to observe it.
#[tracing::instrument(skip(state, req))]
pub async fn vote<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    Json(req): Json<VoteRequest>,
) -> Result<(StatusCode, Json<Vote>), ApiError> {
    let submission_id: SubmissionId = parse_id(&id, "submission")?;
    let voter_id: UserId = parse_id(&req.voter_id, "voter")?;
    let vote = state
        .service
        .vote(CastVote::new(
            submission_id,
            voter_id,
            req.approved,
            req.review_time_ms,
        ))
        .await?;
    Ok((StatusCode::CREATED, Json(vote)))
}

/// GET /submissions/:id/votes
#[tracing::instrument(skip(state))]
pub async fn votes<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<Vote>>, ApiError> {
    let id: SubmissionId = parse_id(&id, "submission")?;
    Ok(Json(state.service.list_votes(id).await?))
}
