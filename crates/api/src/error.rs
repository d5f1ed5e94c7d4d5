//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use domain::ChallengeError;

const RETRY_MESSAGE: &str = "The request could not be completed, please try again";
const SUPPORT_MESSAGE: &str =
    "The request failed and may need manual repair, please contact support";

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Resource not found.
    NotFound(String),
    /// Bad request from the client.
    BadRequest(String),
    /// Workflow error.
    Challenge(ChallengeError),
}

impl ApiError {
    fn status_and_message(&self) -> (StatusCode, String) {
        match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ApiError::Challenge(err) => challenge_error_to_response(err),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = self.status_and_message();
        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

/// Client faults carry their own message; system faults are logged and
/// answered with a generic one.
fn challenge_error_to_response(err: &ChallengeError) -> (StatusCode, String) {
    match err {
        ChallengeError::Validation(_) => (StatusCode::BAD_REQUEST, err.to_string()),
        ChallengeError::NotFound { .. } => (StatusCode::NOT_FOUND, err.to_string()),
        ChallengeError::Conflict(_) => (StatusCode::CONFLICT, err.to_string()),
        ChallengeError::QueueClosed => {
            tracing::warn!(error = %err, "request rejected during shutdown");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                "The service is shutting down".to_string(),
            )
        }
        _ if err.requires_operator_attention() => {
            tracing::error!(error = %err, "request left state that needs repair");
            (StatusCode::INTERNAL_SERVER_ERROR, SUPPORT_MESSAGE.to_string())
        }
        _ => {
            tracing::error!(error = %err, "internal server error");
            (StatusCode::INTERNAL_SERVER_ERROR, RETRY_MESSAGE.to_string())
        }
    }
}

impl From<ChallengeError> for ApiError {
    fn from(err: ChallengeError) -> Self {
        ApiError::Challenge(err)
    }
}
