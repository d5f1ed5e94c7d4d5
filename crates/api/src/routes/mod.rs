//! Route handlers, one module per resource.

pub mod challenges;
pub mod health;
pub mod metrics;
pub mod sagas;
pub mod submissions;
pub mod users;

use uuid::Uuid;

use crate::error::ApiError;

/// Parses a path segment into a typed identifier.
pub(crate) fn parse_id<T: From<Uuid>>(raw: &str, what: &str) -> Result<T, ApiError> {
    Uuid::parse_str(raw)
        .map(T::from)
        .map_err(|e| ApiError::BadRequest(format!("Invalid {what} ID: {e}")))
}
