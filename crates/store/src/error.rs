use common::UnknownStatus;
use thiserror::Error;

/// Errors that can occur when interacting with the store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A row with the same unique key already exists.
    #[error("Duplicate {entity}: {key}")]
    Duplicate { entity: &'static str, key: String },

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A stored row could not be mapped back to a record.
    #[error("Corrupt row: {0}")]
    Corrupt(String),

    /// The store refused the operation.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// Schema registration or bootstrap failed.
    #[error("Schema error: {0}")]
    Schema(String),
}

impl From<UnknownStatus> for StoreError {
    fn from(err: UnknownStatus) -> Self {
        StoreError::Corrupt(err.to_string())
    }
}

impl StoreError {
    /// Returns true if the error is a unique-key violation.
    pub fn is_duplicate(&self) -> bool {
        matches!(self, StoreError::Duplicate { .. })
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
