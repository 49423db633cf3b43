//! Error types for the durable store.

use std::time::Duration;
use thiserror::Error;

/// Result type alias for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Failure modes of the durable store contract.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store call timed out after {0:?}")]
    Timeout(Duration),

    #[error("record not found")]
    NotFound,

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl StoreError {
    /// Whether the underlying failure hit a UNIQUE constraint. Callers racing
    /// on check-then-create (direct chat access) use this to fall back to a
    /// re-read instead of surfacing the conflict.
    pub fn is_unique_violation(&self) -> bool {
        match self {
            StoreError::Database(sqlx::Error::Database(db)) => db.is_unique_violation(),
            _ => false,
        }
    }

    /// Timeouts are transient; callers may retry idempotent reads once.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Timeout(_))
    }
}
