//! Error types for the session and delivery layer.

use parley_database::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RealtimeError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("not authorized: {0}")]
    Authorization(String),

    #[error("chat not found: {0}")]
    ChatNotFound(String),

    #[error("message not found: {0}")]
    MessageNotFound(String),

    #[error("user not found: {0}")]
    UserNotFound(i64),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl RealtimeError {
    pub fn validation(message: impl Into<String>) -> Self {
        RealtimeError::Validation(message.into())
    }

    pub fn authorization(message: impl Into<String>) -> Self {
        RealtimeError::Authorization(message.into())
    }

    pub fn chat_not_found(chat_id: impl Into<String>) -> Self {
        RealtimeError::ChatNotFound(chat_id.into())
    }
}

pub type RealtimeResult<T> = Result<T, RealtimeError>;
