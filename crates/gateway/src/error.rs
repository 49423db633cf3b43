//! Error types for the gateway layer

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use parley_database::StoreError;
use parley_realtime::RealtimeError;
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("authorization failed: {0}")]
    AuthorizationFailed(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("resource not found: {0}")]
    NotFound(String),

    #[error("internal server error: {0}")]
    InternalError(String),

    #[error("store unavailable")]
    ServiceUnavailable,
}

impl GatewayError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::AuthenticationFailed(_) => StatusCode::UNAUTHORIZED,
            GatewayError::AuthorizationFailed(_) => StatusCode::FORBIDDEN,
            GatewayError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            GatewayError::NotFound(_) => StatusCode::NOT_FOUND,
            GatewayError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            GatewayError::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = json!({
            "error": status.as_str(),
            "message": self.to_string(),
        });
        (status, Json(body)).into_response()
    }
}

pub type GatewayResult<T> = Result<T, GatewayError>;

impl From<RealtimeError> for GatewayError {
    fn from(error: RealtimeError) -> Self {
        match error {
            RealtimeError::Validation(msg) => GatewayError::InvalidRequest(msg),
            RealtimeError::Authorization(msg) => GatewayError::AuthorizationFailed(msg),
            RealtimeError::ChatNotFound(id) => GatewayError::NotFound(format!("chat {id}")),
            RealtimeError::MessageNotFound(id) => GatewayError::NotFound(format!("message {id}")),
            RealtimeError::UserNotFound(id) => GatewayError::NotFound(format!("user {id}")),
            RealtimeError::Store(store) => store.into(),
        }
    }
}

impl From<StoreError> for GatewayError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::Timeout(_) => GatewayError::ServiceUnavailable,
            StoreError::NotFound => GatewayError::NotFound("resource".to_string()),
            StoreError::Database(e) => GatewayError::InternalError(e.to_string()),
        }
    }
}
