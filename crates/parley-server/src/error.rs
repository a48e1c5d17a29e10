//! API error type and HTTP status mapping.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

use parley_store::StoreError;

/// Errors returned by REST handlers.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Malformed or missing request data.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Actor is not allowed to perform the operation.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Referenced entity does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A uniqueness constraint was violated.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Anything unexpected from the store or runtime.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, "request failed");
        }
        let body = Json(json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::UserNotFound(id) => Self::NotFound(format!("user {id}")),
            StoreError::ConversationNotFound(id) => Self::NotFound(format!("conversation {id}")),
            StoreError::MessageNotFound(id) => Self::NotFound(format!("message {id}")),
            StoreError::CallNotFound(id) => Self::NotFound(format!("call {id}")),
            StoreError::AlreadyExists(what) => Self::Conflict(what),
            StoreError::InvalidOperation(reason) => Self::BadRequest(reason),
            other => Self::Internal(other.to_string()),
        }
    }
}

/// Convenience type alias for handler results.
pub type ApiResult<T> = std::result::Result<T, ApiError>;
