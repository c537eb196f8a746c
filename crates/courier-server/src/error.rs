use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use courier_store::StoreError;

/// Failures of a socket-event operation.
///
/// Every variant is reported to the acting client only, as a `group-error`
/// or failed `message-status` event; none of them ever tears down the
/// connection or the process.
#[derive(Debug, Error)]
pub enum RelayError {
    /// Required fields missing from the request.
    #[error("{0}")]
    Validation(String),

    /// A referenced group or identity does not exist.
    #[error("{0}")]
    NotFound(String),

    /// The actor lacks the required role or membership.
    #[error("{0}")]
    Forbidden(String),

    /// A well-formed request with no effect.
    #[error("{0}")]
    NoOp(String),

    /// The durable store failed; reported to the sender as a generic failure.
    #[error("Storage failure: {0}")]
    Storage(#[from] StoreError),
}

/// Errors returned by the HTTP surface.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Upload too large: {size} bytes (max {max})")]
    UploadTooLarge { size: usize, max: usize },

    #[error("Upload storage error: {0}")]
    UploadStorage(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ServerError::UploadTooLarge { .. } => (StatusCode::PAYLOAD_TOO_LARGE, self.to_string()),
            ServerError::UploadStorage(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "File upload failed".to_string(),
            ),
            ServerError::BadRequest(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            ServerError::NotFound(_) => (StatusCode::NOT_FOUND, self.to_string()),
            ServerError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
            ),
        };

        let body = serde_json::json!({
            "success": false,
            "message": message,
        });

        (status, axum::Json(body)).into_response()
    }
}

impl From<StoreError> for ServerError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => ServerError::NotFound("Record not found".to_string()),
            other => ServerError::Internal(other.to_string()),
        }
    }
}
