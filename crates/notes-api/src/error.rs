//! API error types and JSON error response formatting.
//!
//! ApiError gives every endpoint the same `{error, message}` body and maps
//! the storage taxonomy onto HTTP status codes.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use notes_core::error::NotesError;

/// JSON error response body.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Machine-readable error code (e.g., "bad_request", "not_found").
    pub error: String,
    /// Human-readable error message.
    pub message: String,
}

#[derive(Debug)]
pub enum ApiError {
    /// 400 - unknown backend name, invalid input.
    BadRequest(String),
    /// 404 - note does not exist.
    NotFound(String),
    /// 500 - unexpected server error.
    Internal(String),
    /// 503 - backend unreachable.
    ServiceUnavailable(String),
    /// 504 - backend did not answer in time.
    GatewayTimeout(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", msg),
            ApiError::ServiceUnavailable(msg) => {
                (StatusCode::SERVICE_UNAVAILABLE, "service_unavailable", msg)
            }
            ApiError::GatewayTimeout(msg) => (StatusCode::GATEWAY_TIMEOUT, "timeout", msg),
        };

        let body = ErrorBody {
            error: error_code.to_string(),
            message,
        };

        (status, Json(body)).into_response()
    }
}

impl From<NotesError> for ApiError {
    fn from(err: NotesError) -> Self {
        let message = err.to_string();
        match err {
            NotesError::NotFound(_) => ApiError::NotFound(message),
            NotesError::UnsupportedBackend(_) | NotesError::ConstraintViolation(_) => {
                ApiError::BadRequest(message)
            }
            NotesError::Connection(_) => ApiError::ServiceUnavailable(message),
            NotesError::Timeout { .. } => ApiError::GatewayTimeout(message),
            _ => ApiError::Internal(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn status_of(err: NotesError) -> StatusCode {
        ApiError::from(err).into_response().status()
    }

    #[test]
    fn test_taxonomy_status_codes() {
        assert_eq!(status_of(NotesError::NotFound("1".into())), StatusCode::NOT_FOUND);
        assert_eq!(
            status_of(NotesError::UnsupportedBackend("x".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(NotesError::ConstraintViolation("title".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(NotesError::Connection("down".into())),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status_of(NotesError::timeout("count", Duration::from_secs(2))),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            status_of(NotesError::Backend("boom".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
