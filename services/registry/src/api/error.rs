//! API error types and helpers.
//!
//! # Purpose
//! Keeps error bodies uniform across registry endpoints: a stable `code`, a
//! human-readable `message`, and for authentication failures the list of
//! per-credential reasons.
//!
//! # Security considerations
//! - Internal errors are logged server-side; clients only see a generic message.
use crate::api::types::ErrorResponse;
use crate::store::StoreError;
use axum::Json;
use axum::http::StatusCode;
use axum::response::IntoResponse;

/// HTTP status paired with a JSON error body.
///
/// # Example
/// ```rust
/// use axum::http::StatusCode;
/// use registry::api::error::api_not_found;
///
/// let err = api_not_found("authority not found");
/// assert_eq!(err.status, StatusCode::NOT_FOUND);
/// assert_eq!(err.body.code, "not_found");
/// ```
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub body: ErrorResponse,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        (self.status, Json(self.body)).into_response()
    }
}

fn api_error(status: StatusCode, code: &str, message: &str) -> ApiError {
    ApiError {
        status,
        body: ErrorResponse {
            code: code.to_string(),
            message: message.to_string(),
            request_id: None,
            errors: Vec::new(),
        },
    }
}

pub fn api_not_found(message: &str) -> ApiError {
    api_error(StatusCode::NOT_FOUND, "not_found", message)
}

/// 409 with a caller-chosen code so clients can tell conflicts apart.
pub fn api_conflict(code: &str, message: &str) -> ApiError {
    api_error(StatusCode::CONFLICT, code, message)
}

/// 500 for a store failure. The store error is logged, not returned.
pub fn api_internal(message: &str, err: &StoreError) -> ApiError {
    tracing::error!(error = ?err, "registry storage error");
    api_error(StatusCode::INTERNAL_SERVER_ERROR, "internal", message)
}

pub fn api_internal_message(message: &str) -> ApiError {
    api_error(StatusCode::INTERNAL_SERVER_ERROR, "internal", message)
}

pub fn api_unauthorized(message: &str) -> ApiError {
    api_error(StatusCode::UNAUTHORIZED, "unauthorized", message)
}

/// 401 carrying the reason each credential parser gave.
pub fn api_unauthorized_with(message: &str, errors: Vec<String>) -> ApiError {
    let mut err = api_unauthorized(message);
    err.body.errors = errors;
    err
}

pub fn api_forbidden(message: &str) -> ApiError {
    api_error(StatusCode::FORBIDDEN, "forbidden", message)
}

pub fn api_validation_error(message: &str) -> ApiError {
    api_error(StatusCode::BAD_REQUEST, "validation_error", message)
}
