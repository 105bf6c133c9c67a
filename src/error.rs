//! Service error types with HTTP status code mapping.
//!
//! [`ServiceError`] is the central error type for the gateway. Each variant
//! maps to a stable kind, a numeric code, and an HTTP status code rendered
//! as a structured JSON error response.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use utoipa::ToSchema;

use crate::cache::CacheError;
use crate::domain::StoreError;

/// Structured JSON error response body.
///
/// All error responses follow this shape:
/// ```json
/// {
///   "error": {
///     "code": 3001,
///     "kind": "invalid_state",
///     "message": "invalid state: request 7 is completed, expected draft"
///   }
/// }
/// ```
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    /// Structured error payload.
    pub error: ErrorBody,
}

/// Inner error body with numeric code, stable kind and message.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    /// Numeric error code (see code ranges on [`ServiceError`]).
    pub code: u32,
    /// Stable machine-readable error kind.
    pub kind: &'static str,
    /// Human-readable error message.
    pub message: String,
}

/// Server-side error enum with HTTP status code mapping.
///
/// # Error Code Ranges
///
/// | Range     | Category              | HTTP Status                 |
/// |-----------|-----------------------|-----------------------------|
/// | 1000–1999 | Authentication / role | 401 / 403                   |
/// | 2000–2999 | Validation / lookup   | 400 / 404                   |
/// | 3000–3999 | Lifecycle             | 409 Conflict                |
/// | 5000–5999 | Server / upstream     | 500 / 502                   |
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// Missing, expired or unknown session token, or a bad shared secret.
    #[error("unauthenticated: {0}")]
    Unauthenticated(String),

    /// The caller's role or ownership does not permit the operation.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Illegal lifecycle transition or stale callback.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Unknown id or logically deleted row.
    #[error("not found: {0}")]
    NotFound(String),

    /// Malformed payload or disallowed field.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The external computation service could not be reached.
    #[error("upstream failure: {0}")]
    UpstreamFailure(String),

    /// Durable store failure.
    #[error("storage failure: {0}")]
    StorageFailure(String),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::Unauthenticated(_) => 1001,
            Self::Forbidden(_) => 1002,
            Self::Validation(_) => 2001,
            Self::NotFound(_) => 2002,
            Self::InvalidState(_) => 3001,
            Self::StorageFailure(_) => 5001,
            Self::UpstreamFailure(_) => 5002,
            Self::Internal(_) => 5000,
        }
    }

    /// Returns the stable kind string for this variant.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Unauthenticated(_) => "unauthenticated",
            Self::Forbidden(_) => "forbidden",
            Self::InvalidState(_) => "invalid_state",
            Self::NotFound(_) => "not_found",
            Self::Validation(_) => "validation_error",
            Self::UpstreamFailure(_) => "upstream_failure",
            Self::StorageFailure(_) => "storage_failure",
            Self::Internal(_) => "internal",
        }
    }

    /// Returns the HTTP status code for this variant.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::InvalidState(_) => StatusCode::CONFLICT,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::UpstreamFailure(_) => StatusCode::BAD_GATEWAY,
            Self::StorageFailure(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => Self::NotFound(what),
            StoreError::Duplicate(what) => Self::Validation(format!("duplicate {what}")),
            StoreError::Conflict(what) => Self::InvalidState(what),
            StoreError::Backend(message) => Self::StorageFailure(message),
        }
    }
}

impl From<CacheError> for ServiceError {
    fn from(err: CacheError) -> Self {
        Self::Internal(err.to_string())
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        let body = ErrorResponse {
            error: ErrorBody {
                code: self.error_code(),
                kind: self.kind(),
                message: self.to_string(),
            },
        };
        let mut response = axum::Json(body).into_response();
        *response.status_mut() = status;
        response
    }
}
