//! # API Error Types
//!
//! Structured error type implementing `axum::response::IntoResponse`.
//! Maps engine errors to HTTP status codes and JSON bodies carrying a
//! machine-readable code, a message, and (for validation failures) the
//! offending field. Internal error details are logged, never returned.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use gmx_arbitration::ArbitrationError;
use gmx_core::ValidationError;
use gmx_state::OrderError;

use crate::engine::EngineError;
use crate::store::StoreError;

/// Structured JSON error response body.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

/// Inner error detail.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorDetail {
    /// Machine-readable error code (e.g. "NOT_FOUND", "VALIDATION_ERROR").
    pub code: String,
    /// Human-readable error message.
    pub message: String,
    /// Additional details, present only for client errors.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// Application-level error type that implements [`IntoResponse`] for Axum.
#[derive(Error, Debug)]
pub enum AppError {
    /// Resource not found, or not visible to the caller (404).
    #[error("not found: {0}")]
    NotFound(String),

    /// A business-rule bound was violated (422).
    #[error("validation error: {message}")]
    Validation {
        message: String,
        /// The offending field, when known.
        field: Option<&'static str>,
    },

    /// Request body could not be parsed (422).
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Missing or invalid credentials (401).
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// The caller may not perform this action (403).
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Conflict with current resource state (409).
    #[error("conflict: {0}")]
    Conflict(String),

    /// Internal server error (500). Message is logged but not returned.
    #[error("internal error: {0}")]
    Internal(String),

    /// The store is unreachable (503).
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
}

impl AppError {
    /// A validation error with no field attribution.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            field: None,
        }
    }

    /// Return the HTTP status code and machine-readable error code.
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            Self::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            Self::Validation { .. } => (StatusCode::UNPROCESSABLE_ENTITY, "VALIDATION_ERROR"),
            Self::BadRequest(_) => (StatusCode::UNPROCESSABLE_ENTITY, "BAD_REQUEST"),
            Self::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            Self::Forbidden(_) => (StatusCode::FORBIDDEN, "FORBIDDEN"),
            Self::Conflict(_) => (StatusCode::CONFLICT, "CONFLICT"),
            Self::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
            Self::ServiceUnavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "SERVICE_UNAVAILABLE"),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        let message = match &self {
            Self::Internal(_) => "An internal error occurred".to_string(),
            Self::ServiceUnavailable(_) => "The service is temporarily unavailable".to_string(),
            other => other.to_string(),
        };

        match &self {
            Self::Internal(_) => tracing::error!(error = %self, "internal server error"),
            Self::ServiceUnavailable(_) => tracing::warn!(error = %self, "service unavailable"),
            _ => {}
        }

        let details = match &self {
            Self::Validation {
                field: Some(field), ..
            } => Some(serde_json::json!({ "field": field })),
            _ => None,
        };

        let body = ErrorBody {
            error: ErrorDetail {
                code: code.to_string(),
                message,
                details,
            },
        };

        (status, Json(body)).into_response()
    }
}

fn field_of(err: &ValidationError) -> &'static str {
    match err {
        ValidationError::Missing { field }
        | ValidationError::TooShort { field, .. }
        | ValidationError::TooLong { field, .. }
        | ValidationError::TooMany { field, .. }
        | ValidationError::OutOfRange { field, .. }
        | ValidationError::Invalid { field, .. } => field,
    }
}

impl From<ValidationError> for AppError {
    fn from(err: ValidationError) -> Self {
        Self::Validation {
            field: Some(field_of(&err)),
            message: err.to_string(),
        }
    }
}

impl From<OrderError> for AppError {
    fn from(err: OrderError) -> Self {
        match err {
            OrderError::Validation(v) => v.into(),
            OrderError::ActorBanned { .. } | OrderError::Unauthorized { .. } => {
                Self::Forbidden(err.to_string())
            }
            OrderError::InvalidTransition { .. }
            | OrderError::AlreadyTerminal { .. }
            | OrderError::DeliveryTypeMismatch { .. }
            | OrderError::ProtectionWindowElapsed { .. }
            | OrderError::ProtectionWindowOpen { .. } => Self::Conflict(err.to_string()),
            OrderError::InvariantViolation { .. } => Self::Internal(err.to_string()),
        }
    }
}

impl From<ArbitrationError> for AppError {
    fn from(err: ArbitrationError) -> Self {
        match err {
            ArbitrationError::Validation(v) => v.into(),
            ArbitrationError::Order(o) => o.into(),
            ArbitrationError::ActorBanned { .. } | ArbitrationError::Unauthorized { .. } => {
                Self::Forbidden(err.to_string())
            }
            ArbitrationError::InvalidDisputeTransition { .. }
            | ArbitrationError::DisputeMismatch { .. }
            | ArbitrationError::ReviewNotAllowed { .. } => Self::Conflict(err.to_string()),
            ArbitrationError::EmptyEdit { .. } => Self::validation(err.to_string()),
            ArbitrationError::ReviewDeleted { review_id } => Self::NotFound(review_id.to_string()),
        }
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(_) => Self::Conflict(err.to_string()),
            StoreError::Unavailable(_) => Self::ServiceUnavailable(err.to_string()),
            StoreError::Corrupt(_) => Self::Internal(err.to_string()),
        }
    }
}

impl From<EngineError> for AppError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Validation(v) => v.into(),
            EngineError::Order(o) => o.into(),
            EngineError::Arbitration(a) => a.into(),
            EngineError::Store(s) => s.into(),
            EngineError::NotFound { what } => Self::NotFound(what),
            EngineError::Forbidden(msg) => Self::Forbidden(msg),
            EngineError::Conflict(msg) => Self::Conflict(msg),
        }
    }
}
