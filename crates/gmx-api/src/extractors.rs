//! # Request Extraction
//!
//! Handlers take their body as `Result<Json<T>, JsonRejection>` so that a
//! malformed body renders through [`AppError`] like every other failure,
//! instead of axum's plain-text rejection.

use axum::extract::rejection::JsonRejection;
use axum::Json;

use gmx_core::ValidationError;

use crate::error::AppError;

/// Request types with rules beyond what deserialization checks.
pub trait Validate {
    fn validate(&self) -> Result<(), ValidationError>;
}

/// Extract a JSON body, mapping deserialization errors to [`AppError::BadRequest`].
pub fn extract_json<T>(result: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    result
        .map(|Json(v)| v)
        .map_err(|err| AppError::BadRequest(err.body_text()))
}

/// Extract a body that may be omitted. A request sent without a JSON
/// content type yields `T::default()`.
pub fn extract_optional_json<T: Default>(
    result: Result<Json<T>, JsonRejection>,
) -> Result<T, AppError> {
    match result {
        Err(JsonRejection::MissingJsonContentType(_)) => Ok(T::default()),
        other => extract_json(other),
    }
}

/// Extract a JSON body and run its [`Validate`] rules.
pub fn extract_validated_json<T: Validate>(
    result: Result<Json<T>, JsonRejection>,
) -> Result<T, AppError> {
    let value = extract_json(result)?;
    value.validate()?;
    Ok(value)
}
