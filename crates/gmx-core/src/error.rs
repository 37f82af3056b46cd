//! # Error Types: Input Validation
//!
//! Validation failures are detected before any read or write touches the
//! store. Each variant names the offending field and the bound it violated
//! so the HTTP layer can surface an inline, field-specific message.

use thiserror::Error;

/// A request input failed a business-rule bound.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// A required field was missing or blank.
    #[error("{field} is required")]
    Missing {
        /// Field name.
        field: &'static str,
    },

    /// A text field is shorter than allowed.
    #[error("{field} must be at least {min} characters, got {actual}")]
    TooShort {
        /// Field name.
        field: &'static str,
        /// Minimum character count.
        min: usize,
        /// Actual character count.
        actual: usize,
    },

    /// A text field is longer than allowed.
    #[error("{field} must be at most {max} characters, got {actual}")]
    TooLong {
        /// Field name.
        field: &'static str,
        /// Maximum character count.
        max: usize,
        /// Actual character count.
        actual: usize,
    },

    /// A list holds more items than allowed.
    #[error("{field} accepts at most {max} items, got {actual}")]
    TooMany {
        /// Field name.
        field: &'static str,
        /// Maximum item count.
        max: usize,
        /// Actual item count.
        actual: usize,
    },

    /// A numeric field is outside its permitted range.
    #[error("{field} must be between {min} and {max}, got {actual}")]
    OutOfRange {
        /// Field name.
        field: &'static str,
        /// Inclusive lower bound.
        min: i64,
        /// Inclusive upper bound.
        max: i64,
        /// Supplied value.
        actual: i64,
    },

    /// A field holds a value outside its accepted vocabulary or format.
    #[error("{field} is invalid: {reason}")]
    Invalid {
        /// Field name.
        field: &'static str,
        /// Why it was rejected.
        reason: String,
    },
}

/// Check the character length of `value` against inclusive bounds.
///
/// Length is counted in Unicode scalar values, matching what a user sees in
/// a text box rather than the UTF-8 byte length.
pub fn check_length(
    field: &'static str,
    value: &str,
    min: usize,
    max: usize,
) -> Result<(), ValidationError> {
    let actual = value.chars().count();
    if actual < min {
        return Err(ValidationError::TooShort { field, min, actual });
    }
    if actual > max {
        return Err(ValidationError::TooLong { field, max, actual });
    }
    Ok(())
}
