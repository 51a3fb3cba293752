//! Error types for study-core.

use thiserror::Error;

/// Result type alias using ScheduleError.
pub type Result<T> = std::result::Result<T, ScheduleError>;

/// Errors raised while validating review input.
#[derive(Debug, Error, PartialEq)]
pub enum ScheduleError {
    #[error("grade must be 0-3, got {0}")]
    InvalidGrade(i64),

    #[error("timezone offset must be between -12 and +14 hours, got {0}")]
    InvalidTimezoneOffset(f64),
}
