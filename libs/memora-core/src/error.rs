//! Error types for memora-core.

use thiserror::Error;

/// Result type alias using CoreError.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors raised while converting wire data into engine records.
///
/// Scheduling, selection and matching are total and never fail.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CoreError {
    #[error("invalid date: {0}")]
    InvalidDate(String),

    #[error("invalid question index {0}")]
    InvalidQuestionIndex(i64),
}
