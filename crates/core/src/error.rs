use thiserror::Error;

/// Errors raised when persisted values cannot be turned into domain types.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ModelError {
    #[error("invalid completion status: {0}")]
    InvalidCompletionStatus(String),

    #[error("invalid enrollment status: {0}")]
    InvalidEnrollmentStatus(String),

    #[error("progress percentage must be in 0..=100, got {0}")]
    InvalidPercentage(u32),
}
