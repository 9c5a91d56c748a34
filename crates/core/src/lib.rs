//! Shared primitives for all retention sweep crates.

#![forbid(unsafe_code)]

use thiserror::Error;

/// Result type used across retention sweep crates.
pub type AppResult<T> = Result<T, AppError>;

/// Common application error categories.
#[derive(Debug, Error)]
pub enum AppError {
    /// Invalid input, configuration, or violated invariant.
    #[error("validation error: {0}")]
    Validation(String),

    /// Backing infrastructure could not be reached or stopped accepting work.
    #[error("unavailable: {0}")]
    Unavailable(String),

    /// The store schema does not match what the sweep expects.
    #[error("schema error: {0}")]
    Schema(String),

    /// Internal unexpected error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Returns true when repeating the same operation later may succeed.
    ///
    /// Only [`AppError::Unavailable`] is retriable; schema mismatches and
    /// unexpected query failures need an operator.
    #[must_use]
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }

    /// Returns a stable label for structured logs.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Unavailable(_) => "unavailable",
            Self::Schema(_) => "schema",
            Self::Internal(_) => "internal",
        }
    }
}
