//! Error types for the ledger core

use thiserror::Error;

/// Result type for ledger core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Ledger core errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Group or user absent
    #[error("Not found: {0}")]
    NotFound(String),

    /// Actor is not allowed to perform the operation
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Request violates a business rule (empty group, invalid amount, ...)
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Ledger or group storage failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// Balance cache backend failure
    #[error("Cache error: {0}")]
    Cache(String),

    /// Stored cache entry could not be decoded
    #[error("Cache entry corrupted: {0}")]
    Corrupted(String),

    /// Operation exceeded its deadline
    #[error("Operation timed out: {0}")]
    Timeout(String),
}

impl Error {
    /// Business-rule violations that are reported back to the caller as-is
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Error::NotFound(_) | Error::Forbidden(_) | Error::BadRequest(_)
        )
    }

    /// Errors raised by the balance cache, which callers must never see
    pub fn is_cache_error(&self) -> bool {
        matches!(self, Error::Cache(_) | Error::Corrupted(_))
    }
}

impl From<tokio::time::error::Elapsed> for Error {
    fn from(err: tokio::time::error::Elapsed) -> Self {
        Error::Timeout(err.to_string())
    }
}
