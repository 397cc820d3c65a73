//! Persistence error types

use alicerce_core::error_boundary;
use thiserror::Error;

/// Result type for persistence operations
pub type Result<T> = std::result::Result<T, PersistenceError>;

/// Errors that can occur in persistence operations
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// Reading or writing the backing files failed.
    #[error("persistence I/O error: {0}")]
    Io(#[source] std::io::Error),

    /// The disk cache directory is unavailable, only memory is in use.
    #[error("disk cache is disabled")]
    DiskCacheDisabled,

    /// The key can't be mapped to a storage location.
    #[error("invalid persistence key: {0:?}")]
    InvalidKey(String),

    /// The store was created outside of a tokio runtime.
    #[error("no tokio runtime available to run disk operations")]
    NoRuntime,
}

error_boundary!(std::io::Error => PersistenceError, |e| PersistenceError::Io(e));
