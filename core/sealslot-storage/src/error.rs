//! Storage error types.

use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur in the slot store and the device key database.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage quota exceeded writing {attempted} bytes")]
    Full { attempted: usize },

    #[error("write-back verification failed for {0}")]
    WriteVerification(String),

    #[error("persistence failed: {0}")]
    Persistence(String),

    #[error("key database unavailable: {0}")]
    Unavailable(String),
}
