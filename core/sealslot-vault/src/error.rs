//! Public error taxonomy.

use sealslot_crypto::CryptoError;
use sealslot_storage::StorageError;
use thiserror::Error;

/// Result type for vault operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Every failure a vault operation can surface.
#[derive(Debug, Error)]
pub enum Error {
    /// Bad argument shape: wrong payload type, malformed base64 or JSON,
    /// blank password, wrong key usages, or an incorrect unlock password.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The operation requires an unlocked session.
    #[error("store is locked")]
    Locked,

    /// The operation is not legal in the current protection mode.
    #[error("operation not allowed in current mode: {0}")]
    Mode(String),

    /// The backing store rejected the write for lack of space.
    #[error("storage quota exceeded: attempted to write {attempted} bytes")]
    StorageFull { attempted: usize },

    /// The write-back check failed or an unclassified store error occurred.
    /// In-RAM state may be ahead of what is persisted.
    #[error("persistence failed: {0}")]
    Persistence(String),

    /// Authentication failure or primitive rejection: tampering or wrong key.
    #[error("crypto failure: {0}")]
    Crypto(String),

    /// Any structural, semantic, size, or authentication failure during import.
    #[error("import failed: {0}")]
    Import(String),

    /// A required export password is missing or blank.
    #[error("export failed: {0}")]
    Export(String),

    /// The device key store is unavailable beyond the in-memory fallback.
    #[error("not supported: {0}")]
    NotSupported(String),
}

impl From<CryptoError> for Error {
    fn from(e: CryptoError) -> Self {
        if e.is_validation() {
            Error::Validation(e.to_string())
        } else {
            Error::Crypto(e.to_string())
        }
    }
}

impl From<StorageError> for Error {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::Full { attempted } => Error::StorageFull { attempted },
            StorageError::Unavailable(msg) => Error::NotSupported(msg),
            StorageError::WriteVerification(target) => {
                Error::Persistence(format!("write-back verification failed for {target}"))
            }
            StorageError::Persistence(msg) => Error::Persistence(msg),
        }
    }
}
