//! Crypto error types.

use thiserror::Error;

/// Result type for crypto operations.
pub type CryptoResult<T> = Result<T, CryptoError>;

/// Errors raised by the cipher and KDF primitives.
///
/// Argument-shape problems (bad nonce length, missing usages, empty inputs,
/// non-JSON plaintext) are distinguished from cryptographic failures
/// (authentication, key derivation) via [`CryptoError::is_validation`], so
/// callers can surface them under the right public error class.
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("nonce must be {expected} bytes, got {actual}")]
    InvalidNonceLength { expected: usize, actual: usize },

    #[error("{0} must not be empty")]
    EmptyInput(&'static str),

    #[error("key does not permit {0}")]
    UsageNotPermitted(&'static str),

    #[error("key material is not extractable")]
    NotExtractable,

    #[error("invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },

    #[error("salt must be {expected} bytes, got {actual}")]
    InvalidSaltLength { expected: usize, actual: usize },

    #[error("rounds must be in [{min}, {max}], got {got}")]
    InvalidRounds { min: u32, max: u32, got: u32 },

    #[error("password must not be empty")]
    EmptyPassword,

    #[error("decrypted payload is not valid JSON: {0}")]
    InvalidPlaintext(String),

    #[error("serialization failed: {0}")]
    Serialization(String),

    #[error("encryption failed: {0}")]
    Encryption(String),

    #[error("decryption failed (wrong key or tampered data)")]
    AuthenticationFailed,

    #[error("key derivation failed: {0}")]
    KeyDerivation(String),
}

impl CryptoError {
    /// Whether this error is an argument-shape problem rather than a
    /// cryptographic failure.
    pub fn is_validation(&self) -> bool {
        !matches!(
            self,
            CryptoError::Encryption(_)
                | CryptoError::AuthenticationFailed
                | CryptoError::KeyDerivation(_)
                | CryptoError::InvalidKeyLength { .. }
        )
    }
}
