//! Cryptographic primitives for sealslot.
//!
//! Provides the envelope building blocks:
//! - AES-256-GCM authenticated encryption with optional AAD
//! - DEK wrap/unwrap under a KEK (AES-GCM over raw key bytes)
//! - Argon2id derivation of password KEKs
//! - Key handles with usage and extractability discipline
//!
//! # Architecture
//!
//! The envelope uses a two-tier key system:
//!
//! 1. **DEK** (data-encryption key): random, encrypts the user payload.
//!    Kept non-extractable while in use; re-unwrapped as extractable only
//!    for the single wrap call of a mode transition.
//! 2. **KEK** (key-encryption key): wraps the DEK. Either a random device
//!    key or derived from a password with Argon2id.
//!
//! This split allows changing the wrapping key (password rotation, device
//! key rotation) without touching the payload key.

mod cipher;
mod error;
mod kdf;
mod key;

pub use cipher::{
    decrypt, encrypt, generate_dek, generate_kek, generate_salt, unwrap_key, wrap_key,
    EncryptedPayload, WrappedKey, NONCE_SIZE, SALT_SIZE,
};
pub use error::{CryptoError, CryptoResult};
pub use kdf::{derive_kek, DEFAULT_ROUNDS, MAX_ROUNDS, MIN_ROUNDS};
pub use key::{KeyUsages, SymmetricKey, KEY_SIZE};
