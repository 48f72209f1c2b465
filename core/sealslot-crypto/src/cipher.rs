//! AES-256-GCM encryption, decryption, and DEK wrap/unwrap.
//!
//! All inputs and outputs are logical bytes; base64 framing happens at the
//! bundle boundary, not here. Every operation validates the key's usages and
//! the nonce shape before invoking the primitive, so malformed arguments are
//! reported as validation problems instead of opaque cipher failures.

use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Nonce};
use rand::rngs::OsRng;
use rand::RngCore;
use serde_json::Value;
use zeroize::Zeroizing;

use crate::error::{CryptoError, CryptoResult};
use crate::key::{KeyUsages, SymmetricKey, KEY_SIZE};

/// AES-GCM nonce length in bytes.
pub const NONCE_SIZE: usize = 12;

/// KDF salt length in bytes.
pub const SALT_SIZE: usize = 16;

/// An encrypted payload: random nonce plus ciphertext (tag included).
#[derive(Clone, Debug)]
pub struct EncryptedPayload {
    pub iv: [u8; NONCE_SIZE],
    pub ciphertext: Vec<u8>,
}

/// A wrapped key: random wrap nonce plus the encrypted key material.
#[derive(Clone, Debug)]
pub struct WrappedKey {
    pub iv: [u8; NONCE_SIZE],
    pub wrapped: Vec<u8>,
}

/// Generates a random KDF salt.
pub fn generate_salt() -> [u8; SALT_SIZE] {
    let mut salt = [0u8; SALT_SIZE];
    OsRng.fill_bytes(&mut salt);
    salt
}

/// Generates a fresh data-encryption key.
///
/// The DEK is created extractable with all four usages so it can be wrapped
/// under a KEK immediately after generation.
pub fn generate_dek() -> SymmetricKey {
    let mut bytes = [0u8; KEY_SIZE];
    OsRng.fill_bytes(&mut bytes);
    SymmetricKey::from_bytes(bytes, KeyUsages::all(), true)
}

/// Generates a fresh non-extractable key-encryption key.
pub fn generate_kek() -> SymmetricKey {
    let mut bytes = [0u8; KEY_SIZE];
    OsRng.fill_bytes(&mut bytes);
    SymmetricKey::from_bytes(bytes, KeyUsages::wrapping(), false)
}

fn random_nonce() -> [u8; NONCE_SIZE] {
    let mut nonce = [0u8; NONCE_SIZE];
    OsRng.fill_bytes(&mut nonce);
    nonce
}

fn check_nonce(iv: &[u8]) -> CryptoResult<()> {
    if iv.is_empty() {
        return Err(CryptoError::EmptyInput("nonce"));
    }
    if iv.len() != NONCE_SIZE {
        return Err(CryptoError::InvalidNonceLength {
            expected: NONCE_SIZE,
            actual: iv.len(),
        });
    }
    Ok(())
}

/// Serializes and encrypts a JSON payload under `key`, binding `aad` into the
/// authentication tag when given.
pub fn encrypt(
    key: &SymmetricKey,
    payload: &Value,
    aad: Option<&[u8]>,
) -> CryptoResult<EncryptedPayload> {
    key.require_usage(key.usages().encrypt, "encrypt")?;

    let plaintext =
        serde_json::to_vec(payload).map_err(|e| CryptoError::Serialization(e.to_string()))?;

    let cipher = Aes256Gcm::new_from_slice(key.expose())
        .map_err(|e| CryptoError::Encryption(e.to_string()))?;
    let iv = random_nonce();
    let ciphertext = cipher
        .encrypt(
            Nonce::from_slice(&iv),
            Payload {
                msg: &plaintext,
                aad: aad.unwrap_or(&[]),
            },
        )
        .map_err(|e| CryptoError::Encryption(e.to_string()))?;

    Ok(EncryptedPayload { iv, ciphertext })
}

/// Decrypts and JSON-parses a payload.
///
/// Fails with [`CryptoError::AuthenticationFailed`] on tag mismatch (wrong
/// key, tampered ciphertext, or mismatched AAD) and with
/// [`CryptoError::InvalidPlaintext`] if the decrypted bytes are not JSON.
pub fn decrypt(
    key: &SymmetricKey,
    iv: &[u8],
    ciphertext: &[u8],
    aad: Option<&[u8]>,
) -> CryptoResult<Value> {
    key.require_usage(key.usages().decrypt, "decrypt")?;
    check_nonce(iv)?;
    if ciphertext.is_empty() {
        return Err(CryptoError::EmptyInput("ciphertext"));
    }

    let cipher = Aes256Gcm::new_from_slice(key.expose())
        .map_err(|e| CryptoError::Encryption(e.to_string()))?;
    let plaintext = cipher
        .decrypt(
            Nonce::from_slice(iv),
            Payload {
                msg: ciphertext,
                aad: aad.unwrap_or(&[]),
            },
        )
        .map_err(|_| CryptoError::AuthenticationFailed)?;

    serde_json::from_slice(&plaintext).map_err(|e| CryptoError::InvalidPlaintext(e.to_string()))
}

/// Wraps a DEK's raw bytes under a KEK.
///
/// The DEK must be extractable; the KEK must carry the wrap usage.
pub fn wrap_key(
    dek: &SymmetricKey,
    kek: &SymmetricKey,
    aad: Option<&[u8]>,
) -> CryptoResult<WrappedKey> {
    kek.require_usage(kek.usages().wrap, "wrap")?;
    let raw = dek.expose_extractable()?;

    let cipher = Aes256Gcm::new_from_slice(kek.expose())
        .map_err(|e| CryptoError::Encryption(e.to_string()))?;
    let iv = random_nonce();
    let wrapped = cipher
        .encrypt(
            Nonce::from_slice(&iv),
            Payload {
                msg: raw.as_slice(),
                aad: aad.unwrap_or(&[]),
            },
        )
        .map_err(|e| CryptoError::Encryption(e.to_string()))?;

    Ok(WrappedKey { iv, wrapped })
}

/// Unwraps a DEK.
///
/// With `for_wrapping` the returned handle is extractable and carries all
/// four usages so it can be re-wrapped under a different KEK; otherwise it is
/// non-extractable and restricted to data encryption.
pub fn unwrap_key(
    iv: &[u8],
    wrapped: &[u8],
    kek: &SymmetricKey,
    for_wrapping: bool,
    aad: Option<&[u8]>,
) -> CryptoResult<SymmetricKey> {
    kek.require_usage(kek.usages().unwrap, "unwrap")?;
    check_nonce(iv)?;
    if wrapped.is_empty() {
        return Err(CryptoError::EmptyInput("wrapped key"));
    }

    let cipher = Aes256Gcm::new_from_slice(kek.expose())
        .map_err(|e| CryptoError::Encryption(e.to_string()))?;
    let raw = Zeroizing::new(
        cipher
            .decrypt(
                Nonce::from_slice(iv),
                Payload {
                    msg: wrapped,
                    aad: aad.unwrap_or(&[]),
                },
            )
            .map_err(|_| CryptoError::AuthenticationFailed)?,
    );

    if raw.len() != KEY_SIZE {
        return Err(CryptoError::InvalidKeyLength {
            expected: KEY_SIZE,
            actual: raw.len(),
        });
    }
    let mut bytes = [0u8; KEY_SIZE];
    bytes.copy_from_slice(&raw);

    let (usages, extractable) = if for_wrapping {
        (KeyUsages::all(), true)
    } else {
        (KeyUsages::data(), false)
    };
    Ok(SymmetricKey::from_bytes(bytes, usages, extractable))
}
