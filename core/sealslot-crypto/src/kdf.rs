//! Argon2id KEK derivation.
//!
//! Parameters are fixed: 64 MiB of memory, a single lane, 32-byte output.
//! Only the time cost (`rounds`) varies, and it is persisted in the bundle
//! header so older bundles keep unwrapping after the default changes.

use argon2::{Algorithm, Argon2, Params, Version};
use zeroize::Zeroizing;

use crate::cipher::SALT_SIZE;
use crate::error::{CryptoError, CryptoResult};
use crate::key::{KeyUsages, SymmetricKey, KEY_SIZE};

/// Default Argon2id time cost for freshly created password headers.
pub const DEFAULT_ROUNDS: u32 = 20;

/// Lowest accepted time cost.
pub const MIN_ROUNDS: u32 = 1;

/// Highest accepted time cost.
pub const MAX_ROUNDS: u32 = 64;

const MEMORY_KIB: u32 = 65536;
const PARALLELISM: u32 = 1;

/// Derives a non-extractable wrap/unwrap KEK from a password.
///
/// The password is passed to Argon2id verbatim; trimming is applied only to
/// detect blank passwords, never to the derivation input.
pub fn derive_kek(password: &str, salt: &[u8], rounds: u32) -> CryptoResult<SymmetricKey> {
    if password.trim().is_empty() {
        return Err(CryptoError::EmptyPassword);
    }
    if salt.len() != SALT_SIZE {
        return Err(CryptoError::InvalidSaltLength {
            expected: SALT_SIZE,
            actual: salt.len(),
        });
    }
    if !(MIN_ROUNDS..=MAX_ROUNDS).contains(&rounds) {
        return Err(CryptoError::InvalidRounds {
            min: MIN_ROUNDS,
            max: MAX_ROUNDS,
            got: rounds,
        });
    }

    let params = Params::new(MEMORY_KIB, rounds, PARALLELISM, Some(KEY_SIZE))
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

    let mut output = Zeroizing::new([0u8; KEY_SIZE]);
    argon2
        .hash_password_into(password.as_bytes(), salt, &mut *output)
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;

    Ok(SymmetricKey::from_bytes(*output, KeyUsages::wrapping(), false))
}
