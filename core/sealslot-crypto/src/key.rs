//! Symmetric key handles.
//!
//! A [`SymmetricKey`] carries its 32 raw bytes privately (zeroized on drop)
//! together with the usages it was created for and an extractability flag.
//! Cipher operations check the flags before touching the key material, so a
//! wrapping-only KEK can never be used for data encryption and a
//! non-extractable DEK can never be wrapped again without an explicit
//! re-unwrap as extractable.

use std::fmt;

use zeroize::Zeroizing;

use crate::error::{CryptoError, CryptoResult};

/// Symmetric key length in bytes (AES-256).
pub const KEY_SIZE: usize = 32;

/// The operations a key handle is permitted to perform.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct KeyUsages {
    pub encrypt: bool,
    pub decrypt: bool,
    pub wrap: bool,
    pub unwrap: bool,
}

impl KeyUsages {
    /// Key-wrapping only: the usages of a KEK.
    pub const fn wrapping() -> Self {
        Self {
            encrypt: false,
            decrypt: false,
            wrap: true,
            unwrap: true,
        }
    }

    /// Data encryption only: the usages of a working DEK.
    pub const fn data() -> Self {
        Self {
            encrypt: true,
            decrypt: true,
            wrap: false,
            unwrap: false,
        }
    }

    /// All four usages: a freshly generated or re-unwrapped-for-wrapping DEK.
    pub const fn all() -> Self {
        Self {
            encrypt: true,
            decrypt: true,
            wrap: true,
            unwrap: true,
        }
    }
}

/// A 256-bit AES-GCM key handle.
#[derive(Clone)]
pub struct SymmetricKey {
    bytes: Zeroizing<[u8; KEY_SIZE]>,
    usages: KeyUsages,
    extractable: bool,
}

impl SymmetricKey {
    /// Builds a key handle from raw bytes.
    pub fn from_bytes(bytes: [u8; KEY_SIZE], usages: KeyUsages, extractable: bool) -> Self {
        Self {
            bytes: Zeroizing::new(bytes),
            usages,
            extractable,
        }
    }

    pub fn usages(&self) -> KeyUsages {
        self.usages
    }

    pub fn is_extractable(&self) -> bool {
        self.extractable
    }

    /// Raw key material for the cipher implementation.
    pub(crate) fn expose(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }

    /// Raw key material, only for extractable handles.
    pub(crate) fn expose_extractable(&self) -> CryptoResult<&[u8; KEY_SIZE]> {
        if !self.extractable {
            return Err(CryptoError::NotExtractable);
        }
        Ok(&self.bytes)
    }

    pub(crate) fn require_usage(
        &self,
        permitted: bool,
        op: &'static str,
    ) -> CryptoResult<()> {
        if !permitted {
            return Err(CryptoError::UsageNotPermitted(op));
        }
        Ok(())
    }
}

impl fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SymmetricKey")
            .field("usages", &self.usages)
            .field("extractable", &self.extractable)
            .finish_non_exhaustive()
    }
}
