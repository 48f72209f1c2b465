//! The persisted and exported bundle format.
//!
//! Two immutable variants exist on disk: the legacy V2 shape (no AAD, no
//! context tag) and the current V3 shape, where every ciphertext is bound to
//! its header and storage context through additional authenticated data.
//!
//! The data AAD includes the wrap nonce and the wrapped key, so replacing
//! any header field invalidates the payload ciphertext: a bundle cannot be
//! assembled from parts of two valid bundles.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// The on-disk version every emitted header carries.
pub const DATA_VERSION: u8 = 3;

/// Legacy version still accepted for reading and import.
pub const LEGACY_VERSION: u8 = 2;

/// Largest serialized bundle accepted by import, checked before parsing.
pub const MAX_IMPORT_BYTES: usize = 2 * 1024 * 1024;

/// Largest base64 field accepted, checked before decoding.
pub const MAX_FIELD_BYTES: usize = 1024 * 1024;

/// Where a bundle lives, which decides the AAD root.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Ctx {
    #[serde(rename = "store")]
    Store,
    #[serde(rename = "export")]
    Export,
}

/// Wrap header: everything needed to recover the DEK given the right KEK.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BundleHeader {
    pub v: u8,
    /// KDF salt, base64. Empty exactly when `rounds == 1` (device wrap).
    pub salt: String,
    /// Argon2id time cost; 1 marks a device wrap.
    pub rounds: u32,
    /// Wrap nonce, base64.
    pub iv: String,
    /// DEK wrapped under the KEK, base64.
    #[serde(rename = "wrappedKey")]
    pub wrapped_key: String,
    /// Explicit master-password marker. Absent on device bundles; `false`
    /// marks a custom-password export despite `rounds > 1`.
    #[serde(rename = "mPw", skip_serializing_if = "Option::is_none")]
    pub master_pw: Option<bool>,
    /// V3 only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ctx: Option<Ctx>,
}

/// Encrypted payload section. Both fields empty means an empty payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BundleData {
    pub iv: String,
    pub ciphertext: String,
}

impl BundleData {
    pub fn is_empty(&self) -> bool {
        self.iv.is_empty() && self.ciphertext.is_empty()
    }
}

/// A complete persisted or exported bundle.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Bundle {
    pub header: BundleHeader,
    pub data: BundleData,
}

impl Bundle {
    pub fn is_v2(&self) -> bool {
        self.header.v == LEGACY_VERSION
    }

    pub fn is_v3(&self) -> bool {
        self.header.v == DATA_VERSION
    }

    /// Lenient parse used on load: anything malformed reads as absent.
    pub fn parse(serialized: &str) -> Option<Bundle> {
        serde_json::from_str(serialized).ok()
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| Error::Persistence(e.to_string()))
    }
}

/// A bundle is master-protected unless it is a device wrap (`rounds == 1`)
/// or explicitly marked as a custom-password export (`mPw == false`).
pub fn is_master_protected(header: &BundleHeader) -> bool {
    header.master_pw == Some(true)
        || (header.rounds > 1 && header.master_pw != Some(false))
}

// ============================================================================
// Validation
// ============================================================================

fn check_b64(field: &'static str, value: &str) -> std::result::Result<Vec<u8>, String> {
    if value.len() > MAX_FIELD_BYTES {
        return Err(format!("{field} exceeds {MAX_FIELD_BYTES} bytes"));
    }
    BASE64
        .decode(value)
        .map_err(|_| format!("{field} is not valid base64"))
}

/// Full structural and semantic check of a bundle.
///
/// `local` marks a bundle read from or destined for the local slot, which
/// must not carry the export context.
pub fn validate(bundle: &Bundle, local: bool) -> std::result::Result<(), String> {
    let h = &bundle.header;

    if h.v != LEGACY_VERSION && h.v != DATA_VERSION {
        return Err(format!("unsupported version {}", h.v));
    }

    if h.rounds < 1 {
        return Err("rounds must be a positive integer".into());
    }
    if h.rounds == 1 && !h.salt.is_empty() {
        return Err("device wrap (rounds == 1) must have an empty salt".into());
    }
    if h.rounds > 1 {
        if h.salt.is_empty() {
            return Err("password wrap (rounds > 1) requires a salt".into());
        }
        check_b64("salt", &h.salt)?;
    }

    if h.iv.is_empty() {
        return Err("wrap nonce must not be empty".into());
    }
    check_b64("iv", &h.iv)?;
    if h.wrapped_key.is_empty() {
        return Err("wrapped key must not be empty".into());
    }
    check_b64("wrappedKey", &h.wrapped_key)?;

    let d = &bundle.data;
    match (d.iv.is_empty(), d.ciphertext.is_empty()) {
        (true, true) => {}
        (false, false) => {
            check_b64("data.iv", &d.iv)?;
            check_b64("data.ciphertext", &d.ciphertext)?;
        }
        _ => return Err("data.iv and data.ciphertext must both be set or both empty".into()),
    }

    if h.v == DATA_VERSION {
        match h.ctx {
            None => return Err("v3 bundle requires a ctx".into()),
            Some(Ctx::Export) if local => {
                return Err("locally persisted bundle must have ctx == \"store\"".into())
            }
            Some(_) => {}
        }
    }

    Ok(())
}

// ============================================================================
// AAD construction
// ============================================================================

/// Which ciphertext an AAD binds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AadKind {
    Wrap,
    Data,
}

fn aad_root<'a>(ctx: Ctx, storage_key: &'a str) -> &'a str {
    match ctx {
        Ctx::Store => storage_key,
        Ctx::Export => "export",
    }
}

/// AAD binding the wrapped DEK to `(version, ctx, root)`.
pub fn wrap_aad(ctx: Ctx, version: u8, storage_key: &str) -> Vec<u8> {
    format!("sls|wrap|v{version}|{}", aad_root(ctx, storage_key)).into_bytes()
}

/// AAD binding the payload to the wrap header fields as well.
pub fn data_aad(
    ctx: Ctx,
    version: u8,
    storage_key: &str,
    iv_b64: &str,
    wrapped_key_b64: &str,
) -> Vec<u8> {
    format!(
        "sls|data|v{version}|{}|{iv_b64}|{wrapped_key_b64}",
        aad_root(ctx, storage_key)
    )
    .into_bytes()
}

/// The AAD for one of the bundle's two ciphertexts. `None` for V2 bundles,
/// which predate AAD binding.
pub fn aad_for(kind: AadKind, bundle: &Bundle, storage_key: &str) -> Option<Vec<u8>> {
    if !bundle.is_v3() {
        return None;
    }
    let ctx = bundle.header.ctx?;
    Some(match kind {
        AadKind::Wrap => wrap_aad(ctx, bundle.header.v, storage_key),
        AadKind::Data => data_aad(
            ctx,
            bundle.header.v,
            storage_key,
            &bundle.header.iv,
            &bundle.header.wrapped_key,
        ),
    })
}

// ============================================================================
// Base64 helpers for the bundle boundary
// ============================================================================

pub(crate) fn b64(bytes: &[u8]) -> String {
    BASE64.encode(bytes)
}

pub(crate) fn b64_decode(field: &'static str, value: &str) -> Result<Vec<u8>> {
    check_b64(field, value).map_err(Error::Validation)
}
