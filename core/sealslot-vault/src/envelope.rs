//! DEK/KEK envelope orchestration.
//!
//! Stateless helpers shared by the facade's mode transitions. Every
//! transition that touches the wrap header re-encrypts the payload, because
//! the data AAD embeds the wrap nonce and wrapped key: a bundle with a new
//! header and an old payload is unreadable by construction.

use serde_json::{json, Value};

use sealslot_crypto::{
    decrypt, encrypt, generate_dek, unwrap_key, wrap_key, SymmetricKey,
};

use crate::bundle::{
    aad_for, b64, b64_decode, data_aad, wrap_aad, AadKind, Bundle, BundleData, BundleHeader, Ctx,
    DATA_VERSION,
};
use crate::error::Result;

/// Target header for a rewrap: the salt/rounds/marker/context the new bundle
/// will carry. The wrap nonce and wrapped key are generated fresh.
pub(crate) struct HeaderPlan {
    pub salt: String,
    pub rounds: u32,
    pub master_pw: Option<bool>,
    pub ctx: Ctx,
}

impl HeaderPlan {
    /// Device wrap: no password, `rounds == 1`, empty salt.
    pub fn device() -> Self {
        Self {
            salt: String::new(),
            rounds: 1,
            master_pw: None,
            ctx: Ctx::Store,
        }
    }
}

/// Builds a fresh V3 store bundle holding an empty payload.
///
/// Returns the bundle and the DEK re-unwrapped non-extractable for use.
pub(crate) fn create_empty(
    kek: &SymmetricKey,
    storage_key: &str,
) -> Result<(Bundle, SymmetricKey)> {
    let dek = generate_dek();

    let w_aad = wrap_aad(Ctx::Store, DATA_VERSION, storage_key);
    let wrapped = wrap_key(&dek, kek, Some(&w_aad))?;
    let iv_b64 = b64(&wrapped.iv);
    let wrapped_b64 = b64(&wrapped.wrapped);

    let enc = encrypt(
        &dek,
        &json!({}),
        Some(&data_aad(
            Ctx::Store,
            DATA_VERSION,
            storage_key,
            &iv_b64,
            &wrapped_b64,
        )),
    )?;

    let bundle = Bundle {
        header: BundleHeader {
            v: DATA_VERSION,
            salt: String::new(),
            rounds: 1,
            iv: iv_b64,
            wrapped_key: wrapped_b64,
            master_pw: None,
            ctx: Some(Ctx::Store),
        },
        data: BundleData {
            iv: b64(&enc.iv),
            ciphertext: b64(&enc.ciphertext),
        },
    };

    let dek_use = unwrap_key(&wrapped.iv, &wrapped.wrapped, kek, false, Some(&w_aad))?;
    Ok((bundle, dek_use))
}

/// Recovers the DEK from a bundle using the bundle's own wrap AAD.
pub(crate) fn unwrap_dek(
    bundle: &Bundle,
    kek: &SymmetricKey,
    for_wrapping: bool,
    storage_key: &str,
) -> Result<SymmetricKey> {
    let iv = b64_decode("iv", &bundle.header.iv)?;
    let wrapped = b64_decode("wrappedKey", &bundle.header.wrapped_key)?;
    let aad = aad_for(AadKind::Wrap, bundle, storage_key);
    Ok(unwrap_key(&iv, &wrapped, kek, for_wrapping, aad.as_deref())?)
}

/// Decrypts a bundle's payload under its own data AAD.
pub(crate) fn decrypt_payload(
    bundle: &Bundle,
    dek: &SymmetricKey,
    storage_key: &str,
) -> Result<Value> {
    if bundle.data.is_empty() {
        return Ok(json!({}));
    }
    let iv = b64_decode("data.iv", &bundle.data.iv)?;
    let ct = b64_decode("data.ciphertext", &bundle.data.ciphertext)?;
    let aad = aad_for(AadKind::Data, bundle, storage_key);
    Ok(decrypt(dek, &iv, &ct, aad.as_deref())?)
}

/// Rewraps a bundle under a new KEK and header.
///
/// Decrypts the payload under the current AAD, wraps the DEK with a fresh
/// nonce under the target KEK and AAD, re-encrypts the same plaintext under
/// the new header-bound data AAD, and returns the new bundle together with
/// the DEK re-unwrapped non-extractable.
///
/// `dek` must be an extractable handle (recovered with `for_wrapping`).
pub(crate) fn re_encrypt(
    current: &Bundle,
    storage_key: &str,
    dek: &SymmetricKey,
    new_kek: &SymmetricKey,
    plan: HeaderPlan,
) -> Result<(Bundle, SymmetricKey)> {
    let plaintext = decrypt_payload(current, dek, storage_key)?;

    let w_aad = wrap_aad(plan.ctx, DATA_VERSION, storage_key);
    let wrapped = wrap_key(dek, new_kek, Some(&w_aad))?;
    let iv_b64 = b64(&wrapped.iv);
    let wrapped_b64 = b64(&wrapped.wrapped);

    let enc = encrypt(
        dek,
        &plaintext,
        Some(&data_aad(
            plan.ctx,
            DATA_VERSION,
            storage_key,
            &iv_b64,
            &wrapped_b64,
        )),
    )?;

    let bundle = Bundle {
        header: BundleHeader {
            v: DATA_VERSION,
            salt: plan.salt,
            rounds: plan.rounds,
            iv: iv_b64,
            wrapped_key: wrapped_b64,
            master_pw: plan.master_pw,
            ctx: Some(plan.ctx),
        },
        data: BundleData {
            iv: b64(&enc.iv),
            ciphertext: b64(&enc.ciphertext),
        },
    };

    let dek_use = unwrap_key(&wrapped.iv, &wrapped.wrapped, new_kek, false, Some(&w_aad))?;
    Ok((bundle, dek_use))
}
