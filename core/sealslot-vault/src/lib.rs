//! Envelope-encrypted single-slot JSON store.
//!
//! Persists one JSON object, encrypted at rest, in a single string slot.
//! Two protection modes:
//!
//! 1. **Device mode**: the payload key (DEK) is wrapped by a random device
//!    KEK kept in the device key store. No password; data is bound to the
//!    device namespace.
//! 2. **Master-password mode**: the DEK is wrapped by a KEK derived from a
//!    user password with Argon2id. The store can be locked and unlocked.
//!
//! The DEK/KEK split means password changes and device-key rotation rewrap
//! one key instead of bulk re-encrypting, though every header change still
//! re-encrypts the (single-object) payload so the data ciphertext stays
//! bound to its header through AAD.
//!
//! Bundles can be exported for transport (master password or a one-off
//! custom password) and imported elsewhere, and legacy V2 bundles upgrade to
//! the V3 AAD-bound format on first use.

mod bundle;
mod envelope;
mod error;
mod payload;
mod portability;
mod session;
mod view;

pub use bundle::{
    aad_for, data_aad, is_master_protected, validate, wrap_aad, AadKind, Bundle, BundleData,
    BundleHeader, Ctx, DATA_VERSION, LEGACY_VERSION, MAX_FIELD_BYTES, MAX_IMPORT_BYTES,
};
pub use error::{Error, Result};
pub use portability::ImportOutcome;
pub use view::SecureDataView;

pub use sealslot_crypto::{DEFAULT_ROUNDS, MAX_ROUNDS, MIN_ROUNDS};
pub use sealslot_storage::{
    DeviceKeyProvider, FileKeyDatabase, FileSlot, KeyDatabase, KeyNamespace, MemorySlot, SlotStore,
};

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use sealslot_crypto::{derive_kek, encrypt, generate_salt, SymmetricKey};

use crate::bundle::{b64, b64_decode};
use crate::envelope::HeaderPlan;
use crate::portability::ImportClass;
use crate::session::SessionCache;

// ============================================================================
// Options and state tags
// ============================================================================

/// Construction options for a [`SealedStore`].
#[derive(Clone, Debug)]
pub struct StoreOptions {
    /// Slot name; also the AAD root of every store-context ciphertext.
    pub storage_key: String,
    /// Namespace of the device KEK record.
    pub key_namespace: KeyNamespace,
    /// Argon2id time cost for freshly created password headers, in [2, 64].
    pub master_rounds: u32,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            storage_key: "sls:data".into(),
            key_namespace: KeyNamespace::new("sls-keys", "device-keys", "primary"),
            master_rounds: DEFAULT_ROUNDS,
        }
    }
}

/// Current protection mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    /// Device KEK wraps the DEK; no password involved.
    Device,
    /// Master-protected and no session key in memory.
    Locked,
    /// Master-protected with the derived KEK cached for this session.
    Master,
}

/// Why initialization created a fresh store instead of loading.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResetReason {
    /// The persisted bundle was missing required structure or failed validation.
    InvalidConfig,
    /// The device KEK could not unwrap the persisted device bundle.
    DeviceKekMismatch,
}

// ============================================================================
// SealedStore
// ============================================================================

/// The public facade: one encrypted JSON object in one slot.
///
/// All state-changing operations take `&mut self`; callers that share a
/// store across threads serialize access themselves.
pub struct SealedStore {
    options: StoreOptions,
    slot: Box<dyn SlotStore>,
    device_keys: Arc<DeviceKeyProvider>,
    session: SessionCache,
    bundle: Bundle,
    dek: Option<SymmetricKey>,
    mode: Mode,
    last_reset_reason: Option<ResetReason>,
}

impl SealedStore {
    /// The on-disk version of every bundle this store writes.
    pub const DATA_VERSION: u8 = DATA_VERSION;

    /// Opens the store, loading or creating the persisted bundle.
    ///
    /// A valid device bundle is unwrapped immediately (migrating V2 to V3);
    /// a master-protected bundle leaves the store locked; anything invalid
    /// is replaced by a fresh empty store with the reset reason recorded.
    pub fn open(
        options: StoreOptions,
        slot: Box<dyn SlotStore>,
        device_keys: Arc<DeviceKeyProvider>,
    ) -> Result<Self> {
        if !(2..=MAX_ROUNDS).contains(&options.master_rounds) {
            return Err(Error::Validation(format!(
                "master_rounds must be in [2, {MAX_ROUNDS}]"
            )));
        }

        let init = initialize(&options, slot.as_ref(), &device_keys, false)?;
        Ok(Self {
            options,
            slot,
            device_keys,
            session: SessionCache::default(),
            bundle: init.bundle,
            dek: init.dek,
            mode: init.mode,
            last_reset_reason: init.reset_reason,
        })
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn is_locked(&self) -> bool {
        self.mode == Mode::Locked
    }

    /// Whether the persisted bundle is protected by a master password,
    /// locked or not.
    pub fn is_using_master_password(&self) -> bool {
        self.mode != Mode::Device
    }

    /// Why initialization created a fresh store, if it did.
    pub fn last_reset_reason(&self) -> Option<ResetReason> {
        self.last_reset_reason
    }

    pub fn storage_key(&self) -> &str {
        &self.options.storage_key
    }

    // ------------------------------------------------------------------
    // Data access
    // ------------------------------------------------------------------

    /// Decrypts the payload and returns a wipeable view of it.
    pub fn get_data(&self) -> Result<SecureDataView> {
        let dek = self.require_unlocked_dek()?;
        let value = envelope::decrypt_payload(&self.bundle, dek, &self.options.storage_key)?;
        Ok(SecureDataView::new(payload::require_object(value)?))
    }

    /// Replaces the payload. The value must serialize to a plain JSON object.
    pub fn set_data<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<()> {
        let dek = self.require_unlocked_dek()?;
        let map = payload::to_plain_object(value)?;

        let aad = aad_for(AadKind::Data, &self.bundle, &self.options.storage_key);
        let enc = encrypt(dek, &Value::Object(map), aad.as_deref())?;

        let mut bundle = self.bundle.clone();
        bundle.data = BundleData {
            iv: b64(&enc.iv),
            ciphertext: b64(&enc.ciphertext),
        };
        self.persist(&bundle)?;
        self.bundle = bundle;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Master password lifecycle
    // ------------------------------------------------------------------

    /// Moves the store from device mode to master-password mode.
    pub fn set_master_password(&mut self, password: &str) -> Result<()> {
        match self.mode {
            Mode::Locked => Err(Error::Locked),
            Mode::Master => Err(Error::Mode("a master password is already set".into())),
            Mode::Device => {
                if password.trim().is_empty() {
                    return Err(Error::Validation("password must not be empty".into()));
                }
                let device_kek = self.device_keys.get_key(&self.options.key_namespace)?;
                let dek_x = envelope::unwrap_dek(
                    &self.bundle,
                    &device_kek,
                    true,
                    &self.options.storage_key,
                )?;

                let salt = generate_salt();
                let salt_b64 = b64(&salt);
                let rounds = self.options.master_rounds;
                let kek = derive_kek(password, &salt, rounds)?;

                let (bundle, dek_use) = envelope::re_encrypt(
                    &self.bundle,
                    &self.options.storage_key,
                    &dek_x,
                    &kek,
                    HeaderPlan {
                        salt: salt_b64.clone(),
                        rounds,
                        master_pw: Some(true),
                        ctx: Ctx::Store,
                    },
                )?;
                self.persist(&bundle)?;
                self.bundle = bundle;
                self.dek = Some(dek_use);
                self.session.set(kek, &salt_b64, rounds);
                self.mode = Mode::Master;
                debug!("master password enabled");
                Ok(())
            }
        }
    }

    /// Moves the store back to device mode. Requires an unlocked session.
    pub fn remove_master_password(&mut self) -> Result<()> {
        match self.mode {
            Mode::Device => Err(Error::Mode("no master password is set".into())),
            Mode::Locked => Err(Error::Locked),
            Mode::Master => {
                let kek = self.session_kek()?;
                let dek_x =
                    envelope::unwrap_dek(&self.bundle, &kek, true, &self.options.storage_key)?;
                let device_kek = self.device_keys.get_key(&self.options.key_namespace)?;

                let (bundle, dek_use) = envelope::re_encrypt(
                    &self.bundle,
                    &self.options.storage_key,
                    &dek_x,
                    &device_kek,
                    HeaderPlan::device(),
                )?;
                self.persist(&bundle)?;
                self.bundle = bundle;
                self.dek = Some(dek_use);
                self.session.clear();
                self.mode = Mode::Device;
                debug!("master password removed");
                Ok(())
            }
        }
    }

    /// Changes the master password.
    ///
    /// In device mode this sets `new` as the first master password; in the
    /// locked state it unlocks with `old` first.
    pub fn rotate_master_password(&mut self, old: &str, new: &str) -> Result<()> {
        match self.mode {
            Mode::Device => self.set_master_password(new),
            Mode::Locked => {
                self.unlock(old)?;
                self.apply_new_master_password(new)
            }
            Mode::Master => {
                let salt = b64_decode("salt", &self.bundle.header.salt)?;
                let old_kek = match derive_kek(old, &salt, self.bundle.header.rounds) {
                    Ok(kek) => kek,
                    Err(e) if !e.is_validation() => return Err(e.into()),
                    Err(_) => {
                        return Err(Error::Validation("incorrect master password".into()))
                    }
                };
                if envelope::unwrap_dek(&self.bundle, &old_kek, false, &self.options.storage_key)
                    .is_err()
                {
                    return Err(Error::Validation("incorrect master password".into()));
                }
                self.apply_new_master_password(new)
            }
        }
    }

    /// Re-derives the session KEK from a new salt and rewraps. Master mode only.
    fn apply_new_master_password(&mut self, new: &str) -> Result<()> {
        if new.trim().is_empty() {
            return Err(Error::Validation("password must not be empty".into()));
        }
        let current_kek = self.session_kek()?;
        let dek_x =
            envelope::unwrap_dek(&self.bundle, &current_kek, true, &self.options.storage_key)?;

        let salt = generate_salt();
        let salt_b64 = b64(&salt);
        let rounds = self.options.master_rounds;
        let new_kek = derive_kek(new, &salt, rounds)?;

        let (bundle, dek_use) = envelope::re_encrypt(
            &self.bundle,
            &self.options.storage_key,
            &dek_x,
            &new_kek,
            HeaderPlan {
                salt: salt_b64.clone(),
                rounds,
                master_pw: Some(true),
                ctx: Ctx::Store,
            },
        )?;
        self.persist(&bundle)?;
        self.bundle = bundle;
        self.dek = Some(dek_use);
        self.session.set(new_kek, &salt_b64, rounds);
        debug!("master password rotated");
        Ok(())
    }

    /// Unlocks a master-protected store. No-op outside the locked state.
    ///
    /// A wrong password is a validation failure and leaves the store locked.
    /// V2 bundles migrate to the V3 AAD-bound format on successful unlock.
    pub fn unlock(&mut self, password: &str) -> Result<()> {
        if self.mode != Mode::Locked {
            return Ok(());
        }
        if password.trim().is_empty() {
            return Err(Error::Validation("password must not be empty".into()));
        }

        let salt = b64_decode("salt", &self.bundle.header.salt)?;
        let rounds = self.bundle.header.rounds;
        let kek = derive_kek(password, &salt, rounds)?;

        let dek =
            match envelope::unwrap_dek(&self.bundle, &kek, false, &self.options.storage_key) {
                Ok(dek) => dek,
                Err(Error::Crypto(_)) => {
                    return Err(Error::Validation("incorrect master password".into()))
                }
                Err(e) => return Err(e),
            };

        let dek = if self.bundle.is_v2() {
            let dek_x =
                envelope::unwrap_dek(&self.bundle, &kek, true, &self.options.storage_key)?;
            let (migrated, dek_use) = envelope::re_encrypt(
                &self.bundle,
                &self.options.storage_key,
                &dek_x,
                &kek,
                HeaderPlan {
                    salt: self.bundle.header.salt.clone(),
                    rounds,
                    master_pw: Some(true),
                    ctx: Ctx::Store,
                },
            )?;
            self.persist(&migrated)?;
            self.bundle = migrated;
            debug!("migrated v2 master bundle to v3 on unlock");
            dek_use
        } else {
            dek
        };

        self.session.set(kek, &self.bundle.header.salt, rounds);
        self.dek = Some(dek);
        self.mode = Mode::Master;
        Ok(())
    }

    /// Drops the session KEK and the loaded DEK. No-op outside master mode.
    pub fn lock(&mut self) {
        if self.mode == Mode::Master {
            self.session.clear();
            self.dek = None;
            self.mode = Mode::Locked;
            debug!("store locked");
        }
    }

    // ------------------------------------------------------------------
    // Device key rotation
    // ------------------------------------------------------------------

    /// Rotates the device KEK and rewraps the bundle under it. Device mode only.
    pub fn rotate_keys(&mut self) -> Result<()> {
        match self.mode {
            Mode::Locked => Err(Error::Locked),
            Mode::Master => Err(Error::Mode(
                "device key rotation requires device mode".into(),
            )),
            Mode::Device => {
                let ns = &self.options.key_namespace;
                let old_kek = self.device_keys.get_key(ns)?;
                let dek_x =
                    envelope::unwrap_dek(&self.bundle, &old_kek, true, &self.options.storage_key)?;
                let new_kek = self.device_keys.rotate_key(ns)?;

                let (bundle, dek_use) = envelope::re_encrypt(
                    &self.bundle,
                    &self.options.storage_key,
                    &dek_x,
                    &new_kek,
                    HeaderPlan::device(),
                )?;
                self.persist(&bundle)?;
                self.bundle = bundle;
                self.dek = Some(dek_use);
                debug!("device key rotated");
                Ok(())
            }
        }
    }

    // ------------------------------------------------------------------
    // Portability
    // ------------------------------------------------------------------

    /// Builds a portable export bundle and returns it serialized.
    ///
    /// In master mode without a custom password, the bundle stays protected
    /// by the master password. A custom password (mandatory in device mode)
    /// protects the export independently of the local wrapping.
    pub fn export_data(&self, custom_password: Option<&str>) -> Result<String> {
        if self.is_locked() {
            return Err(Error::Locked);
        }

        let current_kek = match self.mode {
            Mode::Master => self.session_kek()?,
            _ => self.device_keys.get_key(&self.options.key_namespace)?,
        };
        let dek_x =
            envelope::unwrap_dek(&self.bundle, &current_kek, true, &self.options.storage_key)?;

        let (export_kek, plan) = match custom_password {
            Some(pw) => {
                if pw.trim().is_empty() {
                    return Err(Error::Export("the export password must not be blank".into()));
                }
                let salt = generate_salt();
                let rounds = self.options.master_rounds;
                let kek = derive_kek(pw, &salt, rounds)?;
                (
                    kek,
                    HeaderPlan {
                        salt: b64(&salt),
                        rounds,
                        master_pw: Some(false),
                        ctx: Ctx::Export,
                    },
                )
            }
            None => {
                if self.mode != Mode::Master {
                    return Err(Error::Export(
                        "a custom export password is required in device mode".into(),
                    ));
                }
                (
                    current_kek.clone(),
                    HeaderPlan {
                        salt: self.bundle.header.salt.clone(),
                        rounds: self.bundle.header.rounds,
                        master_pw: Some(true),
                        ctx: Ctx::Export,
                    },
                )
            }
        };

        let (bundle, _) = envelope::re_encrypt(
            &self.bundle,
            &self.options.storage_key,
            &dek_x,
            &export_kek,
            plan,
        )?;
        bundle.to_json()
    }

    /// Ingests a serialized bundle, replacing the local store.
    ///
    /// Master-protected bundles are adopted under their own password and the
    /// store ends up locked; custom-password exports are rewrapped under the
    /// local device KEK and the store ends up unlocked in device mode.
    pub fn import_data(
        &mut self,
        serialized: &str,
        password: Option<&str>,
    ) -> Result<ImportOutcome> {
        let (incoming, class) = portability::parse_and_classify(serialized)?;
        let pw = portability::require_import_password(class, password)?;

        let salt = b64_decode("salt", &incoming.header.salt).map_err(import_err)?;
        let kek = derive_kek(pw, &salt, incoming.header.rounds).map_err(|e| import_err(e.into()))?;

        // Verification pass before anything is persisted.
        if envelope::unwrap_dek(&incoming, &kek, false, &self.options.storage_key).is_err() {
            return Err(Error::Import(
                "authentication failed: wrong password or corrupted bundle".into(),
            ));
        }

        match class {
            ImportClass::Master => {
                let adopted = if incoming.is_v3() && incoming.header.ctx == Some(Ctx::Store) {
                    incoming
                } else {
                    let dek_x = envelope::unwrap_dek(
                        &incoming,
                        &kek,
                        true,
                        &self.options.storage_key,
                    )
                    .map_err(import_err)?;
                    let plan = HeaderPlan {
                        salt: incoming.header.salt.clone(),
                        rounds: incoming.header.rounds,
                        master_pw: Some(true),
                        ctx: Ctx::Store,
                    };
                    envelope::re_encrypt(
                        &incoming,
                        &self.options.storage_key,
                        &dek_x,
                        &kek,
                        plan,
                    )
                    .map_err(import_err)?
                    .0
                };
                self.persist(&adopted)?;
                self.bundle = adopted;
                self.session.clear();
                self.dek = None;
                self.mode = Mode::Locked;
                debug!("imported master-protected bundle; store is locked");
                Ok(ImportOutcome::MasterPassword)
            }
            ImportClass::CustomExport => {
                let dek_x =
                    envelope::unwrap_dek(&incoming, &kek, true, &self.options.storage_key)
                        .map_err(import_err)?;
                let device_kek = self.device_keys.get_key(&self.options.key_namespace)?;
                let (bundle, dek_use) = envelope::re_encrypt(
                    &incoming,
                    &self.options.storage_key,
                    &dek_x,
                    &device_kek,
                    HeaderPlan::device(),
                )
                .map_err(import_err)?;
                self.persist(&bundle)?;
                self.bundle = bundle;
                self.session.clear();
                self.dek = Some(dek_use);
                self.mode = Mode::Device;
                debug!("imported custom-password bundle into device mode");
                Ok(ImportOutcome::CustomExportPassword)
            }
        }
    }

    // ------------------------------------------------------------------
    // Teardown
    // ------------------------------------------------------------------

    /// Destroys the persisted bundle and the device key record, then
    /// re-initializes as a fresh device-mode store.
    pub fn clear(&mut self) -> Result<()> {
        self.slot.clear();
        if let Err(e) = self
            .device_keys
            .delete_persistent(&self.options.key_namespace)
        {
            warn!("device key deletion failed during clear: {e}");
        }
        self.session.clear();
        self.dek = None;

        let init = initialize(&self.options, self.slot.as_ref(), &self.device_keys, true)?;
        self.bundle = init.bundle;
        self.dek = init.dek;
        self.mode = init.mode;
        self.last_reset_reason = init.reset_reason;
        debug!("store cleared and re-created");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn require_unlocked_dek(&self) -> Result<&SymmetricKey> {
        if self.is_locked() {
            return Err(Error::Locked);
        }
        self.dek.as_ref().ok_or(Error::Locked)
    }

    /// The session KEK matching the current header, or `Locked` if absent.
    fn session_kek(&self) -> Result<SymmetricKey> {
        self.session
            .matching(&self.bundle.header.salt, self.bundle.header.rounds)
            .ok_or(Error::Locked)
    }

    fn persist(&self, bundle: &Bundle) -> Result<()> {
        self.slot.set(&bundle.to_json()?)?;
        Ok(())
    }
}

fn import_err(e: Error) -> Error {
    match e {
        Error::Import(_) => e,
        other => Error::Import(other.to_string()),
    }
}

// ============================================================================
// Initialization
// ============================================================================

struct InitOutcome {
    bundle: Bundle,
    mode: Mode,
    dek: Option<SymmetricKey>,
    reset_reason: Option<ResetReason>,
}

fn initialize(
    options: &StoreOptions,
    slot: &dyn SlotStore,
    device_keys: &DeviceKeyProvider,
    force_fresh: bool,
) -> Result<InitOutcome> {
    let raw = if force_fresh { None } else { slot.get()? };
    let had_raw = raw.is_some();

    let existing = raw
        .as_deref()
        .and_then(Bundle::parse)
        .filter(|b| match validate(b, true) {
            Ok(()) => true,
            Err(e) => {
                warn!("persisted bundle failed validation: {e}");
                false
            }
        });

    let Some(bundle) = existing else {
        let reason = had_raw.then_some(ResetReason::InvalidConfig);
        return create_fresh(options, slot, device_keys, reason);
    };

    if is_master_protected(&bundle.header) {
        debug!("master-protected bundle loaded; starting locked");
        return Ok(InitOutcome {
            bundle,
            mode: Mode::Locked,
            dek: None,
            reset_reason: None,
        });
    }

    let kek = device_keys.get_key(&options.key_namespace)?;
    match envelope::unwrap_dek(&bundle, &kek, false, &options.storage_key) {
        Ok(_) if bundle.is_v2() => {
            let dek_x = envelope::unwrap_dek(&bundle, &kek, true, &options.storage_key)?;
            let plan = HeaderPlan {
                salt: bundle.header.salt.clone(),
                rounds: bundle.header.rounds,
                master_pw: bundle.header.master_pw,
                ctx: Ctx::Store,
            };
            let (migrated, dek_use) =
                envelope::re_encrypt(&bundle, &options.storage_key, &dek_x, &kek, plan)?;
            slot.set(&migrated.to_json()?)?;
            debug!("migrated v2 device bundle to v3");
            Ok(InitOutcome {
                bundle: migrated,
                mode: Mode::Device,
                dek: Some(dek_use),
                reset_reason: None,
            })
        }
        Ok(dek) => Ok(InitOutcome {
            bundle,
            mode: Mode::Device,
            dek: Some(dek),
            reset_reason: None,
        }),
        Err(Error::Crypto(_)) => {
            warn!("device KEK cannot unwrap the persisted bundle; creating a fresh store");
            create_fresh(
                options,
                slot,
                device_keys,
                Some(ResetReason::DeviceKekMismatch),
            )
        }
        Err(e) => Err(e),
    }
}

fn create_fresh(
    options: &StoreOptions,
    slot: &dyn SlotStore,
    device_keys: &DeviceKeyProvider,
    reason: Option<ResetReason>,
) -> Result<InitOutcome> {
    let kek = device_keys.get_key(&options.key_namespace)?;
    let (bundle, dek) = envelope::create_empty(&kek, &options.storage_key)?;
    slot.set(&bundle.to_json()?)?;
    if let Some(r) = reason {
        warn!("created fresh store after reset: {r:?}");
    }
    Ok(InitOutcome {
        bundle,
        mode: Mode::Device,
        dek: Some(dek),
        reset_reason: reason,
    })
}
