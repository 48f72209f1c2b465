//! Device key persistence and the in-process KEK cache.
//!
//! Each vault namespace `(db_name, store_name, key_id)` owns at most one
//! device KEK. The key bytes live in a key database record; the in-process
//! cache hands out non-extractable handles so the raw bytes are never
//! visible above this module. Facades that should observe each other's
//! rotations share one [`DeviceKeyProvider`] behind an `Arc`.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use rand::rngs::OsRng;
use rand::RngCore;
use sealslot_crypto::{KeyUsages, SymmetricKey, KEY_SIZE};
use tracing::{debug, warn};
use zeroize::Zeroizing;

use crate::error::{StorageError, StorageResult};

/// Identifies one device-key record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyNamespace {
    pub db_name: String,
    pub store_name: String,
    pub key_id: String,
}

impl KeyNamespace {
    pub fn new(
        db_name: impl Into<String>,
        store_name: impl Into<String>,
        key_id: impl Into<String>,
    ) -> Self {
        Self {
            db_name: db_name.into(),
            store_name: store_name.into(),
            key_id: key_id.into(),
        }
    }

    /// Serialized form used as the cache and database record key.
    pub fn record_key(&self) -> String {
        format!("{}::{}::{}", self.db_name, self.store_name, self.key_id)
    }
}

/// Persistence backend for device-key records.
///
/// A database may hold records for many namespaces; `delete` removes exactly
/// one record without touching the rest.
pub trait KeyDatabase: Send + Sync {
    fn load(&self, ns: &KeyNamespace) -> StorageResult<Option<[u8; KEY_SIZE]>>;
    fn store(&self, ns: &KeyNamespace, key: &[u8; KEY_SIZE]) -> StorageResult<()>;
    fn delete(&self, ns: &KeyNamespace) -> StorageResult<()>;
}

// ============================================================================
// FileKeyDatabase
// ============================================================================

/// Key database backed by a single JSON document on disk.
pub struct FileKeyDatabase {
    path: PathBuf,
}

impl FileKeyDatabase {
    /// Opens the database file, creating parent directories as needed.
    pub fn open(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| StorageError::Unavailable(format!("{}: {e}", parent.display())))?;
        }
        // An existing but unreadable database means the backend is unusable;
        // surface that now rather than on first key access.
        if path.exists() {
            fs::read_to_string(path)
                .map_err(|e| StorageError::Unavailable(format!("{}: {e}", path.display())))?;
        }
        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    fn read_records(&self) -> StorageResult<HashMap<String, String>> {
        match fs::read_to_string(&self.path) {
            Ok(s) => serde_json::from_str(&s).map_err(|e| {
                StorageError::Persistence(format!("key database corrupt: {e}"))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
            Err(e) => Err(StorageError::Persistence(format!(
                "read {}: {e}",
                self.path.display()
            ))),
        }
    }

    fn write_records(&self, records: &HashMap<String, String>) -> StorageResult<()> {
        let json = serde_json::to_string(records)
            .map_err(|e| StorageError::Persistence(e.to_string()))?;
        fs::write(&self.path, json).map_err(|e| {
            StorageError::Persistence(format!("write {}: {e}", self.path.display()))
        })
    }
}

impl KeyDatabase for FileKeyDatabase {
    fn load(&self, ns: &KeyNamespace) -> StorageResult<Option<[u8; KEY_SIZE]>> {
        let records = self.read_records()?;
        let Some(encoded) = records.get(&ns.record_key()) else {
            return Ok(None);
        };
        let decoded = Zeroizing::new(BASE64.decode(encoded).map_err(|e| {
            StorageError::Persistence(format!("key record corrupt: {e}"))
        })?);
        if decoded.len() != KEY_SIZE {
            return Err(StorageError::Persistence(format!(
                "key record corrupt: expected {KEY_SIZE} bytes, got {}",
                decoded.len()
            )));
        }
        let mut bytes = [0u8; KEY_SIZE];
        bytes.copy_from_slice(&decoded);
        Ok(Some(bytes))
    }

    fn store(&self, ns: &KeyNamespace, key: &[u8; KEY_SIZE]) -> StorageResult<()> {
        let mut records = self.read_records()?;
        records.insert(ns.record_key(), BASE64.encode(key));
        self.write_records(&records)
    }

    fn delete(&self, ns: &KeyNamespace) -> StorageResult<()> {
        let mut records = self.read_records()?;
        if records.remove(&ns.record_key()).is_some() {
            self.write_records(&records)?;
        }
        Ok(())
    }
}

// ============================================================================
// DeviceKeyProvider
// ============================================================================

/// Hands out the device KEK for a namespace.
///
/// Lookup order: in-process cache, then the key database, then a freshly
/// generated key. Persistence failures degrade to a process-lifetime key
/// with a warning; the caller keeps working, the key just won't survive a
/// restart.
pub struct DeviceKeyProvider {
    db: Option<Box<dyn KeyDatabase>>,
    cache: Mutex<HashMap<String, SymmetricKey>>,
}

impl DeviceKeyProvider {
    /// Provider with no persistence: every namespace gets a process-lifetime key.
    pub fn in_memory() -> Self {
        Self {
            db: None,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Provider backed by a key database.
    pub fn with_database(db: impl KeyDatabase + 'static) -> Self {
        Self {
            db: Some(Box::new(db)),
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Whether keys survive a process restart.
    pub fn is_persistent(&self) -> bool {
        self.db.is_some()
    }

    /// Returns the namespace's KEK, generating and persisting one if absent.
    pub fn get_key(&self, ns: &KeyNamespace) -> StorageResult<SymmetricKey> {
        let record_key = ns.record_key();

        let mut cache = self.cache.lock().expect("key cache poisoned");
        if let Some(key) = cache.get(&record_key) {
            return Ok(key.clone());
        }

        if let Some(db) = &self.db {
            match db.load(ns) {
                Ok(Some(bytes)) => {
                    let key = SymmetricKey::from_bytes(bytes, KeyUsages::wrapping(), false);
                    cache.insert(record_key, key.clone());
                    return Ok(key);
                }
                Ok(None) => {}
                Err(e) => warn!("device key load failed for {record_key}: {e}"),
            }
        }

        let key = self.generate_and_persist(ns)?;
        cache.insert(record_key, key.clone());
        Ok(key)
    }

    /// Replaces the namespace's KEK with a fresh one.
    pub fn rotate_key(&self, ns: &KeyNamespace) -> StorageResult<SymmetricKey> {
        let key = self.generate_and_persist(ns)?;
        let mut cache = self.cache.lock().expect("key cache poisoned");
        cache.insert(ns.record_key(), key.clone());
        debug!("rotated device key for {}", ns.record_key());
        Ok(key)
    }

    /// Removes the namespace's record and evicts the cached handle.
    pub fn delete_persistent(&self, ns: &KeyNamespace) -> StorageResult<()> {
        let mut cache = self.cache.lock().expect("key cache poisoned");
        cache.remove(&ns.record_key());
        drop(cache);

        if let Some(db) = &self.db {
            db.delete(ns)?;
        }
        Ok(())
    }

    fn generate_and_persist(&self, ns: &KeyNamespace) -> StorageResult<SymmetricKey> {
        let mut bytes = Zeroizing::new([0u8; KEY_SIZE]);
        OsRng.fill_bytes(&mut *bytes);

        if let Some(db) = &self.db {
            if let Err(e) = db.store(ns, &bytes) {
                warn!(
                    "device key persistence failed for {}, continuing in memory: {e}",
                    ns.record_key()
                );
            }
        }
        Ok(SymmetricKey::from_bytes(*bytes, KeyUsages::wrapping(), false))
    }
}
