//! Single-slot string persistence.
//!
//! The vault persists exactly one JSON document per storage key. A write is
//! committed only if reading the slot back returns the same string; a
//! mismatch surfaces as a verification error rather than silent corruption.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::error::{StorageError, StorageResult};

/// A single-value string store keyed externally by the storage key.
pub trait SlotStore: Send + Sync {
    /// Reads the slot. Absent slots yield `None`.
    fn get(&self) -> StorageResult<Option<String>>;

    /// Writes the slot, reads it back, and compares.
    fn set(&self, value: &str) -> StorageResult<()>;

    /// Best-effort removal. Never fails.
    fn clear(&self);
}

// ============================================================================
// MemorySlot
// ============================================================================

/// In-memory slot, optionally capped to simulate a full store.
///
/// Clones share the same underlying value, so a test can hand one handle to
/// the vault and keep another to inspect or corrupt the persisted bundle.
#[derive(Clone, Default)]
pub struct MemorySlot {
    value: Arc<Mutex<Option<String>>>,
    quota_bytes: Option<usize>,
}

impl MemorySlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// A slot that rejects writes larger than `quota_bytes`.
    pub fn with_quota(quota_bytes: usize) -> Self {
        Self {
            value: Arc::new(Mutex::new(None)),
            quota_bytes: Some(quota_bytes),
        }
    }
}

impl SlotStore for MemorySlot {
    fn get(&self) -> StorageResult<Option<String>> {
        Ok(self.value.lock().expect("slot lock poisoned").clone())
    }

    fn set(&self, value: &str) -> StorageResult<()> {
        if let Some(quota) = self.quota_bytes {
            if value.len() > quota {
                return Err(StorageError::Full {
                    attempted: value.len(),
                });
            }
        }
        let mut slot = self.value.lock().expect("slot lock poisoned");
        *slot = Some(value.to_string());
        Ok(())
    }

    fn clear(&self) {
        let mut slot = self.value.lock().expect("slot lock poisoned");
        *slot = None;
    }
}

// ============================================================================
// FileSlot
// ============================================================================

/// File-backed slot: one file per storage key inside a base directory.
pub struct FileSlot {
    path: PathBuf,
}

impl FileSlot {
    /// Opens (creating the directory if needed) the slot file for `storage_key`.
    pub fn open(dir: &Path, storage_key: &str) -> StorageResult<Self> {
        fs::create_dir_all(dir)
            .map_err(|e| StorageError::Persistence(format!("create {}: {e}", dir.display())))?;
        Ok(Self {
            path: dir.join(format!("{}.json", sanitize_file_name(storage_key))),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Replaces any character that isn't alphanumeric, `-`, or `_` with `_`.
fn sanitize_file_name(key: &str) -> String {
    key.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Quota failures are reported differently by platform: ENOSPC on Unix,
/// a "disk full" message elsewhere.
fn is_quota_error(e: &io::Error) -> bool {
    if e.raw_os_error() == Some(28) {
        return true;
    }
    let msg = e.to_string().to_ascii_lowercase();
    msg.contains("no space") || msg.contains("disk full") || msg.contains("quota")
}

impl SlotStore for FileSlot {
    fn get(&self) -> StorageResult<Option<String>> {
        match fs::read_to_string(&self.path) {
            Ok(s) => Ok(Some(s)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::Persistence(format!(
                "read {}: {e}",
                self.path.display()
            ))),
        }
    }

    fn set(&self, value: &str) -> StorageResult<()> {
        if let Err(e) = fs::write(&self.path, value) {
            if is_quota_error(&e) {
                return Err(StorageError::Full {
                    attempted: value.len(),
                });
            }
            return Err(StorageError::Persistence(format!(
                "write {}: {e}",
                self.path.display()
            )));
        }

        let written = fs::read_to_string(&self.path).map_err(|e| {
            StorageError::Persistence(format!("read-back {}: {e}", self.path.display()))
        })?;
        if written != value {
            return Err(StorageError::WriteVerification(
                self.path.display().to_string(),
            ));
        }
        Ok(())
    }

    fn clear(&self) {
        let _ = fs::remove_file(&self.path);
    }
}
