//! Persistence layer for sealslot.
//!
//! Two concerns live here:
//!
//! - [`SlotStore`]: the single string slot holding the encrypted bundle,
//!   with in-memory and file-backed implementations, quota detection, and
//!   write-back verification.
//! - [`DeviceKeyProvider`]: the namespaced device-KEK store, backed by a
//!   [`KeyDatabase`] with an in-process cache and pure in-memory fallback.

mod device_keys;
mod error;
mod kv;

pub use device_keys::{DeviceKeyProvider, FileKeyDatabase, KeyDatabase, KeyNamespace};
pub use error::{StorageError, StorageResult};
pub use kv::{FileSlot, MemorySlot, SlotStore};
