//! Shared fixtures for vault integration tests.
#![allow(dead_code)]

use std::sync::Arc;

use sealslot_vault::{
    Bundle, DeviceKeyProvider, MemorySlot, SealedStore, SlotStore, StoreOptions,
};

/// Low Argon2id time cost so password tests stay fast.
pub const TEST_ROUNDS: u32 = 2;

pub fn options(storage_key: &str) -> StoreOptions {
    StoreOptions {
        storage_key: storage_key.into(),
        master_rounds: TEST_ROUNDS,
        ..StoreOptions::default()
    }
}

/// Opens a store on a fresh in-memory slot and key provider, returning both
/// handles so tests can inspect persisted state and share the device key.
pub fn open_store(storage_key: &str) -> (SealedStore, MemorySlot, Arc<DeviceKeyProvider>) {
    let slot = MemorySlot::new();
    let provider = Arc::new(DeviceKeyProvider::in_memory());
    let store = SealedStore::open(
        options(storage_key),
        Box::new(slot.clone()),
        provider.clone(),
    )
    .expect("store should open");
    (store, slot, provider)
}

/// Reads the bundle currently persisted in a slot.
pub fn persisted_bundle(slot: &MemorySlot) -> Bundle {
    let raw = slot.get().unwrap().expect("slot should hold a bundle");
    Bundle::parse(&raw).expect("persisted bundle should parse")
}

pub fn write_bundle(slot: &MemorySlot, bundle: &Bundle) {
    slot.set(&serde_json::to_string(bundle).unwrap()).unwrap();
}
