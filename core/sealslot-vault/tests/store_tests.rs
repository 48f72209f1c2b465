mod support;

use std::sync::Arc;

use sealslot_vault::{
    DeviceKeyProvider, Error, MemorySlot, Mode, ResetReason, SealedStore, SlotStore,
};
use serde_json::json;
use support::{open_store, options, persisted_bundle};

#[test]
fn fresh_store_starts_empty_in_device_mode() {
    let (store, slot, _provider) = open_store("app:sls");

    assert_eq!(store.mode(), Mode::Device);
    assert!(!store.is_locked());
    assert!(!store.is_using_master_password());
    assert!(store.last_reset_reason().is_none());

    let view = store.get_data().unwrap();
    assert!(view.is_empty().unwrap());

    // The fresh bundle is persisted immediately and is structurally valid.
    let bundle = persisted_bundle(&slot);
    assert!(sealslot_vault::validate(&bundle, true).is_ok());
    assert_eq!(bundle.header.v, SealedStore::DATA_VERSION);
    assert_eq!(bundle.header.rounds, 1);
    assert_eq!(bundle.header.salt, "");
}

#[test]
fn device_mode_round_trip_with_view_wipe() {
    // Scenario: write, read, wipe the view, read again.
    let (mut store, _slot, _provider) = open_store("app:sls");
    let payload = json!({"value1": 42, "nested": {"a": "b"}});

    store.set_data(&payload).unwrap();

    let mut view = store.get_data().unwrap();
    assert_eq!(view.to_value().unwrap(), payload);

    view.clear();
    assert!(matches!(view.get("value1"), Err(Error::Locked)));

    // The wipe only affects the view; the store still has the data.
    let again = store.get_data().unwrap();
    assert_eq!(again.to_value().unwrap(), payload);
}

#[test]
fn every_written_bundle_passes_validation() {
    let (mut store, slot, _provider) = open_store("app:sls");

    store.set_data(&json!({"a": 1})).unwrap();
    assert!(sealslot_vault::validate(&persisted_bundle(&slot), true).is_ok());

    store.set_master_password("pw-1").unwrap();
    assert!(sealslot_vault::validate(&persisted_bundle(&slot), true).is_ok());

    store.remove_master_password().unwrap();
    assert!(sealslot_vault::validate(&persisted_bundle(&slot), true).is_ok());

    store.rotate_keys().unwrap();
    assert!(sealslot_vault::validate(&persisted_bundle(&slot), true).is_ok());
}

#[test]
fn lock_unlock_cycle() {
    // Scenario: protect with a master password, lock, fail a wrong unlock,
    // then unlock with the right password.
    let (mut store, _slot, _provider) = open_store("app:sls");
    store.set_data(&json!({"note": "hi"})).unwrap();

    store
        .set_master_password("correct horse battery staple")
        .unwrap();
    assert!(store.is_using_master_password());
    assert!(!store.is_locked());

    store.lock();
    assert!(store.is_locked());
    assert!(matches!(store.get_data(), Err(Error::Locked)));
    assert!(matches!(store.set_data(&json!({"x": 1})), Err(Error::Locked)));

    // Wrong password: validation failure, still locked.
    assert!(matches!(store.unlock("wrong"), Err(Error::Validation(_))));
    assert!(store.is_locked());

    store.unlock("correct horse battery staple").unwrap();
    assert!(!store.is_locked());
    assert_eq!(store.get_data().unwrap().to_value().unwrap(), json!({"note": "hi"}));
}

#[test]
fn unlock_is_a_no_op_outside_locked_state() {
    let (mut store, _slot, _provider) = open_store("app:sls");
    // Device mode: nothing to unlock.
    store.unlock("anything").unwrap();
    assert_eq!(store.mode(), Mode::Device);

    store.set_master_password("pw").unwrap();
    // Already unlocked: no-op even with a wrong password.
    store.unlock("wrong").unwrap();
    assert_eq!(store.mode(), Mode::Master);
}

#[test]
fn mode_gating_of_master_password_operations() {
    let (mut store, _slot, _provider) = open_store("app:sls");

    // Device mode: nothing to remove.
    assert!(matches!(store.remove_master_password(), Err(Error::Mode(_))));

    store.set_master_password("pw").unwrap();
    // Master mode: cannot set again.
    assert!(matches!(store.set_master_password("other"), Err(Error::Mode(_))));

    store.lock();
    // Locked: both require an unlocked session.
    assert!(matches!(store.set_master_password("pw"), Err(Error::Locked)));
    assert!(matches!(store.remove_master_password(), Err(Error::Locked)));
}

#[test]
fn remove_master_password_returns_to_device_mode() {
    let (mut store, slot, _provider) = open_store("app:sls");
    store.set_data(&json!({"kept": true})).unwrap();
    store.set_master_password("pw").unwrap();

    store.remove_master_password().unwrap();
    assert_eq!(store.mode(), Mode::Device);
    assert_eq!(store.get_data().unwrap().to_value().unwrap(), json!({"kept": true}));

    let bundle = persisted_bundle(&slot);
    assert_eq!(bundle.header.rounds, 1);
    assert_eq!(bundle.header.salt, "");
    assert!(!sealslot_vault::is_master_protected(&bundle.header));
}

#[test]
fn rotate_master_password_requires_the_old_one() {
    let (mut store, _slot, _provider) = open_store("app:sls");
    store.set_data(&json!({"z": 1})).unwrap();
    store.set_master_password("first").unwrap();

    assert!(matches!(
        store.rotate_master_password("not-first", "second"),
        Err(Error::Validation(_))
    ));

    store.rotate_master_password("first", "second").unwrap();
    store.lock();
    assert!(matches!(store.unlock("first"), Err(Error::Validation(_))));
    store.unlock("second").unwrap();
    assert_eq!(store.get_data().unwrap().to_value().unwrap(), json!({"z": 1}));
}

#[test]
fn rotate_master_password_in_device_mode_sets_it() {
    let (mut store, _slot, _provider) = open_store("app:sls");
    store.rotate_master_password("ignored", "fresh-pw").unwrap();
    assert_eq!(store.mode(), Mode::Master);
    store.lock();
    store.unlock("fresh-pw").unwrap();
}

#[test]
fn rotate_master_password_while_locked_unlocks_first() {
    let (mut store, _slot, _provider) = open_store("app:sls");
    store.set_data(&json!({"v": 7})).unwrap();
    store.set_master_password("old-pw").unwrap();
    store.lock();

    store.rotate_master_password("old-pw", "new-pw").unwrap();
    assert_eq!(store.mode(), Mode::Master);
    assert_eq!(store.get_data().unwrap().to_value().unwrap(), json!({"v": 7}));

    store.lock();
    store.unlock("new-pw").unwrap();
}

#[test]
fn rotate_keys_changes_header_and_device_key_but_not_data() {
    let (mut store, slot, provider) = open_store("app:sls");
    store.set_data(&json!({"payload": "stays"})).unwrap();
    let before = persisted_bundle(&slot);

    store.rotate_keys().unwrap();

    let after = persisted_bundle(&slot);
    assert_ne!(before.header.iv, after.header.iv);
    assert_ne!(before.header.wrapped_key, after.header.wrapped_key);
    // The payload was re-encrypted under the new header-bound AAD.
    assert_ne!(before.data.ciphertext, after.data.ciphertext);
    assert_eq!(
        store.get_data().unwrap().to_value().unwrap(),
        json!({"payload": "stays"})
    );

    // A second facade sharing slot and provider sees the rotated key.
    let reopened = SealedStore::open(
        options("app:sls"),
        Box::new(slot.clone()),
        provider.clone(),
    )
    .unwrap();
    assert!(reopened.last_reset_reason().is_none());
    assert_eq!(
        reopened.get_data().unwrap().to_value().unwrap(),
        json!({"payload": "stays"})
    );
}

#[test]
fn rotate_keys_is_device_mode_only() {
    let (mut store, _slot, _provider) = open_store("app:sls");
    store.set_master_password("pw").unwrap();
    assert!(matches!(store.rotate_keys(), Err(Error::Mode(_))));

    store.lock();
    assert!(matches!(store.rotate_keys(), Err(Error::Locked)));
}

#[test]
fn bundles_are_bound_to_their_storage_key() {
    // The same slot and device key read under a different storage key must
    // not decrypt: the wrap AAD differs, so the store resets.
    let (mut store, slot, provider) = open_store("alpha");
    store.set_data(&json!({"secret": 1})).unwrap();

    let other = SealedStore::open(
        options("beta"),
        Box::new(slot.clone()),
        provider.clone(),
    )
    .unwrap();
    assert_eq!(other.last_reset_reason(), Some(ResetReason::DeviceKekMismatch));
    assert!(other.get_data().unwrap().is_empty().unwrap());
}

#[test]
fn mixed_header_and_data_fail_authentication() {
    // Scenario: splice a freshly wrapped (valid) header pair onto an existing
    // data section. The data AAD embeds the original header fields, so the
    // payload must refuse to decrypt.
    let (mut store, slot, provider) = open_store("app:sls");
    store.set_data(&json!({"a": 1})).unwrap();

    let mut bundle = persisted_bundle(&slot);
    let kek = provider
        .get_key(&options("app:sls").key_namespace)
        .unwrap();
    let fresh_dek = sealslot_crypto::generate_dek();
    let aad = sealslot_vault::wrap_aad(
        sealslot_vault::Ctx::Store,
        SealedStore::DATA_VERSION,
        "app:sls",
    );
    let wrapped = sealslot_crypto::wrap_key(&fresh_dek, &kek, Some(&aad)).unwrap();

    use base64::engine::general_purpose::STANDARD as BASE64;
    use base64::Engine as _;
    bundle.header.iv = BASE64.encode(wrapped.iv);
    bundle.header.wrapped_key = BASE64.encode(&wrapped.wrapped);
    support::write_bundle(&slot, &bundle);

    // The new header is valid under the device KEK, so opening succeeds...
    let reopened = SealedStore::open(
        options("app:sls"),
        Box::new(slot.clone()),
        provider.clone(),
    )
    .unwrap();
    assert!(reopened.last_reset_reason().is_none());
    // ...but the untouched data section no longer authenticates.
    assert!(matches!(reopened.get_data(), Err(Error::Crypto(_))));
}

#[test]
fn invalid_persisted_state_resets_with_reason() {
    let slot = MemorySlot::new();
    slot.set("definitely not json").unwrap();
    let store = SealedStore::open(
        options("app:sls"),
        Box::new(slot.clone()),
        Arc::new(DeviceKeyProvider::in_memory()),
    )
    .unwrap();
    assert_eq!(store.last_reset_reason(), Some(ResetReason::InvalidConfig));
    assert!(store.get_data().unwrap().is_empty().unwrap());

    // Valid JSON with the wrong shape resets the same way.
    let slot = MemorySlot::new();
    slot.set("{\"header\": {\"v\": 3}}").unwrap();
    let store = SealedStore::open(
        options("app:sls"),
        Box::new(slot.clone()),
        Arc::new(DeviceKeyProvider::in_memory()),
    )
    .unwrap();
    assert_eq!(store.last_reset_reason(), Some(ResetReason::InvalidConfig));
}

#[test]
fn set_data_rejects_non_object_payloads() {
    let (mut store, _slot, _provider) = open_store("app:sls");
    assert!(matches!(store.set_data(&json!([1, 2])), Err(Error::Validation(_))));
    assert!(matches!(store.set_data(&json!(null)), Err(Error::Validation(_))));
    assert!(matches!(store.set_data(&json!(42)), Err(Error::Validation(_))));
    assert!(matches!(store.set_data(&json!("str")), Err(Error::Validation(_))));
}

#[test]
fn quota_errors_carry_the_attempted_size() {
    // Room for the fresh empty bundle but not for a large payload.
    let slot = MemorySlot::with_quota(2048);
    let mut store = SealedStore::open(
        options("app:sls"),
        Box::new(slot.clone()),
        Arc::new(DeviceKeyProvider::in_memory()),
    )
    .unwrap();

    let big = json!({"blob": "x".repeat(4096)});
    match store.set_data(&big) {
        Err(Error::StorageFull { attempted }) => assert!(attempted > 2048),
        other => panic!("expected StorageFull, got {other:?}"),
    }
    // The failed write did not clobber the previous payload.
    assert!(store.get_data().unwrap().is_empty().unwrap());
}

#[test]
fn clear_destroys_data_and_device_key() {
    let (mut store, slot, provider) = open_store("app:sls");
    store.set_data(&json!({"gone": true})).unwrap();
    let before = persisted_bundle(&slot);

    store.clear().unwrap();
    assert_eq!(store.mode(), Mode::Device);
    assert!(store.get_data().unwrap().is_empty().unwrap());
    assert!(store.last_reset_reason().is_none());

    // A fresh bundle exists and the device KEK was replaced: the old wrapped
    // key no longer unwraps under the provider's current key.
    let after = persisted_bundle(&slot);
    assert_ne!(before.header.wrapped_key, after.header.wrapped_key);
    let ns = options("app:sls").key_namespace;
    let current = provider.get_key(&ns).unwrap();
    let iv = {
        use base64::engine::general_purpose::STANDARD as BASE64;
        use base64::Engine as _;
        BASE64.decode(&before.header.iv).unwrap()
    };
    let wrapped = {
        use base64::engine::general_purpose::STANDARD as BASE64;
        use base64::Engine as _;
        BASE64.decode(&before.header.wrapped_key).unwrap()
    };
    let aad = sealslot_vault::wrap_aad(
        sealslot_vault::Ctx::Store,
        SealedStore::DATA_VERSION,
        "app:sls",
    );
    assert!(
        sealslot_crypto::unwrap_key(&iv, &wrapped, &current, false, Some(&aad)).is_err()
    );
}

#[test]
fn clear_works_from_the_locked_state() {
    let (mut store, _slot, _provider) = open_store("app:sls");
    store.set_master_password("pw").unwrap();
    store.lock();

    store.clear().unwrap();
    assert_eq!(store.mode(), Mode::Device);
    assert!(!store.is_using_master_password());
}

#[test]
fn master_rounds_option_is_validated() {
    let bad = sealslot_vault::StoreOptions {
        master_rounds: 1,
        ..Default::default()
    };
    assert!(matches!(
        SealedStore::open(
            bad,
            Box::new(MemorySlot::new()),
            Arc::new(DeviceKeyProvider::in_memory())
        ),
        Err(Error::Validation(_))
    ));
}

mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        #[test]
        fn set_get_always_round_trips(
            entries in proptest::collection::btree_map("[a-zA-Z0-9_]{1,12}", any::<i64>(), 0..10)
        ) {
            let (mut store, _slot, _provider) = open_store("app:sls");
            let payload = serde_json::to_value(&entries).unwrap();
            store.set_data(&payload).unwrap();
            prop_assert_eq!(store.get_data().unwrap().to_value().unwrap(), payload);
        }
    }
}
