mod support;

use sealslot_vault::{Bundle, Ctx, Error, ImportOutcome, Mode, SlotStore};
use serde_json::json;
use support::{open_store, persisted_bundle};

#[test]
fn custom_password_export_imports_into_device_mode() {
    // Scenario: device-to-device transfer with a one-off export password.
    let (mut source, _slot, _provider) = open_store("src");
    source.set_data(&json!({"a": 1})).unwrap();

    let exported = source.export_data(Some("export-pass")).unwrap();

    // The export bundle carries the export context and the custom marker.
    let bundle = Bundle::parse(&exported).unwrap();
    assert_eq!(bundle.header.ctx, Some(Ctx::Export));
    assert_eq!(bundle.header.master_pw, Some(false));
    assert!(bundle.header.rounds > 1);

    let (mut target, slot, _provider) = open_store("dst");
    let outcome = target.import_data(&exported, Some("export-pass")).unwrap();
    assert_eq!(outcome, ImportOutcome::CustomExportPassword);
    assert_eq!(outcome.as_str(), "customExportPassword");

    // Unlocked device mode, payload intact, rewrapped for local storage.
    assert_eq!(target.mode(), Mode::Device);
    assert_eq!(target.get_data().unwrap().to_value().unwrap(), json!({"a": 1}));
    let local = persisted_bundle(&slot);
    assert_eq!(local.header.ctx, Some(Ctx::Store));
    assert_eq!(local.header.rounds, 1);
    assert_eq!(local.header.salt, "");
}

#[test]
fn master_export_imports_locked() {
    // Scenario: moving a master-protected store; the password travels with it.
    let (mut source, _slot, _provider) = open_store("src");
    source.set_data(&json!({"z": 9})).unwrap();
    source.set_master_password("mp").unwrap();

    let exported = source.export_data(None).unwrap();
    let bundle = Bundle::parse(&exported).unwrap();
    assert_eq!(bundle.header.master_pw, Some(true));
    assert_eq!(bundle.header.ctx, Some(Ctx::Export));

    let (mut target, _slot, _provider) = open_store("dst");
    let outcome = target.import_data(&exported, Some("mp")).unwrap();
    assert_eq!(outcome, ImportOutcome::MasterPassword);
    assert_eq!(outcome.as_str(), "masterPassword");

    assert!(target.is_locked());
    assert!(matches!(target.get_data(), Err(Error::Locked)));
    target.unlock("mp").unwrap();
    assert_eq!(target.get_data().unwrap().to_value().unwrap(), json!({"z": 9}));
}

#[test]
fn master_export_with_custom_password_is_a_custom_export() {
    let (mut source, _slot, _provider) = open_store("src");
    source.set_data(&json!({"n": 3})).unwrap();
    source.set_master_password("mp").unwrap();

    // A custom password overrides the session even in master mode.
    let exported = source.export_data(Some("one-off")).unwrap();
    let bundle = Bundle::parse(&exported).unwrap();
    assert_eq!(bundle.header.master_pw, Some(false));

    let (mut target, _slot, _provider) = open_store("dst");
    let outcome = target.import_data(&exported, Some("one-off")).unwrap();
    assert_eq!(outcome, ImportOutcome::CustomExportPassword);
    assert_eq!(target.mode(), Mode::Device);
    assert_eq!(target.get_data().unwrap().to_value().unwrap(), json!({"n": 3}));
}

#[test]
fn store_context_master_bundle_is_adopted_verbatim() {
    // Importing a locally persisted (ctx = store) master bundle keeps the
    // header byte-for-byte when the storage keys match.
    let (mut source, source_slot, _provider) = open_store("app");
    source.set_data(&json!({"copied": true})).unwrap();
    source.set_master_password("mp").unwrap();
    let raw = source_slot.get().unwrap().unwrap();
    let original = Bundle::parse(&raw).unwrap();

    let (mut target, target_slot, _provider) = open_store("app");
    let outcome = target.import_data(&raw, Some("mp")).unwrap();
    assert_eq!(outcome, ImportOutcome::MasterPassword);
    assert!(target.is_locked());

    let adopted = persisted_bundle(&target_slot);
    assert_eq!(adopted.header, original.header);
    assert_eq!(adopted.data, original.data);

    target.unlock("mp").unwrap();
    assert_eq!(
        target.get_data().unwrap().to_value().unwrap(),
        json!({"copied": true})
    );
}

#[test]
fn export_requires_a_password_in_device_mode() {
    let (store, _slot, _provider) = open_store("src");
    assert!(matches!(store.export_data(None), Err(Error::Export(_))));
    assert!(matches!(store.export_data(Some("   ")), Err(Error::Export(_))));
}

#[test]
fn export_is_refused_while_locked() {
    let (mut store, _slot, _provider) = open_store("src");
    store.set_master_password("mp").unwrap();
    store.lock();
    assert!(matches!(store.export_data(None), Err(Error::Locked)));
}

#[test]
fn export_does_not_disturb_the_local_bundle() {
    let (mut store, slot, _provider) = open_store("src");
    store.set_data(&json!({"local": 1})).unwrap();
    let before = persisted_bundle(&slot);

    let _ = store.export_data(Some("pw")).unwrap();

    assert_eq!(persisted_bundle(&slot), before);
    assert_eq!(store.get_data().unwrap().to_value().unwrap(), json!({"local": 1}));
}

#[test]
fn each_export_is_freshly_wrapped() {
    let (mut store, _slot, _provider) = open_store("src");
    store.set_data(&json!({"v": 1})).unwrap();
    store.set_master_password("mp").unwrap();

    let e1 = Bundle::parse(&store.export_data(None).unwrap()).unwrap();
    let e2 = Bundle::parse(&store.export_data(None).unwrap()).unwrap();
    assert_ne!(e1.header.iv, e2.header.iv);
    assert_ne!(e1.header.wrapped_key, e2.header.wrapped_key);
    assert_ne!(e1.data.ciphertext, e2.data.ciphertext);
}

#[test]
fn import_with_wrong_password_fails_and_leaves_state_alone() {
    let (mut source, _slot, _provider) = open_store("src");
    source.set_data(&json!({"a": 1})).unwrap();
    let exported = source.export_data(Some("right")).unwrap();

    let (mut target, slot, _provider) = open_store("dst");
    target.set_data(&json!({"existing": true})).unwrap();
    let before = persisted_bundle(&slot);

    match target.import_data(&exported, Some("wrong")) {
        Err(Error::Import(msg)) => assert!(msg.contains("authentication failed")),
        other => panic!("expected import failure, got {other:?}"),
    }
    assert_eq!(persisted_bundle(&slot), before);
    assert_eq!(
        target.get_data().unwrap().to_value().unwrap(),
        json!({"existing": true})
    );
}

#[test]
fn import_without_password_names_the_required_kind() {
    let (mut source, _slot, _provider) = open_store("src");
    source.set_data(&json!({"a": 1})).unwrap();
    let custom = source.export_data(Some("pw")).unwrap();
    source.set_master_password("mp").unwrap();
    let master = source.export_data(None).unwrap();

    let (mut target, _slot, _provider) = open_store("dst");
    match target.import_data(&custom, None) {
        Err(Error::Import(msg)) => assert!(msg.contains("export password")),
        other => panic!("expected import failure, got {other:?}"),
    }
    match target.import_data(&master, Some("  ")) {
        Err(Error::Import(msg)) => assert!(msg.contains("master password")),
        other => panic!("expected import failure, got {other:?}"),
    }
}

#[test]
fn import_replaces_an_existing_master_protected_store() {
    // Import is legal even while locked; the incoming bundle wins.
    let (mut source, _slot, _provider) = open_store("src");
    source.set_data(&json!({"incoming": 1})).unwrap();
    let exported = source.export_data(Some("pw")).unwrap();

    let (mut target, _slot, _provider) = open_store("dst");
    target.set_master_password("local-mp").unwrap();
    target.lock();

    let outcome = target.import_data(&exported, Some("pw")).unwrap();
    assert_eq!(outcome, ImportOutcome::CustomExportPassword);
    assert_eq!(target.mode(), Mode::Device);
    assert_eq!(
        target.get_data().unwrap().to_value().unwrap(),
        json!({"incoming": 1})
    );
}

#[test]
fn export_import_round_trips_varied_payloads() {
    let payloads = [
        json!({}),
        json!({"unicode": "héllo wörld ∆", "n": -1.5}),
        json!({"deep": {"nested": {"list": [1, 2, {"x": null}]}}, "b": true}),
    ];
    for payload in payloads {
        let (mut source, _slot, _provider) = open_store("src");
        source.set_data(&payload).unwrap();
        let exported = source.export_data(Some("round-trip")).unwrap();

        let (mut target, _slot, _provider) = open_store("dst");
        target.import_data(&exported, Some("round-trip")).unwrap();
        assert_eq!(target.get_data().unwrap().to_value().unwrap(), payload);
    }
}

#[test]
fn oversized_import_is_rejected_before_parsing() {
    let (mut target, _slot, _provider) = open_store("dst");
    let huge = format!("{{\"pad\": \"{}\"}}", "x".repeat(sealslot_vault::MAX_IMPORT_BYTES));
    match target.import_data(&huge, Some("pw")) {
        Err(Error::Import(msg)) => assert!(msg.contains("import limit")),
        other => panic!("expected size rejection, got {other:?}"),
    }
}
