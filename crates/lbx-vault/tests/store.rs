//! Integration tests: vault lifecycle against a real file in a temp dir.
//!
//! Most tests run Argon2id with a cheap override so the suite stays fast.
//! Stores built with `VaultStore::new` use the format's pinned parameters.

use lbx_core::LockboxError;
use lbx_crypto::KdfParams;
use lbx_vault::{ExportFormat, SealedVault, VaultStore};
use proptest::prelude::*;
use secrecy::SecretString;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn fast_params() -> KdfParams {
    KdfParams {
        mem_cost_kib: 1024,
        time_cost: 1,
        parallelism: 1,
    }
}

fn vault_path(dir: &Path) -> PathBuf {
    dir.join("vault.json")
}

fn open_store(dir: &Path) -> VaultStore {
    VaultStore::with_params(vault_path(dir), fast_params())
}

fn pw(s: &str) -> SecretString {
    SecretString::from(s.to_string())
}

#[test]
fn correct_horse_scenario() {
    let tmp = TempDir::new().unwrap();
    let mut store = open_store(tmp.path());
    store.initialize(&pw("correct-horse")).unwrap();

    store.add_secret("API_KEY", "abc123", None).unwrap();
    assert_eq!(store.list_secrets().unwrap(), ["API_KEY"]);

    let secret = store.get_secret("API_KEY").unwrap();
    assert_eq!(secret.value, "abc123");
    assert_eq!(secret.version, 1);

    let version = store.update_secret("API_KEY", "xyz789", None).unwrap();
    assert_eq!(version, 2);
    assert_eq!(store.get_secret("API_KEY").unwrap().version, 2);

    store.remove_secret("API_KEY").unwrap();
    assert!(store.list_secrets().unwrap().is_empty());
    assert!(matches!(
        store.get_secret("API_KEY"),
        Err(LockboxError::SecretNotFound(_))
    ));
}

#[test]
fn reload_reconstructs_identical_secrets() {
    let tmp = TempDir::new().unwrap();
    let mut store = open_store(tmp.path());
    store.initialize(&pw("pw")).unwrap();
    store
        .add_secret("DB_URL", "postgres://u:p@db/app", Some("primary database"))
        .unwrap();
    store.add_secret("TOKEN", "t0k3n", None).unwrap();
    store.update_secret("TOKEN", "t0k3n-2", None).unwrap();
    let before = store.get_all_secrets().unwrap();
    drop(store);

    let mut reopened = open_store(tmp.path());
    reopened.load(&pw("pw")).unwrap();

    assert_eq!(reopened.get_all_secrets().unwrap(), before);
    assert_eq!(
        reopened.get_secret("DB_URL").unwrap().value,
        "postgres://u:p@db/app"
    );
    assert_eq!(reopened.get_secret("TOKEN").unwrap().value, "t0k3n-2");
    assert_eq!(reopened.metadata().unwrap().key_count, 2);
}

#[test]
fn default_stores_open_each_others_vaults() {
    let tmp = TempDir::new().unwrap();
    let path = vault_path(tmp.path());

    let mut writer = VaultStore::new(&path);
    writer.initialize(&pw("correct-horse")).unwrap();
    writer.add_secret("API_KEY", "abc123", None).unwrap();
    drop(writer);

    let mut reader = VaultStore::new(&path);
    reader.load(&pw("correct-horse")).unwrap();
    assert_eq!(reader.get_secret("API_KEY").unwrap().value, "abc123");
}

#[test]
fn cost_override_does_not_open_default_vault() {
    let tmp = TempDir::new().unwrap();
    let path = vault_path(tmp.path());
    VaultStore::new(&path).initialize(&pw("correct-horse")).unwrap();

    let err = open_store(tmp.path()).load(&pw("correct-horse")).unwrap_err();
    assert!(matches!(err, LockboxError::InvalidKey));
}

#[test]
fn wrong_password_is_invalid_key() {
    let tmp = TempDir::new().unwrap();
    let mut store = open_store(tmp.path());
    store.initialize(&pw("right")).unwrap();
    store.add_secret("K", "v", None).unwrap();

    let mut other = open_store(tmp.path());
    let err = other.load(&pw("wrong")).unwrap_err();
    assert!(matches!(err, LockboxError::InvalidKey));
    assert_eq!(err.to_string(), "invalid password or corrupted vault");
    assert!(matches!(other.list_secrets(), Err(LockboxError::VaultLocked)));
}

#[test]
fn tampered_ciphertext_is_invalid_key() {
    let tmp = TempDir::new().unwrap();
    let mut store = open_store(tmp.path());
    store.initialize(&pw("pw")).unwrap();
    store.add_secret("K", "v", None).unwrap();

    let path = vault_path(tmp.path());
    let mut sealed = SealedVault::read(&path).unwrap();
    let flipped = if sealed.encrypted.starts_with('0') { "1" } else { "0" };
    sealed.encrypted.replace_range(0..1, flipped);
    sealed.write(&path).unwrap();

    let err = open_store(tmp.path()).load(&pw("pw")).unwrap_err();
    assert!(matches!(err, LockboxError::InvalidKey));
}

#[test]
fn add_existing_key_never_overwrites() {
    let tmp = TempDir::new().unwrap();
    let mut store = open_store(tmp.path());
    store.initialize(&pw("pw")).unwrap();
    store.add_secret("K", "first", None).unwrap();

    let err = store.add_secret("K", "second", None).unwrap_err();
    assert!(matches!(err, LockboxError::SecretAlreadyExists(_)));
    assert_eq!(store.get_secret("K").unwrap().value, "first");
    assert_eq!(store.get_secret("K").unwrap().version, 1);
}

#[test]
fn get_secret_returns_a_copy() {
    let tmp = TempDir::new().unwrap();
    let mut store = open_store(tmp.path());
    store.initialize(&pw("pw")).unwrap();
    store.add_secret("K", "original", None).unwrap();

    let mut copy = store.get_secret("K").unwrap();
    copy.value = "mutated".into();
    copy.version = 99;

    let fresh = store.get_secret("K").unwrap();
    assert_eq!(fresh.value, "original");
    assert_eq!(fresh.version, 1);
}

#[test]
fn update_without_description_keeps_it() {
    let tmp = TempDir::new().unwrap();
    let mut store = open_store(tmp.path());
    store.initialize(&pw("pw")).unwrap();
    store.add_secret("K", "v1", Some("kept")).unwrap();
    store.update_secret("K", "v2", None).unwrap();

    assert_eq!(
        store.get_secret("K").unwrap().description.as_deref(),
        Some("kept")
    );
}

#[test]
fn missing_key_operations_fail() {
    let tmp = TempDir::new().unwrap();
    let mut store = open_store(tmp.path());
    store.initialize(&pw("pw")).unwrap();

    assert!(matches!(
        store.update_secret("NOPE", "v", None),
        Err(LockboxError::SecretNotFound(_))
    ));
    assert!(matches!(
        store.remove_secret("NOPE"),
        Err(LockboxError::SecretNotFound(_))
    ));
}

#[test]
fn locked_store_refuses_save_and_reads() {
    let tmp = TempDir::new().unwrap();
    let mut store = open_store(tmp.path());
    store.initialize(&pw("pw")).unwrap();
    store.add_secret("K", "v", None).unwrap();
    store.clear_master_key();

    assert!(matches!(store.save(), Err(LockboxError::VaultLocked)));
    assert!(matches!(store.get_secret("K"), Err(LockboxError::VaultLocked)));

    store.load(&pw("pw")).unwrap();
    assert_eq!(store.get_secret("K").unwrap().value, "v");
}

#[test]
fn load_missing_vault_is_vault_not_found() {
    let tmp = TempDir::new().unwrap();
    let mut store = open_store(tmp.path());
    assert!(matches!(
        store.load(&pw("pw")),
        Err(LockboxError::VaultNotFound(_))
    ));
}

#[test]
fn saves_leave_no_temp_files() {
    let tmp = TempDir::new().unwrap();
    let mut store = open_store(tmp.path());
    store.initialize(&pw("pw")).unwrap();
    for i in 0..5 {
        store.add_secret(&format!("K{i}"), "v", None).unwrap();
    }

    let names: Vec<String> = std::fs::read_dir(tmp.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
        .collect();
    assert_eq!(names, ["vault.json"]);
}

#[test]
fn each_save_uses_a_fresh_iv_but_keeps_the_salt() {
    let tmp = TempDir::new().unwrap();
    let path = vault_path(tmp.path());
    let mut store = open_store(tmp.path());
    store.initialize(&pw("pw")).unwrap();
    let first = SealedVault::read(&path).unwrap();

    store.save().unwrap();
    let second = SealedVault::read(&path).unwrap();

    assert_ne!(first.iv, second.iv);
    assert_eq!(first.metadata.salt, second.metadata.salt);
    assert_eq!(
        SealedVault::read_metadata(&path).unwrap().salt,
        store.metadata().unwrap().salt
    );
}

#[test]
fn env_export_import_between_vaults() {
    let tmp = TempDir::new().unwrap();
    let mut src = VaultStore::with_params(tmp.path().join("a.json"), fast_params());
    src.initialize(&pw("a")).unwrap();
    src.add_secret("API_KEY", "abc123", None).unwrap();
    src.add_secret("GREETING", "hello world", None).unwrap();
    let dump = src.export_secrets(ExportFormat::Env).unwrap();

    let mut dst = VaultStore::with_params(tmp.path().join("b.json"), fast_params());
    dst.initialize(&pw("b")).unwrap();
    assert_eq!(dst.import_secrets(&dump, ExportFormat::Env, false).unwrap(), 2);

    assert_eq!(dst.get_secret("GREETING").unwrap().value, "hello world");
    assert_eq!(dst.get_secret("API_KEY").unwrap().version, 1);
}

#[test]
fn import_skips_existing_unless_overwrite() {
    let tmp = TempDir::new().unwrap();
    let mut store = open_store(tmp.path());
    store.initialize(&pw("pw")).unwrap();
    store.add_secret("A", "old", None).unwrap();

    let data = r#"{ "A": "new", "B": { "value": "b", "description": "bee" } }"#;

    assert_eq!(store.import_secrets(data, ExportFormat::Json, false).unwrap(), 1);
    assert_eq!(store.get_secret("A").unwrap().value, "old");
    assert_eq!(
        store.get_secret("B").unwrap().description.as_deref(),
        Some("bee")
    );

    assert_eq!(store.import_secrets(data, ExportFormat::Json, true).unwrap(), 2);
    let a = store.get_secret("A").unwrap();
    assert_eq!(a.value, "new");
    assert_eq!(a.version, 2);
}

#[test]
fn import_with_invalid_key_changes_nothing() {
    let tmp = TempDir::new().unwrap();
    let mut store = open_store(tmp.path());
    store.initialize(&pw("pw")).unwrap();

    let err = store
        .import_secrets("GOOD=1\nBAD KEY=2\n", ExportFormat::Env, false)
        .unwrap_err();
    assert!(matches!(err, LockboxError::Format(_)));
    assert!(store.is_empty().unwrap());
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    /// Every update bumps the version by exactly one, persisted across reloads.
    #[test]
    fn prop_update_versions_are_sequential(values in prop::collection::vec("[a-z0-9]{0,12}", 1..8)) {
        let tmp = TempDir::new().unwrap();
        let mut store = open_store(tmp.path());
        store.initialize(&pw("pw")).unwrap();
        store.add_secret("K", "seed", None).unwrap();

        for (i, value) in values.iter().enumerate() {
            let version = store.update_secret("K", value, None).unwrap();
            prop_assert_eq!(version, i as u64 + 2);
        }

        let mut reopened = open_store(tmp.path());
        reopened.load(&pw("pw")).unwrap();
        let rec = reopened.get_secret("K").unwrap();
        prop_assert_eq!(rec.version, values.len() as u64 + 1);
        prop_assert_eq!(&rec.value, values.last().unwrap());
        prop_assert!(rec.updated_at >= rec.created_at);
    }
}
