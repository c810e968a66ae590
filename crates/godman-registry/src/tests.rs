use std::fs;
use std::path::PathBuf;

use godman_core::{Edition, InstallEntry, InstallRegistry, Platform, Scope};

use super::*;

fn test_root(name: &str) -> PathBuf {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("system time")
        .as_nanos();
    std::env::temp_dir().join(format!("godman-registry-test-{name}-{nanos}"))
}

fn sample_entry(version: &str, path: &str) -> InstallEntry {
    InstallEntry::new(
        version,
        Edition::Standard,
        Platform::Linux,
        Scope::User,
        PathBuf::from(path),
    )
}

#[test]
fn load_missing_file_returns_empty_registry() {
    let root = test_root("missing");
    let store = RegistryStore::in_dir(&root);

    let registry = store.load().expect("missing file must load");

    assert!(registry.installs.is_empty());
    assert!(registry.active_id.is_none());
    assert!(!root.exists(), "load must not create directories");
}

#[test]
fn save_then_load_reproduces_entries_and_active_id() {
    let root = test_root("roundtrip");
    let store = RegistryStore::in_dir(&root.join("nested").join("config"));

    let mut registry = InstallRegistry::default();
    registry.upsert(sample_entry("4.2", "/opt/godot-4.2"));
    registry.upsert(sample_entry("4.3", "/opt/godot-4.3"));
    let active = registry.installs[1].id;
    registry.mark_active(active);

    store.save(&registry).expect("must save");
    let loaded = store.load().expect("must load");

    assert_eq!(loaded.installs.len(), 2);
    assert_eq!(loaded.active_id, Some(active));
    assert!(loaded.installs[1].is_active);
    assert!(!loaded.installs[0].is_active);
    assert_eq!(loaded.installs[0].id, registry.installs[0].id);

    store.save(&loaded).expect("must save again");
    let reloaded = store.load().expect("must load again");
    assert_eq!(reloaded, loaded);

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn saved_document_is_pretty_camel_case_without_transient_flag() {
    let root = test_root("shape");
    let store = RegistryStore::in_dir(&root);

    let mut registry = InstallRegistry::default();
    registry.upsert(sample_entry("4.3", "/opt/godot"));
    let id = registry.installs[0].id;
    registry.mark_active(id);
    store.save(&registry).expect("must save");

    let raw = fs::read_to_string(store.path()).expect("must read registry file");
    assert!(raw.contains("\n  \"installs\""));
    assert!(raw.contains("\"activeId\""));
    assert!(raw.contains("\"addedAt\""));
    assert!(!raw.contains("isActive"));
    assert!(
        !root.join("installs.json.part").exists(),
        "temporary file must be renamed away"
    );

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn load_recomputes_flags_and_tolerates_dangling_active_id() {
    let root = test_root("dangling");
    fs::create_dir_all(&root).expect("must create root");
    let store = RegistryStore::in_dir(&root);

    let mut registry = InstallRegistry::default();
    registry.upsert(sample_entry("4.3", "/opt/godot"));
    registry.active_id = Some(uuid::Uuid::new_v4());
    store.save(&registry).expect("must save");

    let loaded = store.load().expect("must load");
    assert!(loaded.get_active().is_none());
    assert!(loaded.installs.iter().all(|install| !install.is_active));

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn load_rejects_corrupt_json_with_path_context() {
    let root = test_root("corrupt");
    fs::create_dir_all(&root).expect("must create root");
    let store = RegistryStore::in_dir(&root);
    fs::write(store.path(), "{ \"installs\": [ oops").expect("must write corrupt file");

    let err = store.load().expect_err("corrupt registry must fail");
    let message = format!("{err:#}");
    assert!(message.contains("failed parsing install registry"));
    assert!(message.contains("installs.json"));

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn update_saves_only_when_closure_succeeds() {
    let root = test_root("update");
    let store = RegistryStore::in_dir(&root);

    let failed = store.update::<()>(|registry| {
        registry.upsert(sample_entry("4.3", "/opt/godot"));
        anyhow::bail!("abort before save")
    });
    assert!(failed.is_err());
    assert!(!store.path().exists());

    let count = store
        .update(|registry| {
            registry.upsert(sample_entry("4.3", "/opt/godot"));
            Ok(registry.installs.len())
        })
        .expect("update must succeed");
    assert_eq!(count, 1);
    assert_eq!(store.load().expect("must load").installs.len(), 1);

    let _ = fs::remove_dir_all(&root);
}
