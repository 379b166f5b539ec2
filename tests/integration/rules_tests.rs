//! Integration tests for the rule store

use std::fs;
use std::thread;

use tempfile::TempDir;
use userwall::{Action, FirewallError, Rule, RuleKind, RuleStore};

fn write_rules(dir: &TempDir, content: &str) -> std::path::PathBuf {
    let path = dir.path().join("rules.json");
    fs::write(&path, content).unwrap();
    path
}

// ============================================================================
// Loading
// ============================================================================

#[test]
fn test_load_preserves_file_order() {
    let dir = TempDir::new().unwrap();
    let path = write_rules(
        &dir,
        r#"[
            {"id": "z", "type": "ip", "value": "10.0.0.1", "action": "block"},
            {"id": "a", "type": "process_name", "value": "chrome", "action": "terminate"},
            {"id": "m", "type": "port", "value": "8080", "action": "allow"}
        ]"#,
    );

    let store = RuleStore::open(&path).unwrap();
    let ids: Vec<&str> = store.list().iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["z", "a", "m"]);
}

#[test]
fn test_empty_file_is_empty_set() {
    let dir = TempDir::new().unwrap();
    let path = write_rules(&dir, "  \n");
    assert!(RuleStore::open(&path).unwrap().is_empty());
}

#[test]
fn test_unknown_action_rejects_load() {
    let dir = TempDir::new().unwrap();
    let path = write_rules(
        &dir,
        r#"[{"id": "q", "type": "process_name", "value": "x", "action": "quarantine"}]"#,
    );
    let err = RuleStore::open(&path).unwrap_err();
    assert!(matches!(err, FirewallError::Config { .. }));
    assert!(err.to_string().contains("quarantine"));
}

#[test]
fn test_unknown_type_rejects_load() {
    let dir = TempDir::new().unwrap();
    let path = write_rules(
        &dir,
        r#"[{"id": "h", "type": "hostname", "value": "x", "action": "block"}]"#,
    );
    assert!(matches!(
        RuleStore::open(&path),
        Err(FirewallError::Config { .. })
    ));
}

#[test]
fn test_object_instead_of_list_rejected() {
    let dir = TempDir::new().unwrap();
    let path = write_rules(&dir, r#"{"rules": []}"#);
    assert!(matches!(
        RuleStore::open(&path),
        Err(FirewallError::Config { .. })
    ));
}

#[test]
fn test_garbage_rejected() {
    let dir = TempDir::new().unwrap();
    let path = write_rules(&dir, "[{");
    assert!(matches!(
        RuleStore::open(&path),
        Err(FirewallError::Config { .. })
    ));
}

// ============================================================================
// Mutations
// ============================================================================

#[test]
fn test_add_delete_roundtrip_on_disk() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested/dir/rules.json");
    let mut store = RuleStore::open(&path).unwrap();

    store
        .add(Rule::new("r1", RuleKind::ProcessName, "spotify", Action::Block))
        .unwrap();
    store
        .add(Rule::new("r2", RuleKind::Port, "8080", Action::Terminate))
        .unwrap();

    let on_disk: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(on_disk[0]["type"], "process_name");
    assert_eq!(on_disk[1]["value"], "8080");

    let removed = store.delete("r1").unwrap();
    assert_eq!(removed.id, "r1");

    let reopened = RuleStore::open(&path).unwrap();
    assert_eq!(reopened.len(), 1);
    assert_eq!(reopened.list()[0].id, "r2");
}

#[test]
fn test_add_invalid_rule_rejected_and_not_persisted() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("rules.json");
    let mut store = RuleStore::open(&path).unwrap();

    let bad = Rule::new("r1", RuleKind::ProcessName, "", Action::Block);
    assert!(matches!(store.add(bad), Err(FirewallError::Config { .. })));

    let unknown = Rule::new("r2", RuleKind::Ip, "1.1.1.1", Action::parse("quarantine"));
    assert!(matches!(store.add(unknown), Err(FirewallError::Config { .. })));

    assert!(store.is_empty());
    assert!(!path.exists());
}

#[test]
fn test_update_unknown_is_not_found() {
    let dir = TempDir::new().unwrap();
    let mut store = RuleStore::open(dir.path().join("rules.json")).unwrap();
    let err = store
        .update(Rule::new("ghost", RuleKind::Ip, "1.1.1.1", Action::Allow))
        .unwrap_err();
    assert!(matches!(err, FirewallError::NotFound { .. }));
}

#[test]
fn test_reload_picks_up_external_edit() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("rules.json");
    let mut store = RuleStore::open(&path).unwrap();

    fs::write(
        &path,
        r#"[{"id": "ext", "type": "username", "value": "root", "action": "allow"}]"#,
    )
    .unwrap();
    store.reload().unwrap();
    assert!(store.get("ext").is_some());

    // A broken edit leaves the previous set in place
    fs::write(&path, "not json").unwrap();
    assert!(store.reload().is_err());
    assert!(store.get("ext").is_some());
}

#[test]
fn test_shared_store_serializes_writers() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("rules.json");
    let shared = RuleStore::open(&path).unwrap().into_shared();

    let handles: Vec<_> = (0..4)
        .map(|t| {
            let shared = shared.clone();
            thread::spawn(move || {
                for i in 0..10 {
                    let id = format!("t{}-{}", t, i);
                    shared
                        .write()
                        .add(Rule::new(id, RuleKind::ProcessName, "x", Action::Allow))
                        .unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(shared.read().len(), 40);
    assert_eq!(RuleStore::open(&path).unwrap().len(), 40);
}
