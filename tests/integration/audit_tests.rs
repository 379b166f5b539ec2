//! Integration tests for audit logging and rotation

use std::fs;

use tempfile::TempDir;
use userwall::snapshot::DemoSnapshot;
use userwall::{
    Action, AuditFilter, AuditLog, AuditSettings, Enforcer, Pipeline, ProcessRef, Rule, RuleKind,
    RuleStore, Target,
};

fn small_log(dir: &TempDir, max_bytes: u64, max_archives: usize) -> AuditLog {
    let mut settings = AuditSettings::new(dir.path().join("firewall_log.jsonl"));
    settings.max_bytes = max_bytes;
    settings.max_archives = max_archives;
    AuditLog::open(settings)
}

#[test]
fn test_rotation_never_loses_records() {
    let dir = TempDir::new().unwrap();
    let log = small_log(&dir, 2048, 100);
    let enforcer = Enforcer::simulated();
    let rule = Rule::new("r1", RuleKind::ProcessName, "app", Action::Block);

    for pid in 0..200u32 {
        let target = Target::Process(ProcessRef::new(pid, format!("app-{}", pid)));
        let decision = enforcer.apply(&target, &rule);
        log.append(&decision).unwrap();
        assert_eq!(
            log.query(&AuditFilter::all()).unwrap().last(),
            Some(&decision)
        );
    }

    assert!(log.archive_paths().len() > 1);
    let pids: Vec<u32> = log
        .query_all(&AuditFilter::all())
        .unwrap()
        .iter()
        .filter_map(|d| d.pid())
        .collect();
    assert_eq!(pids, (0..200).collect::<Vec<u32>>());
}

#[test]
fn test_rotated_files_use_numeric_suffix() {
    let dir = TempDir::new().unwrap();
    let log = small_log(&dir, 1, 3);
    let enforcer = Enforcer::simulated();
    let rule = Rule::new("r1", RuleKind::ProcessName, "a", Action::Allow);
    let target = Target::Process(ProcessRef::new(1, "a"));

    for _ in 0..3 {
        log.append(&enforcer.apply(&target, &rule)).unwrap();
    }

    let mut names: Vec<String> = fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    assert_eq!(
        names,
        vec![
            "firewall_log.jsonl",
            "firewall_log.jsonl.1",
            "firewall_log.jsonl.2"
        ]
    );
    // each file holds one whole record
    for path in log.archive_paths() {
        let content = fs::read_to_string(path).unwrap();
        assert_eq!(content.lines().count(), 1);
    }
}

#[test]
fn test_legacy_lines_are_skipped() {
    let dir = TempDir::new().unwrap();
    let log = small_log(&dir, 1024 * 1024, 3);
    let path = log.path().unwrap().to_path_buf();
    fs::write(
        &path,
        "{\"timestamp\": \"2024-05-01 10:00:00\", \"pid\": 1, \"port\": null, \"rule_id\": \"r1\", \"result\": \"blocked\"}\n",
    )
    .unwrap();

    let enforcer = Enforcer::simulated();
    let rule = Rule::new("r1", RuleKind::ProcessName, "a", Action::Block);
    log.append(&enforcer.apply(&Target::Process(ProcessRef::new(2, "a")), &rule))
        .unwrap();

    let records = log.query(&AuditFilter::all().with_rule_id("r1")).unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].pid(), Some(2));
}

#[test]
fn test_demo_scan_logs_every_decision() {
    let dir = TempDir::new().unwrap();
    let store = RuleStore::from_rules(
        dir.path().join("rules.json"),
        vec![
            Rule::new("r1", RuleKind::ProcessName, "spotify", Action::Block),
            Rule::new("r2", RuleKind::Port, "8080", Action::Terminate),
            Rule::new("r3", RuleKind::Ip, "192.168.", Action::Allow),
        ],
    )
    .unwrap();
    let log = small_log(&dir, 512, 50);
    let pipeline = Pipeline::new(store.into_shared(), Enforcer::simulated(), log);

    let summary = pipeline.run(&mut DemoSnapshot::new()).unwrap();
    assert!(summary.matches > 0);

    let all = pipeline.audit().query_all(&AuditFilter::all()).unwrap();
    assert_eq!(all.len(), summary.matches);
    assert_eq!(all, summary.decisions);

    let terminate = pipeline
        .audit()
        .query_all(&AuditFilter::all().with_action("terminate"))
        .unwrap();
    assert!(terminate.iter().all(|d| d.rule_id() == "r2"));
    assert!(terminate.iter().all(|d| d.port() == Some(8080)));
}
