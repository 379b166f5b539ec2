//! Integration tests for the decision pipeline

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tempfile::TempDir;
use userwall::engine::{matcher, ControlError, ProcessControl};
use userwall::snapshot::{JsonSnapshot, StaticSnapshot};
use userwall::{
    Action, AuditFilter, AuditLog, AuditSettings, ConnectionRef, Endpoint, Enforcer, Outcome,
    Pipeline, ProcessRef, Rule, RuleKind, RuleStore, SafetyMode, Target,
};

/// Control that records every side-effect request
#[derive(Clone, Default)]
struct RecordingControl {
    terminated: Arc<AtomicUsize>,
    gone: bool,
}

impl ProcessControl for RecordingControl {
    fn terminate(&self, pid: u32) -> Result<(), ControlError> {
        self.terminated.fetch_add(1, Ordering::SeqCst);
        if self.gone {
            Err(ControlError::TargetGone { pid })
        } else {
            Ok(())
        }
    }

    fn process_name(&self, pid: u32) -> Result<Option<String>, ControlError> {
        if self.gone {
            Err(ControlError::TargetGone { pid })
        } else {
            Ok(Some("owner".to_string()))
        }
    }
}

fn pipeline_with(dir: &TempDir, rules: Vec<Rule>, enforcer: Enforcer) -> Pipeline {
    let store = RuleStore::from_rules(dir.path().join("rules.json"), rules).unwrap();
    let audit = AuditLog::open(AuditSettings::new(dir.path().join("firewall_log.jsonl")));
    Pipeline::new(store.into_shared(), enforcer, audit)
}

// ============================================================================
// Scenarios
// ============================================================================

#[test]
fn test_spotify_block_dry_run() {
    let dir = TempDir::new().unwrap();
    let p = pipeline_with(
        &dir,
        vec![Rule::new("r1", RuleKind::ProcessName, "spotify", Action::Block)],
        Enforcer::simulated(),
    );

    let decisions = p.evaluate(&Target::Process(ProcessRef::new(42, "Spotify.exe")));
    assert_eq!(decisions.len(), 1);
    let d = &decisions[0];
    assert_eq!(d.pid(), Some(42));
    assert_eq!(d.rule_id(), "r1");
    assert_eq!(d.action(), "block");
    assert_eq!(d.outcome(), Outcome::Simulated);
    assert!(d.dry_run());
}

#[test]
fn test_port_terminate_dry_run() {
    let dir = TempDir::new().unwrap();
    let control = RecordingControl::default();
    let p = pipeline_with(
        &dir,
        vec![Rule::new("r2", RuleKind::Port, "8080", Action::Terminate)],
        Enforcer::new(SafetyMode::DryRun, Box::new(control.clone())),
    );

    let conn = ConnectionRef::new(Some(7), Some(Endpoint::new("0.0.0.0", 8080)), None);
    let decisions = p.evaluate(&Target::Connection(conn));
    assert_eq!(decisions.len(), 1);
    assert_eq!(decisions[0].outcome(), Outcome::Simulated);
    assert_eq!(decisions[0].port(), Some(8080));
    assert_eq!(control.terminated.load(Ordering::SeqCst), 0);
}

#[test]
fn test_unknown_action_logged_not_raised() {
    let dir = TempDir::new().unwrap();
    // Built in code: the rule store would refuse to persist this rule
    let quarantine = Rule::new(
        "q1",
        RuleKind::ProcessName,
        "chrome",
        Action::parse("quarantine"),
    );
    let audit = AuditLog::open(AuditSettings::new(dir.path().join("log.jsonl")));
    let enforcer = Enforcer::simulated();

    let target = Target::Process(ProcessRef::new(5, "chrome"));
    let decision = enforcer.apply(&target, &quarantine);
    assert_eq!(decision.outcome(), Outcome::UnknownAction);
    audit.append(&decision).unwrap();

    let logged = audit.query(&AuditFilter::all().with_rule_id("q1")).unwrap();
    assert_eq!(logged.len(), 1);
    assert_eq!(logged[0].action(), "quarantine");
    assert_eq!(logged[0].outcome(), Outcome::UnknownAction);
}

// ============================================================================
// Properties
// ============================================================================

#[test]
fn test_dry_run_is_always_simulated() {
    let control = RecordingControl::default();
    let enforcer = Enforcer::new(SafetyMode::DryRun, Box::new(control.clone()));

    let targets = vec![
        Target::Process(ProcessRef::new(1, "chrome").with_username("alice")),
        Target::Connection(ConnectionRef::new(
            Some(2),
            Some(Endpoint::new("10.0.0.1", 443)),
            Some(Endpoint::new("192.168.1.10", 50000)),
        )),
    ];
    let rules = vec![
        Rule::new("a", RuleKind::ProcessName, "chrome", Action::Terminate),
        Rule::new("b", RuleKind::Username, "alice", Action::Block),
        Rule::new("c", RuleKind::Port, "443", Action::Terminate),
        Rule::new("d", RuleKind::Ip, "192.168", Action::Allow),
    ];

    for target in &targets {
        for rule in &rules {
            let decision = enforcer.apply(target, rule);
            assert_eq!(decision.outcome(), Outcome::Simulated);
        }
    }
    assert_eq!(control.terminated.load(Ordering::SeqCst), 0);
}

#[test]
fn test_target_gone_repeats() {
    let control = RecordingControl {
        gone: true,
        ..RecordingControl::default()
    };
    let enforcer = Enforcer::new(SafetyMode::Live, Box::new(control));
    let target = Target::Process(ProcessRef::new(999, "ghost"));
    let rule = Rule::new("t", RuleKind::ProcessName, "ghost", Action::Terminate);

    for _ in 0..3 {
        assert_eq!(enforcer.apply(&target, &rule).outcome(), Outcome::TargetGone);
    }
}

#[test]
fn test_live_terminate_applied_and_described() {
    let control = RecordingControl::default();
    let enforcer = Enforcer::new(SafetyMode::Live, Box::new(control.clone()));
    let conn = Target::Connection(ConnectionRef::new(
        Some(77),
        Some(Endpoint::new("127.0.0.1", 8080)),
        Some(Endpoint::new("10.0.0.9", 61000)),
    ));
    let rule = Rule::new("r2", RuleKind::Port, "8080", Action::Terminate);

    let decision = enforcer.apply(&conn, &rule);
    assert_eq!(decision.outcome(), Outcome::Applied);
    assert!(!decision.dry_run());
    assert_eq!(
        decision.target(),
        "127.0.0.1:8080 <-> 10.0.0.9:61000 [owner (pid 77)]"
    );
    assert_eq!(control.terminated.load(Ordering::SeqCst), 1);
}

#[test]
fn test_non_exclusive_matches_all_logged_in_order() {
    let dir = TempDir::new().unwrap();
    let p = pipeline_with(
        &dir,
        vec![
            Rule::new("first", RuleKind::ProcessName, "chrome", Action::Allow),
            Rule::new("other", RuleKind::ProcessName, "firefox", Action::Block),
            Rule::new("second", RuleKind::Username, "bob", Action::Block),
            Rule::new("third", RuleKind::ProcessName, "HELPER", Action::Terminate),
        ],
        Enforcer::simulated(),
    );

    let target = Target::Process(ProcessRef::new(3, "Google Chrome Helper").with_username("bob"));
    let decisions = p.evaluate(&target);
    let ids: Vec<&str> = decisions.iter().map(|d| d.rule_id()).collect();
    assert_eq!(ids, vec!["first", "second", "third"]);

    let logged: Vec<String> = p
        .audit()
        .query(&AuditFilter::all().with_pid(3))
        .unwrap()
        .iter()
        .map(|d| d.rule_id().to_string())
        .collect();
    assert_eq!(logged, vec!["first", "second", "third"]);
}

#[test]
fn test_run_over_static_snapshot() {
    let dir = TempDir::new().unwrap();
    let p = pipeline_with(
        &dir,
        vec![
            Rule::new("ip", RuleKind::Ip, "93.184", Action::Block),
            Rule::new("name", RuleKind::ProcessName, "curl", Action::Terminate),
        ],
        Enforcer::simulated(),
    );

    let mut snapshot = StaticSnapshot::new(
        vec![ProcessRef::new(10, "curl"), ProcessRef::new(11, "bash")],
        vec![
            ConnectionRef::new(
                Some(10),
                Some(Endpoint::new("10.0.0.2", 40000)),
                Some(Endpoint::new("93.184.216.34", 443)),
            ),
            // listening socket: no remote side
            ConnectionRef::new(Some(11), Some(Endpoint::new("0.0.0.0", 22)), None),
        ],
    );

    let summary = p.run(&mut snapshot).unwrap();
    assert_eq!(summary.processes, 2);
    assert_eq!(summary.connections, 2);
    assert_eq!(summary.matches, 2);
    assert_eq!(summary.count(Outcome::Simulated), 2);
}

#[test]
fn test_rule_edits_visible_to_next_evaluation() {
    let dir = TempDir::new().unwrap();
    let p = pipeline_with(&dir, Vec::new(), Enforcer::simulated());
    let target = Target::Process(ProcessRef::new(8, "slack"));
    assert!(p.evaluate(&target).is_empty());

    p.rules()
        .write()
        .add(Rule::new("s", RuleKind::ProcessName, "slack", Action::Block))
        .unwrap();
    assert_eq!(p.evaluate(&target).len(), 1);
}

#[test]
fn test_matcher_example_from_docs() {
    let rules = vec![Rule::new("r1", RuleKind::ProcessName, "chrome", Action::Block)];
    let process = ProcessRef::new(100, "Google Chrome Helper");
    assert_eq!(matcher::match_process(&process, &rules).len(), 1);
}

#[test]
fn test_live_terminate_skips_reused_pid() {
    let dir = TempDir::new().unwrap();
    let control = RecordingControl::default();
    let p = pipeline_with(
        &dir,
        vec![Rule::new("t", RuleKind::ProcessName, "spotify", Action::Terminate)],
        Enforcer::new(SafetyMode::Live, Box::new(control.clone())),
    );

    // the control now names this pid "owner", not "spotify"
    let mut snapshot = StaticSnapshot::new(vec![ProcessRef::new(4242, "spotify")], Vec::new());
    let summary = p.run(&mut snapshot).unwrap();
    assert_eq!(summary.count(Outcome::TargetGone), 1);
    assert_eq!(control.terminated.load(Ordering::SeqCst), 0);
}

#[test]
fn test_snapshot_file_with_addr_field_names() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("snapshot.json");
    std::fs::write(
        &path,
        r#"{"connections": [{"pid": 7, "local_addr": {"ip": "127.0.0.1", "port": 8080}}]}"#,
    )
    .unwrap();

    let p = pipeline_with(
        &dir,
        vec![Rule::new("r2", RuleKind::Port, "8080", Action::Terminate)],
        Enforcer::simulated(),
    );
    let summary = p.run(&mut JsonSnapshot::new(&path)).unwrap();
    assert_eq!(summary.connections, 1);
    assert_eq!(summary.matches, 1);
    assert_eq!(summary.decisions[0].port(), Some(8080));
}
