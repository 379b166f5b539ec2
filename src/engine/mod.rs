//! Decision pipeline for userwall
//!
//! snapshot -> matcher -> enforcer -> audit log, one target at a time.

pub mod control;
pub mod enforcer;
pub mod matcher;

use std::collections::HashMap;

use tracing::{debug, info, warn};

use crate::audit::AuditLog;
use crate::decision::{Decision, Outcome};
use crate::error::Result;
use crate::rules::{Rule, SharedRuleStore};
use crate::snapshot::SnapshotProvider;
use crate::target::Target;

pub use control::{ControlError, NoopControl, ProcessControl, SignalControl};
pub use enforcer::{describe, Enforcer};

/// Totals for one pass over a snapshot
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub processes: usize,
    pub connections: usize,
    pub matches: usize,
    pub outcomes: HashMap<Outcome, usize>,
    /// Decisions that could not be written to the audit log
    pub audit_failures: usize,
    /// Port or ip rules were loaded but the provider could not list sockets
    pub connections_unavailable: bool,
    pub decisions: Vec<Decision>,
}

impl RunSummary {
    pub fn count(&self, outcome: Outcome) -> usize {
        self.outcomes.get(&outcome).copied().unwrap_or(0)
    }

    fn record(&mut self, decisions: Vec<Decision>, audit_failures: usize) {
        self.matches += decisions.len();
        self.audit_failures += audit_failures;
        for decision in &decisions {
            *self.outcomes.entry(decision.outcome()).or_insert(0) += 1;
        }
        self.decisions.extend(decisions);
    }
}

/// The main decision pipeline
pub struct Pipeline {
    rules: SharedRuleStore,
    enforcer: Enforcer,
    audit: AuditLog,
}

impl Pipeline {
    pub fn new(rules: SharedRuleStore, enforcer: Enforcer, audit: AuditLog) -> Self {
        Self {
            rules,
            enforcer,
            audit,
        }
    }

    pub fn rules(&self) -> &SharedRuleStore {
        &self.rules
    }

    pub fn enforcer(&self) -> &Enforcer {
        &self.enforcer
    }

    pub fn audit(&self) -> &AuditLog {
        &self.audit
    }

    /// Match one target and act on every matching rule
    pub fn evaluate(&self, target: &Target) -> Vec<Decision> {
        let rules = self.rule_snapshot();
        self.evaluate_with(target, &rules).0
    }

    /// Run once over everything the provider reports
    pub fn run(&self, provider: &mut dyn SnapshotProvider) -> Result<RunSummary> {
        let rules = self.rule_snapshot();
        let processes = provider.processes()?;
        let connections = provider.connections()?;

        info!(
            rules = rules.len(),
            processes = processes.len(),
            connections = connections.len(),
            mode = self.enforcer.mode().as_str(),
            "evaluating snapshot"
        );

        let connection_rules = rules.iter().filter(|r| !r.kind.targets_processes()).count();
        let connections_unavailable = connection_rules > 0 && !provider.lists_connections();
        if connections_unavailable {
            warn!(
                rules = connection_rules,
                "snapshot source cannot list connections, port and ip rules will not match"
            );
        }

        let mut summary = RunSummary {
            processes: processes.len(),
            connections: connections.len(),
            connections_unavailable,
            ..RunSummary::default()
        };

        for process in processes {
            let (decisions, failures) = self.evaluate_with(&Target::Process(process), &rules);
            summary.record(decisions, failures);
        }
        for conn in connections {
            let (decisions, failures) = self.evaluate_with(&Target::Connection(conn), &rules);
            summary.record(decisions, failures);
        }

        info!(
            matches = summary.matches,
            audit_failures = summary.audit_failures,
            "snapshot evaluated"
        );
        Ok(summary)
    }

    /// Copy of the current rules so no lock is held during enforcement
    fn rule_snapshot(&self) -> Vec<Rule> {
        self.rules.read().list().to_vec()
    }

    fn evaluate_with(&self, target: &Target, rules: &[Rule]) -> (Vec<Decision>, usize) {
        let matched = matcher::match_target(target, rules);
        if matched.is_empty() {
            return (Vec::new(), 0);
        }
        debug!(pid = ?target.pid(), matches = matched.len(), "target matched");

        let mut failures = 0;
        let decisions: Vec<Decision> = matched
            .into_iter()
            .map(|rule| {
                let decision = self.enforcer.apply(target, rule);
                if let Err(e) = self.audit.append(&decision) {
                    failures += 1;
                    warn!(rule_id = %rule.id, error = %e, "failed to write audit log");
                }
                decision
            })
            .collect();
        (decisions, failures)
    }
}
