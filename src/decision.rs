//! Decision records
//!
//! A decision is what the enforcer did (or would have done) for one matched
//! rule against one target. It is created once and never changed; the audit
//! log owns it after it is appended.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::rules::{Rule, RuleKind};
use crate::target::{Target, TargetKind};

/// Result of handling one (target, rule) pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// Dry-run, or an action with nothing to apply
    Simulated,
    /// The side effect really happened
    Applied,
    /// The OS refused the action
    Denied,
    /// The target vanished before the action ran
    TargetGone,
    /// The rule's action is not one we know
    UnknownAction,
    /// No enforcement hook exists for this action
    Unsupported,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Simulated => "simulated",
            Outcome::Applied => "applied",
            Outcome::Denied => "denied",
            Outcome::TargetGone => "target_gone",
            Outcome::UnknownAction => "unknown_action",
            Outcome::Unsupported => "unsupported",
        }
    }

    /// Outcomes that mean the requested effect did not take place
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            Outcome::Denied | Outcome::TargetGone | Outcome::UnknownAction | Outcome::Unsupported
        )
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An immutable enforcement record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    timestamp: DateTime<Utc>,
    target_kind: TargetKind,
    pid: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    port: Option<u16>,
    rule_id: String,
    rule_type: RuleKind,
    rule_value: String,
    action: String,
    dry_run: bool,
    #[serde(alias = "result")]
    outcome: Outcome,
    /// Human-readable target descriptor
    #[serde(default)]
    target: String,
}

impl Decision {
    pub(crate) fn new(
        target: &Target,
        rule: &Rule,
        dry_run: bool,
        outcome: Outcome,
        descriptor: String,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            target_kind: target.kind(),
            pid: target.pid(),
            port: target.port(),
            rule_id: rule.id.clone(),
            rule_type: rule.kind,
            rule_value: rule.value.clone(),
            action: rule.action.to_string(),
            dry_run,
            outcome,
            target: descriptor,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn target_kind(&self) -> TargetKind {
        self.target_kind
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn port(&self) -> Option<u16> {
        self.port
    }

    pub fn rule_id(&self) -> &str {
        &self.rule_id
    }

    pub fn rule_type(&self) -> RuleKind {
        self.rule_type
    }

    pub fn rule_value(&self) -> &str {
        &self.rule_value
    }

    pub fn action(&self) -> &str {
        &self.action
    }

    pub fn dry_run(&self) -> bool {
        self.dry_run
    }

    pub fn outcome(&self) -> Outcome {
        self.outcome
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    /// Serialize as a single JSON line (no trailing newline)
    pub fn to_json_line(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pid = self
            .pid
            .map_or_else(|| "-".to_string(), |pid| pid.to_string());
        write!(
            f,
            "{} | PID {} | Rule {} | Action: {} | Result: {}{}",
            self.timestamp.format("%Y-%m-%d %H:%M:%S"),
            pid,
            self.rule_id,
            self.action,
            self.outcome,
            if self.dry_run { " (dry-run)" } else { "" }
        )
    }
}
