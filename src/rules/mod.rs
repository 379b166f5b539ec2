//! Firewall rules
//!
//! A rule is a declarative match condition (`type` + `value`) plus an
//! action. Rules live in a JSON array whose order is the matching order.

pub mod store;

use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{FirewallError, Result};

pub use store::{RuleStore, SharedRuleStore};

/// Rule ids: a letter or digit followed by letters, digits, `_ . : -`
static RULE_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_.:-]*$").expect("valid rule id pattern"));

/// What part of a target a rule inspects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleKind {
    /// Case-insensitive substring of the process name
    ProcessName,
    /// Case-insensitive substring of the process owner
    Username,
    /// Exact local port of a connection
    Port,
    /// Case-insensitive substring of a connection's remote ip
    Ip,
}

impl RuleKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleKind::ProcessName => "process_name",
            RuleKind::Username => "username",
            RuleKind::Port => "port",
            RuleKind::Ip => "ip",
        }
    }

    /// Whether rules of this kind apply to processes (as opposed to connections)
    pub fn targets_processes(&self) -> bool {
        matches!(self, RuleKind::ProcessName | RuleKind::Username)
    }
}

impl fmt::Display for RuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RuleKind {
    type Err = FirewallError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "process_name" => Ok(RuleKind::ProcessName),
            "username" => Ok(RuleKind::Username),
            "port" => Ok(RuleKind::Port),
            "ip" => Ok(RuleKind::Ip),
            other => Err(FirewallError::config(format!(
                "unknown rule type '{}' (expected process_name, username, port or ip)",
                other
            ))),
        }
    }
}

/// What to do with a matched target
///
/// `Other` carries any action string outside the known set. The rule store
/// refuses to persist it, but the enforcer still accepts it and records an
/// `unknown_action` decision.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Action {
    Allow,
    Block,
    Terminate,
    Other(String),
}

impl Action {
    /// Lenient parse: unknown strings become `Action::Other`
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "allow" => Action::Allow,
            "block" => Action::Block,
            "terminate" => Action::Terminate,
            _ => Action::Other(s.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Action::Allow => "allow",
            Action::Block => "block",
            Action::Terminate => "terminate",
            Action::Other(raw) => raw,
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, Action::Other(_))
    }
}

impl From<String> for Action {
    fn from(s: String) -> Self {
        Action::parse(&s)
    }
}

impl From<Action> for String {
    fn from(action: Action) -> Self {
        match action {
            Action::Other(raw) => raw,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Strict parse, used where an unknown action is a user error
impl FromStr for Action {
    type Err = FirewallError;

    fn from_str(s: &str) -> Result<Self> {
        match Action::parse(s) {
            Action::Other(action) => Err(FirewallError::UnknownAction { action }),
            known => Ok(known),
        }
    }
}

/// A firewall rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    /// Unique identifier for this rule
    pub id: String,

    /// What the rule inspects
    #[serde(rename = "type")]
    pub kind: RuleKind,

    /// Pattern compared against the target field selected by `kind`
    pub value: String,

    /// Action to take when the rule matches
    pub action: Action,
}

impl Rule {
    /// Create a new rule
    pub fn new(
        id: impl Into<String>,
        kind: RuleKind,
        value: impl Into<String>,
        action: Action,
    ) -> Self {
        Self {
            id: id.into(),
            kind,
            value: value.into(),
            action,
        }
    }

    /// Check the rule on its own, without regard to other rules
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(FirewallError::config("rule id must not be empty"));
        }
        if !RULE_ID.is_match(&self.id) {
            return Err(FirewallError::config(format!(
                "rule id '{}' may only contain letters, digits, '_', '.', ':' and '-'",
                self.id
            )));
        }
        if self.value.trim().is_empty() {
            return Err(FirewallError::config(format!(
                "rule '{}' has an empty value",
                self.id
            )));
        }
        if let Action::Other(action) = &self.action {
            return Err(FirewallError::config(format!(
                "rule '{}' has unknown action '{}' (expected allow, block or terminate)",
                self.id, action
            )));
        }
        if self.kind == RuleKind::Port && !is_canonical_port(&self.value) {
            return Err(FirewallError::config(format!(
                "rule '{}' has port value '{}', expected a number 0-65535 without sign or leading zeros",
                self.id, self.value
            )));
        }
        Ok(())
    }
}

/// Ports are matched as decimal strings, so only the form the matcher
/// produces can ever match
fn is_canonical_port(value: &str) -> bool {
    let value = value.trim();
    value
        .parse::<u16>()
        .is_ok_and(|port| port.to_string() == value)
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ID: {} | Type: {} | Value: {} | Action: {}",
            self.id, self.kind, self.value, self.action
        )
    }
}
