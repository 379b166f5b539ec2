//! Decision dispatch
//!
//! Turns a (target, rule) pair into exactly one `Decision` under the
//! enforcer's safety mode. Real side effects happen only in `Live` mode and
//! only through the configured `ProcessControl`. Failures are recorded as
//! outcomes; `apply` itself cannot fail.

use tracing::{debug, info, warn};

use super::control::{ControlError, NoopControl, ProcessControl};
use crate::config::SafetyMode;
use crate::decision::{Decision, Outcome};
use crate::rules::{Action, Rule};
use crate::target::{ConnectionRef, ProcessRef, Target};

/// Applies matched rules to targets
pub struct Enforcer {
    mode: SafetyMode,
    control: Box<dyn ProcessControl>,
}

impl Enforcer {
    pub fn new(mode: SafetyMode, control: Box<dyn ProcessControl>) -> Self {
        Self { mode, control }
    }

    /// A dry-run enforcer with no OS access
    pub fn simulated() -> Self {
        Self::new(SafetyMode::DryRun, Box::new(NoopControl))
    }

    pub fn mode(&self) -> SafetyMode {
        self.mode
    }

    /// Decide (and in live mode, act) on one matched rule
    pub fn apply(&self, target: &Target, rule: &Rule) -> Decision {
        let descriptor = describe(target, self.control.as_ref());

        let outcome = if self.mode.is_dry_run() {
            simulate(rule)
        } else {
            self.attempt(target, rule)
        };

        if outcome.is_failure() {
            warn!(
                descriptor = %descriptor,
                rule_id = %rule.id,
                action = %rule.action,
                outcome = %outcome,
                dry_run = self.mode.is_dry_run(),
                "action not carried out"
            );
        } else {
            info!(
                descriptor = %descriptor,
                rule_id = %rule.id,
                action = %rule.action,
                outcome = %outcome,
                dry_run = self.mode.is_dry_run(),
                "action applied"
            );
        }

        Decision::new(target, rule, self.mode.is_dry_run(), outcome, descriptor)
    }

    fn attempt(&self, target: &Target, rule: &Rule) -> Outcome {
        match &rule.action {
            Action::Allow => Outcome::Simulated,
            Action::Other(_) => Outcome::UnknownAction,
            Action::Block => match self.control.block(target) {
                Ok(()) => Outcome::Applied,
                Err(e) => outcome_for(&e),
            },
            Action::Terminate => match target.pid() {
                Some(pid) => {
                    if let Err(outcome) = self.verify_identity(target, pid) {
                        return outcome;
                    }
                    match self.control.terminate(pid) {
                        Ok(()) => Outcome::Applied,
                        Err(e) => outcome_for(&e),
                    }
                }
                // a socket without an owner has no process to end
                None => Outcome::TargetGone,
            },
        }
    }

    /// Check that `pid` still belongs to the process the snapshot saw.
    /// A process target must still carry its snapshot name; a connection
    /// owner must still exist. Anything unverifiable is not signalled.
    fn verify_identity(&self, target: &Target, pid: u32) -> Result<(), Outcome> {
        let current = match self.control.process_name(pid) {
            Ok(Some(name)) => name,
            Ok(None) => return Err(Outcome::Unsupported),
            Err(e) => return Err(outcome_for(&e)),
        };

        if let Target::Process(p) = target {
            if current != p.name {
                warn!(
                    pid,
                    expected = %p.name,
                    found = %current,
                    "pid now belongs to another process"
                );
                return Err(Outcome::TargetGone);
            }
        }
        Ok(())
    }
}

fn simulate(rule: &Rule) -> Outcome {
    match rule.action {
        Action::Other(_) => Outcome::UnknownAction,
        Action::Allow | Action::Block | Action::Terminate => Outcome::Simulated,
    }
}

fn outcome_for(err: &ControlError) -> Outcome {
    match err {
        ControlError::TargetGone { .. } => Outcome::TargetGone,
        ControlError::Unsupported => Outcome::Unsupported,
        ControlError::PermissionDenied { .. } | ControlError::Refused { .. } => Outcome::Denied,
        ControlError::Io(e) => {
            debug!(error = %e, "control failed with an unexpected OS error");
            Outcome::Denied
        }
    }
}

/// Human-readable descriptor for a target. Lookup failures degrade the
/// text instead of failing.
pub fn describe(target: &Target, control: &dyn ProcessControl) -> String {
    match target {
        Target::Process(p) => describe_process(p),
        Target::Connection(c) => describe_connection(c, control),
    }
}

fn describe_process(process: &ProcessRef) -> String {
    let name = if process.name.trim().is_empty() {
        "unknown"
    } else {
        process.name.as_str()
    };
    format!("{} (pid {})", name, process.pid)
}

fn describe_connection(conn: &ConnectionRef, control: &dyn ProcessControl) -> String {
    let owner = match conn.pid {
        None => "System (pid -)".to_string(),
        Some(pid) => {
            let name = match control.process_name(pid) {
                Ok(Some(name)) => name,
                Ok(None) => "unknown".to_string(),
                Err(e) => {
                    debug!(pid, error = %e, "could not resolve connection owner");
                    "unknown".to_string()
                }
            };
            format!("{} (pid {})", name, pid)
        }
    };
    format!("{} [{}]", conn.socket_pair(), owner)
}
