//! userwall - a user-level firewall simulator
//!
//! Matches process and connection snapshots against declarative rules and
//! records what it would do about them. Nothing on the system changes unless
//! the enforcer runs in `SafetyMode::Live`.
//!
//! # Features
//!
//! - **Rule store**: JSON rule file with all-or-nothing validation and atomic saves
//! - **Matcher**: case-insensitive, non-exclusive matching on name, user, port or ip
//! - **Enforcer**: dry-run by default; live termination through a `ProcessControl`
//! - **Audit logging**: JSONL log of all decisions with size-based rotation
//! - **Snapshots**: demo, JSON file, or live processes (sysinfo) and sockets (`/proc/net`)
//!
//! # Example
//!
//! ```
//! use userwall::{Action, Enforcer, Outcome, ProcessRef, Rule, RuleKind, Target};
//! use userwall::engine::matcher;
//!
//! let rules = vec![Rule::new("r1", RuleKind::ProcessName, "spotify", Action::Block)];
//! let target = Target::Process(ProcessRef::new(42, "Spotify.exe"));
//!
//! let enforcer = Enforcer::simulated();
//! for rule in matcher::match_target(&target, &rules) {
//!     let decision = enforcer.apply(&target, rule);
//!     assert_eq!(decision.outcome(), Outcome::Simulated);
//! }
//! ```

pub mod audit;
pub mod config;
pub mod decision;
pub mod engine;
pub mod error;
pub mod logging;
pub mod monitor;
pub mod rules;
pub mod snapshot;
pub mod target;

// Re-exports for convenience
pub use audit::{AuditFilter, AuditLog, AuditSettings};
pub use config::{Config, SafetyMode};
pub use decision::{Decision, Outcome};
pub use engine::{Enforcer, Pipeline, RunSummary};
pub use error::{FirewallError, Result};
pub use rules::{Action, Rule, RuleKind, RuleStore, SharedRuleStore};
pub use target::{ConnectionRef, Endpoint, ProcessRef, Target, TargetKind};
