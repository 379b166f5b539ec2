//! Rule matching
//!
//! Matching is non-exclusive: every rule that matches is returned, in rule
//! order. Fields missing from a target simply do not match.

use crate::rules::{Rule, RuleKind};
use crate::target::{ConnectionRef, ProcessRef, Target};

/// Rules matching a process
pub fn match_process<'a>(process: &ProcessRef, rules: &'a [Rule]) -> Vec<&'a Rule> {
    let name = process.name.to_lowercase();
    let username = process.username.as_deref().map(str::to_lowercase);

    rules
        .iter()
        .filter(|rule| match rule.kind {
            RuleKind::ProcessName => contains_ignore_case(&name, &rule.value),
            RuleKind::Username => username
                .as_deref()
                .is_some_and(|user| contains_ignore_case(user, &rule.value)),
            RuleKind::Port | RuleKind::Ip => false,
        })
        .collect()
}

/// Rules matching a connection
pub fn match_connection<'a>(conn: &ConnectionRef, rules: &'a [Rule]) -> Vec<&'a Rule> {
    let local_port = conn.local_port().map(|p| p.to_string());
    let remote_ip = conn.remote_ip().map(str::to_lowercase);

    rules
        .iter()
        .filter(|rule| match rule.kind {
            RuleKind::Port => local_port
                .as_deref()
                .is_some_and(|port| port == rule.value.trim()),
            RuleKind::Ip => remote_ip
                .as_deref()
                .is_some_and(|ip| contains_ignore_case(ip, &rule.value)),
            RuleKind::ProcessName | RuleKind::Username => false,
        })
        .collect()
}

/// Rules matching any target
pub fn match_target<'a>(target: &Target, rules: &'a [Rule]) -> Vec<&'a Rule> {
    match target {
        Target::Process(p) => match_process(p, rules),
        Target::Connection(c) => match_connection(c, rules),
    }
}

/// `haystack` must already be lowercase
fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.contains(&needle.to_lowercase())
}
