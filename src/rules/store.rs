//! Persistent rule storage
//!
//! Rules are kept in a JSON array on disk. Loading is all-or-nothing: one
//! bad entry rejects the whole file so a partial rule set is never active.
//! Every mutation is written back with a write-temp-then-rename.

use std::collections::HashSet;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info};

use super::Rule;
use crate::error::{FirewallError, Result};

/// A rule store shared between the pipeline and a presentation layer.
/// The write lock serializes mutations with their `save`.
pub type SharedRuleStore = Arc<RwLock<RuleStore>>;

/// Rule set bound to a file
#[derive(Debug)]
pub struct RuleStore {
    path: PathBuf,
    rules: Vec<Rule>,
}

impl RuleStore {
    /// Open the store at `path`, loading whatever is there
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let rules = load(&path)?;
        info!(path = %path.display(), count = rules.len(), "loaded rules");
        Ok(Self { path, rules })
    }

    /// Build a store from rules already in memory; nothing is written until
    /// the first mutation
    pub fn from_rules(path: impl Into<PathBuf>, rules: Vec<Rule>) -> Result<Self> {
        validate_set(&rules)?;
        Ok(Self {
            path: path.into(),
            rules,
        })
    }

    /// Wrap the store for sharing
    pub fn into_shared(self) -> SharedRuleStore {
        Arc::new(RwLock::new(self))
    }

    /// Re-read the file, replacing the in-memory set only on success
    pub fn reload(&mut self) -> Result<()> {
        self.rules = load(&self.path)?;
        Ok(())
    }

    /// Persist the full rule set
    pub fn save(&self) -> Result<()> {
        save(&self.path, &self.rules)
    }

    /// Add a rule and persist
    pub fn add(&mut self, rule: Rule) -> Result<()> {
        rule.validate()?;
        if self.get(&rule.id).is_some() {
            return Err(FirewallError::config(format!(
                "rule id '{}' already exists",
                rule.id
            )));
        }

        let id = rule.id.clone();
        self.rules.push(rule);
        if let Err(e) = self.save() {
            self.rules.pop();
            return Err(e);
        }
        info!(rule_id = %id, "rule added");
        Ok(())
    }

    /// Remove a rule by id and persist
    pub fn delete(&mut self, id: &str) -> Result<Rule> {
        let index = self
            .position(id)
            .ok_or_else(|| FirewallError::not_found(format!("rule '{}'", id)))?;

        let removed = self.rules.remove(index);
        if let Err(e) = self.save() {
            self.rules.insert(index, removed);
            return Err(e);
        }
        info!(rule_id = %id, "rule deleted");
        Ok(removed)
    }

    /// Replace the rule with the same id, keeping its position
    pub fn update(&mut self, rule: Rule) -> Result<Rule> {
        rule.validate()?;
        let index = self
            .position(&rule.id)
            .ok_or_else(|| FirewallError::not_found(format!("rule '{}'", rule.id)))?;

        let previous = std::mem::replace(&mut self.rules[index], rule);
        if let Err(e) = self.save() {
            self.rules[index] = previous;
            return Err(e);
        }
        info!(rule_id = %self.rules[index].id, "rule updated");
        Ok(previous)
    }

    /// Rules in matching order
    pub fn list(&self) -> &[Rule] {
        &self.rules
    }

    pub fn get(&self, id: &str) -> Option<&Rule> {
        self.rules.iter().find(|r| r.id == id)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.rules.iter().position(|r| r.id == id)
    }
}

/// Load rules from `path`. A missing or empty file is an empty set.
pub fn load(path: &Path) -> Result<Vec<Rule>> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "rule file missing, starting empty");
            return Ok(Vec::new());
        }
        Err(e) => return Err(e.into()),
    };

    if content.trim().is_empty() {
        return Ok(Vec::new());
    }

    parse(&content)
}

/// Parse and validate a rule file's contents
pub fn parse(content: &str) -> Result<Vec<Rule>> {
    let value: serde_json::Value = serde_json::from_str(content)
        .map_err(|e| FirewallError::config(format!("rule file is not valid JSON: {}", e)))?;

    let entries = match value {
        serde_json::Value::Array(entries) => entries,
        _ => return Err(FirewallError::config("rule file must contain a JSON array")),
    };

    let mut rules = Vec::with_capacity(entries.len());
    for (index, entry) in entries.into_iter().enumerate() {
        let rule: Rule = serde_json::from_value(entry)
            .map_err(|e| FirewallError::config(format!("rule #{}: {}", index + 1, e)))?;
        rules.push(rule);
    }

    validate_set(&rules)?;
    Ok(rules)
}

/// Validate every rule and the uniqueness of ids
fn validate_set(rules: &[Rule]) -> Result<()> {
    let mut seen = HashSet::new();
    for (index, rule) in rules.iter().enumerate() {
        rule.validate().map_err(|e| match e {
            FirewallError::Config { message } => {
                FirewallError::config(format!("rule #{}: {}", index + 1, message))
            }
            other => other,
        })?;
        if !seen.insert(rule.id.as_str()) {
            return Err(FirewallError::config(format!(
                "rule #{}: duplicate id '{}'",
                index + 1,
                rule.id
            )));
        }
    }
    Ok(())
}

/// Write `rules` to `path` atomically
pub fn save(path: &Path, rules: &[Rule]) -> Result<()> {
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent)?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "rules.json".to_string());
    let tmp_path = parent.join(format!(".{}.tmp", file_name));

    let json = serde_json::to_string_pretty(rules)?;
    {
        let mut file = fs::File::create(&tmp_path)?;
        file.write_all(json.as_bytes())?;
        file.write_all(b"\n")?;
        file.sync_all()?;
    }

    if let Err(e) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(e.into());
    }
    Ok(())
}
