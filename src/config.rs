//! Configuration loading for userwall
//!
//! Supports TOML configuration with embedded defaults.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::audit::AuditSettings;
use crate::error::Result;

/// Whether enforcement may touch the system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SafetyMode {
    /// Record what would happen, change nothing
    #[default]
    DryRun,

    /// Carry out real actions where a control supports them
    Live,
}

impl SafetyMode {
    /// Map the `dry_run` config flag
    pub fn from_dry_run(dry_run: bool) -> Self {
        if dry_run {
            SafetyMode::DryRun
        } else {
            SafetyMode::Live
        }
    }

    pub fn is_dry_run(&self) -> bool {
        matches!(self, SafetyMode::DryRun)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SafetyMode::DryRun => "dry-run",
            SafetyMode::Live => "live",
        }
    }
}

/// General configuration section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Only simulate actions
    pub dry_run: bool,

    /// Path to the JSON rule file
    pub rules_path: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            dry_run: true,
            rules_path: "~/.config/userwall/rules.json".to_string(),
        }
    }
}

/// Audit log configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    /// Enable audit logging
    pub enabled: bool,

    /// Path to the JSONL audit log
    pub path: String,

    /// Rotate once the live log grows past this many bytes
    pub max_bytes: u64,

    /// Number of rotated files to keep
    pub max_archives: usize,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: "~/.config/userwall/firewall_log.jsonl".to_string(),
            max_bytes: 1024 * 1024,
            max_archives: 3,
        }
    }
}

/// Background sampler configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Sampling interval in milliseconds
    pub interval_ms: u64,

    /// Number of samples kept in memory
    pub history: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval_ms: 1000,
            history: 60,
        }
    }
}

impl MonitorConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.max(1))
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,
    pub audit: AuditConfig,
    pub monitor: MonitorConfig,
}

impl Config {
    /// Load configuration from file or use defaults
    pub fn load() -> Self {
        let config_paths = [
            // User-specific config
            dirs::home_dir().map(|p| p.join(".config/userwall/config.toml")),
            // System-wide config
            Some(PathBuf::from("/etc/userwall/config.toml")),
        ];

        for path in config_paths.into_iter().flatten() {
            if path.exists() {
                match Self::load_from(&path) {
                    Ok(config) => return config,
                    Err(e) => {
                        tracing::warn!(path = %path.display(), error = %e, "failed to load config");
                    }
                }
            }
        }

        Config::default()
    }

    /// Load from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Expand ~ in path strings
    pub fn expand_path(path: &str) -> PathBuf {
        if let Some(rest) = path.strip_prefix("~/") {
            if let Some(home) = dirs::home_dir() {
                return home.join(rest);
            }
        }
        PathBuf::from(path)
    }

    pub fn safety_mode(&self) -> SafetyMode {
        SafetyMode::from_dry_run(self.general.dry_run)
    }

    /// Get the rule file path (expanded)
    pub fn rules_path(&self) -> PathBuf {
        Self::expand_path(&self.general.rules_path)
    }

    /// Audit log settings, or `None` when auditing is off
    pub fn audit_settings(&self) -> Option<AuditSettings> {
        if !self.audit.enabled {
            return None;
        }
        Some(AuditSettings {
            path: Self::expand_path(&self.audit.path),
            max_bytes: self.audit.max_bytes,
            max_archives: self.audit.max_archives,
        })
    }
}

/// Embedded default configuration
pub const DEFAULT_CONFIG_TOML: &str = r#"
[general]
dry_run = true
rules_path = "~/.config/userwall/rules.json"

[audit]
enabled = true
path = "~/.config/userwall/firewall_log.jsonl"
max_bytes = 1048576
max_archives = 3

[monitor]
interval_ms = 1000
history = 60
"#;
