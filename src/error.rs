//! Error types for userwall
//!
//! Rule-store and configuration failures surface as `FirewallError`.
//! Enforcement failures (permission denied, target gone) are
//! `engine::ControlError`s and never leave the enforcer; they are folded
//! into a decision's outcome instead.

use thiserror::Error;

/// Errors returned by the rule store, audit log and snapshot providers
#[derive(Debug, Error)]
pub enum FirewallError {
    /// Malformed or incomplete rule, or an invalid rule file
    #[error("invalid rule configuration: {message}")]
    Config { message: String },

    /// Unknown rule id or target pid
    #[error("not found: {what}")]
    NotFound { what: String },

    /// An action string outside allow/block/terminate
    #[error("unknown action '{action}'")]
    UnknownAction { action: String },

    /// Bad command line or an operation the current source cannot serve
    #[error("{message}")]
    Usage { message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Toml(#[from] toml::de::Error),
}

impl FirewallError {
    /// Build a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        FirewallError::Config {
            message: message.into(),
        }
    }

    /// Build a usage error
    pub fn usage(message: impl Into<String>) -> Self {
        FirewallError::Usage {
            message: message.into(),
        }
    }

    /// Build a not-found error
    pub fn not_found(what: impl Into<String>) -> Self {
        FirewallError::NotFound { what: what.into() }
    }
}

pub type Result<T> = std::result::Result<T, FirewallError>;
