//! Error types for policy loading, validator construction and execution.
//!
//! Denials are not errors: they come back as a [`ValidationOutcome`]. The
//! types here cover the cases where the engine itself cannot do its job.
//!
//! [`ValidationOutcome`]: super::ValidationOutcome

use std::path::PathBuf;

use thiserror::Error;

use super::ValidationOutcome;

/// Raised while loading or validating a policy file. A load that hits any of
/// these never falls back to a default policy.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid security level '{0}' (expected strict, moderate, permissive or enterprise)")]
    InvalidLevel(String),

    #[error("{scope}: invalid rule type '{value}'")]
    InvalidRuleType { scope: String, value: String },

    #[error("{scope}: override pattern is empty")]
    EmptyPattern { scope: String },

    #[error("{scope}: override pattern '{pattern}' does not compile: {source}")]
    InvalidRegex {
        scope: String,
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("{scope}: override reason is empty")]
    EmptyReason { scope: String },

    #[error("app_overrides contains an empty application name")]
    EmptyAppName,

    #[error("failed to access {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("policy file {} contains no settings", .path.display())]
    EmptyFile { path: PathBuf },

    #[error("invalid YAML in {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("failed to serialize security config: {0}")]
    Serialize(#[source] serde_yaml::Error),
}

/// Raised by the validator outside of a single validation call.
#[derive(Debug, Error)]
pub enum SecurityError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("built-in pattern '{pattern}' does not compile: {source}")]
    Pattern {
        pattern: &'static str,
        #[source]
        source: regex::Error,
    },

    #[error("security level is locked by enterprise mode")]
    LevelLocked,
}

/// Raised by [`SecureExecutor`](super::SecureExecutor).
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("command '{command}' denied: {}", .outcome.describe())]
    Denied {
        command: String,
        outcome: ValidationOutcome,
    },

    #[error("failed to run command: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("command timed out after {0} seconds")]
    TimedOut(u64),

    #[error("command cancelled")]
    Cancelled,
}
