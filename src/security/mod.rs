//! Command security validation.
//!
//! Every shell command derived from user or third-party configuration passes
//! through a [`Validator`] before it reaches the execution primitive. The
//! decision combines, in order:
//! 1. administrator overrides ([`OverrideResolver`]),
//! 2. the critical-pattern gate (never disabled by level or whitelist),
//! 3. the policy of the configured [`SecurityLevel`].
//!
//! Overrides run before the critical gate. A broad override pattern can
//! therefore allow a critical command; policy loading warns when an
//! override matches one of the canonical critical samples.
//!
//! This is lexical inspection only. Nothing here confines the process once
//! it runs.

pub mod config;
mod error;
mod executables;
pub mod executor;
mod overrides;
mod patterns;
pub mod policy;
mod validator;


use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub use config::{ConfigStore, SecurityConfig};
pub use error::{ConfigError, ExecutionError, SecurityError};
pub use executables::{ExecutableIndex, MAX_EXECUTABLES};
pub use executor::{ExecutionDecision, ExecutionReport, SecureExecutor};
pub use overrides::{OverrideResolver, RuleKind, SecurityOverride};
pub use patterns::{PatternLibrary, PatternSet};
pub use validator::Validator;

/// Named policy mode governing commands no override or critical pattern decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SecurityLevel {
    /// Unknown means unsafe: only whitelisted, safe-pattern or indexed executables pass.
    Strict,
    /// Denies blacklisted commands and dangerous patterns, allows the rest.
    #[default]
    Moderate,
    /// Allows everything that passed the critical gate.
    Permissive,
    /// Allows everything, auditing dangerous patterns.
    Enterprise,
}

impl SecurityLevel {
    pub const ALL: [SecurityLevel; 4] = [
        SecurityLevel::Strict,
        SecurityLevel::Moderate,
        SecurityLevel::Permissive,
        SecurityLevel::Enterprise,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SecurityLevel::Strict => "strict",
            SecurityLevel::Moderate => "moderate",
            SecurityLevel::Permissive => "permissive",
            SecurityLevel::Enterprise => "enterprise",
        }
    }
}

impl fmt::Display for SecurityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SecurityLevel {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        SecurityLevel::ALL
            .into_iter()
            .find(|level| level.as_str() == wanted)
            .ok_or_else(|| ConfigError::InvalidLevel(s.to_string()))
    }
}

/// Why a command was denied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DenialReason {
    EmptyCommand,
    CriticalPatternMatch { pattern: &'static str },
    BlacklistMatch,
    DangerousPatternMatch { pattern: &'static str },
    NotInSafeSetOrWhitelist,
}

impl fmt::Display for DenialReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DenialReason::EmptyCommand => write!(f, "command is empty"),
            DenialReason::CriticalPatternMatch { pattern } => {
                write!(f, "command matches critical pattern '{}'", pattern)
            }
            DenialReason::BlacklistMatch => write!(f, "command is blacklisted"),
            DenialReason::DangerousPatternMatch { pattern } => {
                write!(f, "command matches dangerous pattern '{}'", pattern)
            }
            DenialReason::NotInSafeSetOrWhitelist => {
                write!(
                    f,
                    "command is not whitelisted, not a known safe command and not an indexed executable"
                )
            }
        }
    }
}

/// Result of validating one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationOutcome {
    pub allowed: bool,
    /// Set whenever `allowed` is false.
    pub reason: Option<DenialReason>,
    /// The override that decided the outcome, if any.
    pub triggered_override: Option<SecurityOverride>,
}

impl ValidationOutcome {
    pub fn allow() -> Self {
        Self {
            allowed: true,
            reason: None,
            triggered_override: None,
        }
    }

    pub fn deny(reason: DenialReason) -> Self {
        Self {
            allowed: false,
            reason: Some(reason),
            triggered_override: None,
        }
    }

    pub fn overridden(rule: SecurityOverride) -> Self {
        Self {
            allowed: true,
            reason: None,
            triggered_override: Some(rule),
        }
    }

    pub fn is_allowed(&self) -> bool {
        self.allowed
    }

    /// One-line human readable summary.
    pub fn describe(&self) -> String {
        match (&self.reason, &self.triggered_override) {
            (Some(reason), _) => reason.to_string(),
            (None, Some(rule)) => {
                format!("allowed by {} override: {}", rule.rule_type, rule.reason)
            }
            (None, None) => "allowed".to_string(),
        }
    }
}
