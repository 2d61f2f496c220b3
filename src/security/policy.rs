//! Per-level decision functions.
//!
//! Each level is a plain function over the same inputs; [`evaluate`] is the
//! only place that picks one. These run after the override resolver and the
//! critical gate, so none of them needs to look at critical patterns.

use std::collections::HashSet;

use tracing::warn;

use super::{DenialReason, ExecutableIndex, PatternLibrary, SecurityLevel, ValidationOutcome};

/// Read-only view of the validator state a policy may consult.
#[derive(Debug, Clone, Copy)]
pub struct PolicyInputs<'a> {
    pub patterns: &'a PatternLibrary,
    pub executables: &'a ExecutableIndex,
    pub whitelist: &'a HashSet<String>,
    pub blacklist: &'a HashSet<String>,
}

pub fn evaluate(
    level: SecurityLevel,
    command: &str,
    inputs: PolicyInputs<'_>,
) -> ValidationOutcome {
    match level {
        SecurityLevel::Strict => strict(command, inputs),
        SecurityLevel::Moderate => moderate(command, inputs),
        SecurityLevel::Permissive => permissive(command, inputs),
        SecurityLevel::Enterprise => enterprise(command, inputs),
    }
}

pub fn strict(command: &str, inputs: PolicyInputs<'_>) -> ValidationOutcome {
    if inputs.whitelist.contains(command)
        || inputs.patterns.safe().is_match(command)
        || leading_token(command).is_some_and(|token| inputs.executables.contains(token))
    {
        return ValidationOutcome::allow();
    }
    ValidationOutcome::deny(DenialReason::NotInSafeSetOrWhitelist)
}

pub fn moderate(command: &str, inputs: PolicyInputs<'_>) -> ValidationOutcome {
    if inputs.blacklist.contains(command) {
        return ValidationOutcome::deny(DenialReason::BlacklistMatch);
    }
    match inputs.patterns.dangerous().first_match(command) {
        Some(pattern) => ValidationOutcome::deny(DenialReason::DangerousPatternMatch { pattern }),
        None => ValidationOutcome::allow(),
    }
}

pub fn permissive(_command: &str, _inputs: PolicyInputs<'_>) -> ValidationOutcome {
    ValidationOutcome::allow()
}

pub fn enterprise(command: &str, inputs: PolicyInputs<'_>) -> ValidationOutcome {
    if let Some(pattern) = inputs.patterns.dangerous().first_match(command) {
        warn!(
            target: "audit",
            "Enterprise mode allowing command matching dangerous pattern '{}': {}",
            pattern, command
        );
    }
    ValidationOutcome::allow()
}

/// First whitespace-separated word of a command.
pub fn leading_token(command: &str) -> Option<&str> {
    command.split_whitespace().next()
}
