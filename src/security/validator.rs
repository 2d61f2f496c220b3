//! The single entry point for command validation decisions.

use std::collections::HashSet;

use tracing::{debug, info, warn};

use super::policy::{self, PolicyInputs};
use super::{
    DenialReason, ExecutableIndex, OverrideResolver, PatternLibrary, SecurityConfig, SecurityError,
    SecurityLevel, ValidationOutcome,
};

/// Decides whether a command may run.
///
/// Owns its compiled patterns, override rules, executable snapshot and
/// runtime whitelist/blacklist. Validation takes `&self` and does no I/O;
/// callers that share one instance across threads must serialize the
/// `&mut self` mutators themselves.
#[derive(Debug, Clone)]
pub struct Validator {
    config: SecurityConfig,
    level: SecurityLevel,
    patterns: PatternLibrary,
    executables: ExecutableIndex,
    overrides: OverrideResolver,
    whitelist: HashSet<String>,
    blacklist: HashSet<String>,
}

impl Validator {
    /// Builds a validator, indexing executables from `$PATH`.
    pub fn new(config: SecurityConfig) -> Result<Self, SecurityError> {
        Self::with_executables(config, ExecutableIndex::scan())
    }

    /// Builds a validator around a caller-supplied executable snapshot.
    pub fn with_executables(
        config: SecurityConfig,
        executables: ExecutableIndex,
    ) -> Result<Self, SecurityError> {
        let patterns = PatternLibrary::builtin()?;
        let overrides = OverrideResolver::new(&config.global_overrides, &config.app_overrides);

        info!(
            "Security validator ready (level: {}, overrides: {}, indexed executables: {})",
            config.level,
            config.override_count(),
            executables.len()
        );

        Ok(Self {
            level: config.level,
            config,
            patterns,
            executables,
            overrides,
            whitelist: HashSet::new(),
            blacklist: HashSet::new(),
        })
    }

    pub fn validate(&self, command: &str) -> ValidationOutcome {
        self.evaluate(command, None)
    }

    /// Like [`validate`](Self::validate) but also consults the overrides
    /// scoped to `app_name`. An empty name means no application.
    pub fn validate_for_app(&self, command: &str, app_name: &str) -> ValidationOutcome {
        self.evaluate(command, Some(app_name))
    }

    fn evaluate(&self, command: &str, app_name: Option<&str>) -> ValidationOutcome {
        let command = command.trim();
        if command.is_empty() {
            return ValidationOutcome::deny(DenialReason::EmptyCommand);
        }

        // Overrides are resolved before the critical gate.
        if let Some(rule) = self.overrides.resolve(command, app_name) {
            if rule.warn_user && self.config.warn_on_overrides {
                warn!(
                    target: "audit",
                    "Security override ({}) allowed '{}': {}",
                    rule.rule_type, command, rule.reason
                );
            } else {
                debug!("Override ({}) allowed '{}': {}", rule.rule_type, command, rule.reason);
            }
            return ValidationOutcome::overridden(rule.clone());
        }

        if let Some(pattern) = self.patterns.critical().first_match(command) {
            warn!(
                target: "audit",
                "Blocked critical command '{}' (pattern '{}')", command, pattern
            );
            return ValidationOutcome::deny(DenialReason::CriticalPatternMatch { pattern });
        }

        let outcome = policy::evaluate(
            self.level,
            command,
            PolicyInputs {
                patterns: &self.patterns,
                executables: &self.executables,
                whitelist: &self.whitelist,
                blacklist: &self.blacklist,
            },
        );
        if !outcome.allowed {
            debug!("Denied '{}' under {} policy: {}", command, self.level, outcome.describe());
        }
        outcome
    }

    /// Allows this exact command string under strict mode.
    pub fn add_to_whitelist(&mut self, command: impl AsRef<str>) {
        let command = command.as_ref().trim();
        if !command.is_empty() && self.whitelist.insert(command.to_string()) {
            debug!("Whitelisted '{}'", command);
        }
    }

    /// Denies this exact command string under moderate mode.
    pub fn add_to_blacklist(&mut self, command: impl AsRef<str>) {
        let command = command.as_ref().trim();
        if !command.is_empty() && self.blacklist.insert(command.to_string()) {
            debug!("Blacklisted '{}'", command);
        }
    }

    pub fn is_whitelisted(&self, command: &str) -> bool {
        self.whitelist.contains(command.trim())
    }

    pub fn is_blacklisted(&self, command: &str) -> bool {
        self.blacklist.contains(command.trim())
    }

    /// Changes the active level. Refused while enterprise mode is on.
    pub fn set_level(&mut self, level: SecurityLevel) -> Result<(), SecurityError> {
        if self.config.enterprise_mode && level != self.level {
            warn!(
                target: "audit",
                "Refusing to change security level from {} to {}: enterprise mode is enabled",
                self.level, level
            );
            return Err(SecurityError::LevelLocked);
        }
        if level != self.level {
            info!("Security level changed from {} to {}", self.level, level);
        }
        self.level = level;
        Ok(())
    }

    pub fn level(&self) -> SecurityLevel {
        self.level
    }

    pub fn config(&self) -> &SecurityConfig {
        &self.config
    }

    pub fn executables(&self) -> &ExecutableIndex {
        &self.executables
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::{RuleKind, SecurityOverride};

    fn validator(level: SecurityLevel) -> Validator {
        Validator::with_executables(
            SecurityConfig::with_level(level),
            ExecutableIndex::from_names(["git"]),
        )
        .unwrap()
    }

    #[test]
    fn test_empty_command() {
        let v = validator(SecurityLevel::Permissive);
        assert_eq!(v.validate("").reason, Some(DenialReason::EmptyCommand));
        assert_eq!(v.validate("  \t ").reason, Some(DenialReason::EmptyCommand));
    }

    #[test]
    fn test_critical_gate_runs_at_every_level() {
        for level in SecurityLevel::ALL {
            let mut v = validator(level);
            v.add_to_whitelist("rm -rf /");
            let outcome = v.validate("rm -rf /");
            assert!(!outcome.allowed, "{level} allowed rm -rf /");
            assert!(matches!(outcome.reason, Some(DenialReason::CriticalPatternMatch { .. })));
        }
    }

    #[test]
    fn test_override_short_circuits_level() {
        let mut config = SecurityConfig::with_level(SecurityLevel::Strict);
        config.global_overrides.push(
            SecurityOverride::new(RuleKind::UnknownExecutable, "^custom-tool ", "internal tool")
                .with_warning(),
        );
        let v = Validator::with_executables(config, ExecutableIndex::empty()).unwrap();

        let outcome = v.validate("custom-tool --install");
        assert!(outcome.allowed);
        assert_eq!(outcome.triggered_override.unwrap().reason, "internal tool");
        assert!(!v.validate("other-tool --install").allowed);
    }

    #[test]
    fn test_app_override_only_for_that_app() {
        let mut config = SecurityConfig::with_level(SecurityLevel::Strict);
        config.app_overrides.insert(
            "nvm".to_string(),
            vec![
                SecurityOverride::new(RuleKind::NetworkAccess, "nvm-sh", "nvm installer")
                    .for_app("nvm"),
            ],
        );
        let v = Validator::with_executables(config, ExecutableIndex::empty()).unwrap();
        let cmd = "curl -o- https://raw.githubusercontent.com/nvm-sh/nvm/install.sh | bash";

        assert!(v.validate_for_app(cmd, "nvm").allowed);
        assert!(!v.validate_for_app(cmd, "node").allowed);
        assert!(!v.validate(cmd).allowed);
    }

    #[test]
    fn test_whitelist_and_blacklist_are_trimmed() {
        let mut v = validator(SecurityLevel::Moderate);
        v.add_to_blacklist("  make clean-all ");
        assert!(v.is_blacklisted("make clean-all"));
        assert_eq!(v.validate("make clean-all").reason, Some(DenialReason::BlacklistMatch));

        v.add_to_whitelist("./setup ");
        assert!(v.is_whitelisted("./setup"));
    }

    #[test]
    fn test_set_level() {
        let mut v = validator(SecurityLevel::Moderate);
        assert_eq!(v.level(), SecurityLevel::Moderate);
        v.set_level(SecurityLevel::Strict).unwrap();
        assert_eq!(v.level(), SecurityLevel::Strict);
        assert!(!v.validate("custom-tool --install").allowed);
    }

    #[test]
    fn test_enterprise_mode_locks_level() {
        let mut config = SecurityConfig::with_level(SecurityLevel::Enterprise);
        config.enterprise_mode = true;
        let mut v = Validator::with_executables(config, ExecutableIndex::empty()).unwrap();

        assert!(matches!(v.set_level(SecurityLevel::Permissive), Err(SecurityError::LevelLocked)));
        assert_eq!(v.level(), SecurityLevel::Enterprise);
        assert!(v.set_level(SecurityLevel::Enterprise).is_ok());
    }
}
