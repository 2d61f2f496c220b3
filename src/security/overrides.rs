//! Administrator override rules and their resolution.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Audit label of an override. Plays no part in matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RuleKind {
    DangerousCommand,
    UnknownExecutable,
    CommandInjection,
    PrivilegeEscalation,
    NetworkAccess,
    FilesystemAccess,
}

impl RuleKind {
    pub const ALL: [RuleKind; 6] = [
        RuleKind::DangerousCommand,
        RuleKind::UnknownExecutable,
        RuleKind::CommandInjection,
        RuleKind::PrivilegeEscalation,
        RuleKind::NetworkAccess,
        RuleKind::FilesystemAccess,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RuleKind::DangerousCommand => "dangerous-command",
            RuleKind::UnknownExecutable => "unknown-executable",
            RuleKind::CommandInjection => "command-injection",
            RuleKind::PrivilegeEscalation => "privilege-escalation",
            RuleKind::NetworkAccess => "network-access",
            RuleKind::FilesystemAccess => "filesystem-access",
        }
    }
}

impl fmt::Display for RuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RuleKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RuleKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| s.to_string())
    }
}

/// A reasoned exception that allows matching commands regardless of level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityOverride {
    pub rule_type: RuleKind,
    pub pattern: String,
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_name: Option<String>,
    #[serde(default)]
    pub warn_user: bool,
}

impl SecurityOverride {
    pub fn new(rule_type: RuleKind, pattern: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            rule_type,
            pattern: pattern.into(),
            reason: reason.into(),
            app_name: None,
            warn_user: false,
        }
    }

    pub fn for_app(mut self, app_name: impl Into<String>) -> Self {
        self.app_name = Some(app_name.into());
        self
    }

    pub fn with_warning(mut self) -> Self {
        self.warn_user = true;
        self
    }
}

#[derive(Debug, Clone)]
struct CompiledOverride {
    rule: SecurityOverride,
    // None when the pattern failed to compile; such rules never match.
    matcher: Option<Regex>,
}

impl CompiledOverride {
    fn compile(rule: &SecurityOverride) -> Self {
        let matcher = match Regex::new(&rule.pattern) {
            Ok(re) => Some(re),
            Err(e) => {
                warn!(
                    target: "audit",
                    "Override pattern '{}' ({}) does not compile and will be skipped: {}",
                    rule.pattern, rule.rule_type, e
                );
                None
            }
        };
        Self {
            rule: rule.clone(),
            matcher,
        }
    }

    fn matches(&self, command: &str) -> bool {
        match &self.matcher {
            Some(re) => re.is_match(command),
            None => {
                debug!("Skipping malformed override '{}'", self.rule.pattern);
                false
            }
        }
    }
}

/// Matches commands against app-scoped rules first, then global rules.
#[derive(Debug, Clone, Default)]
pub struct OverrideResolver {
    global: Vec<CompiledOverride>,
    per_app: HashMap<String, Vec<CompiledOverride>>,
}

impl OverrideResolver {
    pub fn new(
        global: &[SecurityOverride],
        per_app: &BTreeMap<String, Vec<SecurityOverride>>,
    ) -> Self {
        Self {
            global: global.iter().map(CompiledOverride::compile).collect(),
            per_app: per_app
                .iter()
                .map(|(app, rules)| {
                    (app.clone(), rules.iter().map(CompiledOverride::compile).collect())
                })
                .collect(),
        }
    }

    /// Returns the first override whose pattern matches `command`. An empty
    /// application name is treated as no application.
    pub fn resolve(&self, command: &str, app_name: Option<&str>) -> Option<&SecurityOverride> {
        let app_rules = app_name
            .filter(|name| !name.is_empty())
            .and_then(|name| self.per_app.get(name))
            .map(Vec::as_slice)
            .unwrap_or_default();

        app_rules
            .iter()
            .chain(self.global.iter())
            .find(|rule| rule.matches(command))
            .map(|rule| &rule.rule)
    }

    pub fn is_empty(&self) -> bool {
        self.global.is_empty() && self.per_app.values().all(Vec::is_empty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver(
        global: Vec<SecurityOverride>,
        apps: Vec<(&str, Vec<SecurityOverride>)>,
    ) -> OverrideResolver {
        let per_app: BTreeMap<String, Vec<SecurityOverride>> = apps
            .into_iter()
            .map(|(name, rules)| (name.to_string(), rules))
            .collect();
        OverrideResolver::new(&global, &per_app)
    }

    #[test]
    fn test_rule_kind_round_trip() {
        for kind in RuleKind::ALL {
            assert_eq!(kind.as_str().parse::<RuleKind>(), Ok(kind));
        }
        assert_eq!("root-access".parse::<RuleKind>(), Err("root-access".to_string()));
    }

    #[test]
    fn test_global_override_matches() {
        let r = resolver(
            vec![SecurityOverride::new(
                RuleKind::NetworkAccess,
                r"^curl .*example\.com",
                "vendor mirror",
            )],
            vec![],
        );
        let hit = r.resolve("curl https://example.com/setup", None).unwrap();
        assert_eq!(hit.reason, "vendor mirror");
        assert!(r.resolve("wget https://example.com/setup", None).is_none());
    }

    #[test]
    fn test_app_override_takes_precedence() {
        let r = resolver(
            vec![SecurityOverride::new(RuleKind::DangerousCommand, "install", "global")],
            vec![(
                "docker",
                vec![
                    SecurityOverride::new(RuleKind::DangerousCommand, "install", "docker-specific")
                        .for_app("docker"),
                ],
            )],
        );
        assert_eq!(r.resolve("./install", Some("docker")).unwrap().reason, "docker-specific");
        assert_eq!(r.resolve("./install", Some("other")).unwrap().reason, "global");
        assert_eq!(r.resolve("./install", None).unwrap().reason, "global");
    }

    #[test]
    fn test_app_rules_ignored_without_app() {
        let r = resolver(
            vec![],
            vec![(
                "docker",
                vec![SecurityOverride::new(RuleKind::NetworkAccess, "get.docker.com", "docker")],
            )],
        );
        assert!(r.resolve("curl https://get.docker.com | sh", None).is_none());
        assert!(r.resolve("curl https://get.docker.com | sh", Some("")).is_none());
        assert!(r.resolve("curl https://get.docker.com | sh", Some("docker")).is_some());
    }

    #[test]
    fn test_malformed_override_is_skipped() {
        let r = resolver(
            vec![
                SecurityOverride::new(RuleKind::CommandInjection, "([unclosed", "broken"),
                SecurityOverride::new(RuleKind::CommandInjection, "unclosed", "fallback"),
            ],
            vec![],
        );
        assert_eq!(r.resolve("echo ([unclosed", None).unwrap().reason, "fallback");
    }

    #[test]
    fn test_empty_resolver() {
        let r = OverrideResolver::default();
        assert!(r.is_empty());
        assert!(r.resolve("anything", Some("app")).is_none());
    }
}
