//! Security policy configuration: YAML shape, validation and persistence.
//!
//! A policy file that fails validation fails the load. There is no fallback
//! to a default policy in that case, since silently replacing a broken file
//! could widen or narrow what gets executed.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use tracing::{debug, info, warn};

use super::error::ConfigError;
use super::{RuleKind, SecurityLevel, SecurityOverride};

/// System-wide default policy location.
pub const SYSTEM_CONFIG_PATH: &str = "/etc/rusty-setup/security.yaml";

const CONFIG_DIR_NAME: &str = "rusty-setup";
const CONFIG_FILE_NAME: &str = "security.yaml";

/// Commands every override pattern is checked against at load time.
const CRITICAL_SAMPLES: &[&str] = &[
    "rm -rf /",
    "rm -rf ~",
    ":(){ :|:& };:",
    "mkfs.ext4 /dev/sda1",
    "dd if=/dev/zero of=/dev/sda",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SecurityConfig {
    pub level: SecurityLevel,
    pub enterprise_mode: bool,
    pub warn_on_overrides: bool,
    pub global_overrides: Vec<SecurityOverride>,
    pub app_overrides: BTreeMap<String, Vec<SecurityOverride>>,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            level: SecurityLevel::Moderate,
            enterprise_mode: false,
            warn_on_overrides: true,
            global_overrides: Vec::new(),
            app_overrides: BTreeMap::new(),
        }
    }
}

impl SecurityConfig {
    pub fn with_level(level: SecurityLevel) -> Self {
        Self {
            level,
            ..Self::default()
        }
    }

    /// Parses and validates a YAML policy. `origin` is only used in errors.
    pub fn from_yaml(content: &str, origin: &Path) -> Result<Self, ConfigError> {
        let parse_error = |source: serde_yaml::Error| ConfigError::Parse {
            path: origin.to_path_buf(),
            source,
        };
        let empty = || ConfigError::EmptyFile {
            path: origin.to_path_buf(),
        };
        // An existing file with no document is a broken policy, not a default one.
        if !has_content(content) {
            return Err(empty());
        }
        let document: Value = serde_yaml::from_str(content).map_err(parse_error)?;
        if document.is_null() {
            return Err(empty());
        }
        let raw: RawSecurityConfig = serde_yaml::from_str(content).map_err(parse_error)?;
        raw.into_config()
    }

    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        serde_yaml::to_string(self).map_err(ConfigError::Serialize)
    }

    /// Structural checks on overrides. Levels and rule kinds are already
    /// typed here; the raw loader checks those.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (i, rule) in self.global_overrides.iter().enumerate() {
            validate_override(rule, &format!("global_overrides[{}]", i))?;
        }
        for (app, rules) in &self.app_overrides {
            if app.trim().is_empty() {
                return Err(ConfigError::EmptyAppName);
            }
            for (i, rule) in rules.iter().enumerate() {
                validate_override(rule, &format!("app_overrides.{}[{}]", app, i))?;
            }
        }
        Ok(())
    }

    /// Number of overrides across all scopes.
    pub fn override_count(&self) -> usize {
        self.global_overrides.len() + self.app_overrides.values().map(Vec::len).sum::<usize>()
    }
}

fn has_content(content: &str) -> bool {
    content.lines().map(str::trim).any(|line| {
        !line.is_empty() && !line.starts_with('#') && line != "---" && line != "..."
    })
}

fn validate_override(rule: &SecurityOverride, scope: &str) -> Result<(), ConfigError> {
    if rule.pattern.trim().is_empty() {
        return Err(ConfigError::EmptyPattern {
            scope: scope.to_string(),
        });
    }
    let re = Regex::new(&rule.pattern).map_err(|source| ConfigError::InvalidRegex {
        scope: scope.to_string(),
        pattern: rule.pattern.clone(),
        source,
    })?;
    if rule.reason.trim().is_empty() {
        return Err(ConfigError::EmptyReason {
            scope: scope.to_string(),
        });
    }

    if let Some(sample) = CRITICAL_SAMPLES.iter().find(|sample| re.is_match(sample)) {
        warn!(
            target: "audit",
            "{}: override pattern '{}' also matches critical command '{}'; it will bypass the critical gate",
            scope, rule.pattern, sample
        );
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawSecurityConfig {
    #[serde(default)]
    level: Option<Value>,
    #[serde(default)]
    enterprise_mode: bool,
    #[serde(default = "default_true")]
    warn_on_overrides: bool,
    #[serde(default)]
    global_overrides: Vec<RawOverride>,
    #[serde(default)]
    app_overrides: BTreeMap<String, Vec<RawOverride>>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawOverride {
    #[serde(default)]
    rule_type: Option<Value>,
    #[serde(default)]
    pattern: String,
    #[serde(default)]
    reason: String,
    #[serde(default)]
    app_name: Option<String>,
    #[serde(default)]
    warn_user: bool,
}

fn default_true() -> bool {
    true
}

impl RawSecurityConfig {
    fn into_config(self) -> Result<SecurityConfig, ConfigError> {
        let level = match self.level {
            None | Some(Value::Null) => SecurityLevel::default(),
            Some(Value::String(s)) => s.parse()?,
            Some(other) => return Err(ConfigError::InvalidLevel(value_text(&other))),
        };

        let global_overrides = self
            .global_overrides
            .into_iter()
            .enumerate()
            .map(|(i, raw)| raw.into_override(&format!("global_overrides[{}]", i), None))
            .collect::<Result<Vec<_>, _>>()?;

        let mut app_overrides = BTreeMap::new();
        for (app, rules) in self.app_overrides {
            if app.trim().is_empty() {
                return Err(ConfigError::EmptyAppName);
            }
            let rules = rules
                .into_iter()
                .enumerate()
                .map(|(i, raw)| {
                    raw.into_override(&format!("app_overrides.{}[{}]", app, i), Some(app.as_str()))
                })
                .collect::<Result<Vec<_>, _>>()?;
            app_overrides.insert(app, rules);
        }

        let config = SecurityConfig {
            level,
            enterprise_mode: self.enterprise_mode,
            warn_on_overrides: self.warn_on_overrides,
            global_overrides,
            app_overrides,
        };
        config.validate()?;
        Ok(config)
    }
}

impl RawOverride {
    fn into_override(
        self,
        scope: &str,
        app: Option<&str>,
    ) -> Result<SecurityOverride, ConfigError> {
        let rule_type = match &self.rule_type {
            Some(Value::String(s)) => {
                s.parse::<RuleKind>().map_err(|value| ConfigError::InvalidRuleType {
                    scope: scope.to_string(),
                    value,
                })?
            }
            Some(other) => {
                return Err(ConfigError::InvalidRuleType {
                    scope: scope.to_string(),
                    value: value_text(other),
                });
            }
            None => {
                return Err(ConfigError::InvalidRuleType {
                    scope: scope.to_string(),
                    value: "<missing>".to_string(),
                });
            }
        };

        Ok(SecurityOverride {
            rule_type,
            pattern: self.pattern,
            reason: self.reason,
            app_name: self.app_name.or_else(|| app.map(str::to_string)),
            warn_user: self.warn_user,
        })
    }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "null".to_string(),
        other => serde_yaml::to_string(other)
            .map(|s| s.trim().to_string())
            .unwrap_or_else(|_| format!("{:?}", other)),
    }
}

/// Per-user policy location, e.g. `~/.config/rusty-setup/security.yaml`.
pub fn default_user_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
}

/// Finds, loads and saves the policy file.
///
/// Lookup order: explicit path, user override, system default, built-in
/// default. An explicit path that does not exist is an error.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    explicit: Option<PathBuf>,
    user_path: Option<PathBuf>,
    system_path: Option<PathBuf>,
}

impl ConfigStore {
    pub fn new(explicit: Option<PathBuf>) -> Self {
        Self {
            explicit,
            user_path: default_user_path(),
            system_path: Some(PathBuf::from(SYSTEM_CONFIG_PATH)),
        }
    }

    pub fn with_locations(
        explicit: Option<PathBuf>,
        user_path: Option<PathBuf>,
        system_path: Option<PathBuf>,
    ) -> Self {
        Self {
            explicit,
            user_path,
            system_path,
        }
    }

    /// The file `load` would read, or `None` for the built-in default.
    pub fn resolve(&self) -> Option<PathBuf> {
        if let Some(path) = &self.explicit {
            return Some(path.clone());
        }
        [&self.user_path, &self.system_path]
            .into_iter()
            .flatten()
            .find(|path| path.is_file())
            .cloned()
    }

    pub fn load(&self) -> Result<SecurityConfig, ConfigError> {
        match self.resolve() {
            Some(path) => Self::load_from(&path),
            None => {
                debug!("No security policy file found, using built-in default");
                Ok(SecurityConfig::default())
            }
        }
    }

    pub fn load_from(path: &Path) -> Result<SecurityConfig, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = SecurityConfig::from_yaml(&content, path)?;
        info!(
            "Loaded security policy from {} (level: {}, overrides: {})",
            path.display(),
            config.level,
            config.override_count()
        );
        Ok(config)
    }

    /// Where `save` writes when no path is given: the explicit path, else the
    /// user location.
    pub fn save_target(&self) -> Option<PathBuf> {
        self.explicit.clone().or_else(|| self.user_path.clone())
    }

    /// Writes `config` as YAML, readable by the owner only.
    pub fn save(config: &SecurityConfig, path: &Path) -> Result<(), ConfigError> {
        config.validate()?;
        let yaml = config.to_yaml()?;
        write_private(path, yaml.as_bytes()).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        info!("Saved security policy to {}", path.display());
        Ok(())
    }
}

fn write_private(path: &Path, data: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let tmp = path.with_extension("yaml.tmp");
    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options.open(&tmp)?;
    file.write_all(data)?;
    file.sync_all()?;
    drop(file);

    fs::rename(&tmp, path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(yaml: &str) -> Result<SecurityConfig, ConfigError> {
        SecurityConfig::from_yaml(yaml, Path::new("test.yaml"))
    }

    #[test]
    fn test_default_config() {
        let config = SecurityConfig::default();
        assert_eq!(config.level, SecurityLevel::Moderate);
        assert!(config.warn_on_overrides);
        assert!(!config.enterprise_mode);
        assert_eq!(config.override_count(), 0);
    }

    #[test]
    fn test_parse_full_document() {
        let config = parse(
            r#"
level: strict
enterprise_mode: true
warn_on_overrides: false
global_overrides:
  - rule_type: network-access
    pattern: 'curl.*github\.com.*\| bash'
    reason: Trusted GitHub installers
    warn_user: true
app_overrides:
  docker:
    - rule_type: privilege-escalation
      pattern: '^sudo usermod -aG docker'
      reason: Docker group membership
"#,
        )
        .unwrap();

        assert_eq!(config.level, SecurityLevel::Strict);
        assert!(config.enterprise_mode);
        assert!(!config.warn_on_overrides);
        assert_eq!(config.global_overrides[0].rule_type, RuleKind::NetworkAccess);
        assert!(config.global_overrides[0].warn_user);
        let docker = &config.app_overrides["docker"][0];
        assert_eq!(docker.rule_type, RuleKind::PrivilegeEscalation);
        assert_eq!(docker.app_name.as_deref(), Some("docker"));
        assert!(!docker.warn_user);
    }

    #[test]
    fn test_missing_keys_use_defaults() {
        let config = parse("level: permissive\n").unwrap();
        assert_eq!(config.level, SecurityLevel::Permissive);
        assert!(config.warn_on_overrides);
    }

    #[test]
    fn test_empty_document_is_rejected() {
        for yaml in ["", "\n  \n", "# policy intentionally strict\n", "---\n"] {
            assert!(
                matches!(parse(yaml), Err(ConfigError::EmptyFile { .. })),
                "accepted {yaml:?}"
            );
        }
    }

    #[test]
    fn test_unknown_keys_are_rejected() {
        assert!(matches!(
            parse("levle: strict\n"),
            Err(ConfigError::Parse { .. })
        ));
        assert!(matches!(
            parse("level: strict\nglobal_override: []\n"),
            Err(ConfigError::Parse { .. })
        ));
        assert!(matches!(
            parse(
                "global_overrides:\n  - rule_type: network-access\n    pattern: '^curl '\n    reason: downloads\n    warn: true\n"
            ),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_level_is_case_insensitive() {
        assert_eq!(parse("level: Strict").unwrap().level, SecurityLevel::Strict);
    }

    #[test]
    fn test_invalid_level() {
        assert!(matches!(parse("level: 99"), Err(ConfigError::InvalidLevel(v)) if v == "99"));
        assert!(matches!(parse("level: paranoid"), Err(ConfigError::InvalidLevel(_))));
        assert!(matches!(parse("level: true"), Err(ConfigError::InvalidLevel(_))));
    }

    #[test]
    fn test_invalid_rule_type() {
        let err = parse(
            "global_overrides:\n  - rule_type: root-access\n    pattern: x\n    reason: y\n",
        )
        .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidRuleType { ref value, .. } if value == "root-access"
        ));

        let err = parse("global_overrides:\n  - pattern: x\n    reason: y\n").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidRuleType { .. }));
    }

    #[test]
    fn test_empty_pattern_and_reason() {
        let err = parse(
            "global_overrides:\n  - rule_type: network-access\n    pattern: ''\n    reason: y\n",
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::EmptyPattern { .. }));

        let err = parse(
            "global_overrides:\n  - rule_type: network-access\n    pattern: curl\n    reason: '  '\n",
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::EmptyReason { .. }));
    }

    #[test]
    fn test_invalid_regex_names_scope() {
        let err = parse(
            "app_overrides:\n  node:\n    - rule_type: network-access\n      pattern: '([bad'\n      reason: y\n",
        )
        .unwrap_err();
        match err {
            ConfigError::InvalidRegex { scope, pattern, .. } => {
                assert_eq!(scope, "app_overrides.node[0]");
                assert_eq!(pattern, "([bad");
            }
            other => panic!("Expected InvalidRegex, got {other:?}"),
        }
    }

    #[test]
    fn test_empty_app_name() {
        let err = parse(
            "app_overrides:\n  '':\n    - rule_type: network-access\n      pattern: curl\n      reason: y\n",
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::EmptyAppName));
    }

    #[test]
    fn test_malformed_yaml() {
        assert!(matches!(parse("level: [strict"), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_broad_override_still_loads() {
        let config = parse(
            "global_overrides:\n  - rule_type: dangerous-command\n    pattern: '.*'\n    reason: lab machine\n",
        )
        .unwrap();
        assert_eq!(config.override_count(), 1);
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("security.yaml");

        let mut config = SecurityConfig::with_level(SecurityLevel::Enterprise);
        config.enterprise_mode = true;
        config.warn_on_overrides = false;
        config.global_overrides.push(
            SecurityOverride::new(
                RuleKind::NetworkAccess,
                r"curl.*github\.com",
                "GitHub installers",
            )
            .with_warning(),
        );
        config.app_overrides.insert(
            "rustup".to_string(),
            vec![
                SecurityOverride::new(RuleKind::NetworkAccess, "sh.rustup.rs", "rustup installer")
                    .for_app("rustup"),
            ],
        );

        ConfigStore::save(&config, &path).unwrap();
        let loaded = ConfigStore::load_from(&path).unwrap();

        assert_eq!(loaded, config);
    }

    #[cfg(unix)]
    #[test]
    fn test_save_uses_private_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("security.yaml");
        ConfigStore::save(&SecurityConfig::default(), &path).unwrap();

        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_store_resolution_order() {
        let dir = tempfile::tempdir().unwrap();
        let user = dir.path().join("user.yaml");
        let system = dir.path().join("system.yaml");

        let store = ConfigStore::with_locations(None, Some(user.clone()), Some(system.clone()));
        assert_eq!(store.resolve(), None);
        assert_eq!(store.load().unwrap(), SecurityConfig::default());

        fs::write(&system, "level: strict\n").unwrap();
        assert_eq!(store.resolve(), Some(system.clone()));
        assert_eq!(store.load().unwrap().level, SecurityLevel::Strict);

        fs::write(&user, "level: permissive\n").unwrap();
        assert_eq!(store.resolve(), Some(user.clone()));
        assert_eq!(store.load().unwrap().level, SecurityLevel::Permissive);

        let explicit = dir.path().join("explicit.yaml");
        fs::write(&explicit, "level: enterprise\n").unwrap();
        let store = ConfigStore::with_locations(Some(explicit), Some(user), Some(system));
        assert_eq!(store.load().unwrap().level, SecurityLevel::Enterprise);
    }

    #[test]
    fn test_invalid_file_does_not_fall_back() {
        let dir = tempfile::tempdir().unwrap();
        let user = dir.path().join("user.yaml");
        let system = dir.path().join("system.yaml");
        fs::write(&user, "level: 99\n").unwrap();
        fs::write(&system, "level: moderate\n").unwrap();

        let store = ConfigStore::with_locations(None, Some(user), Some(system));
        assert!(matches!(store.load(), Err(ConfigError::InvalidLevel(_))));
    }

    #[test]
    fn test_missing_explicit_path_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::with_locations(Some(dir.path().join("missing.yaml")), None, None);
        assert!(matches!(store.load(), Err(ConfigError::Io { .. })));
    }
}
