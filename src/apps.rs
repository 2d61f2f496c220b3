//! Application definitions as supplied by the installer's app catalogue.
//!
//! Only the parts the security layer needs are modelled: the app name, its
//! install-phase commands and whether the catalogue marks it as trusted.

use std::fs;
use std::path::Path;

use anyhow::Context as _;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppDefinition {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(
        default,
        rename = "pre-install",
        alias = "pre_install",
        skip_serializing_if = "Option::is_none"
    )]
    pub pre_install: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub install: Option<String>,
    #[serde(
        default,
        rename = "post-install",
        alias = "post_install",
        skip_serializing_if = "Option::is_none"
    )]
    pub post_install: Option<String>,
    /// Set by the catalogue for first-party definitions.
    #[serde(default)]
    pub trusted: bool,
}

impl AppDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Every command line of the pre-install, install and post-install
    /// phases, in execution order. Blank lines and `#` comments are skipped.
    pub fn commands(&self) -> impl Iterator<Item = &str> {
        [&self.pre_install, &self.install, &self.post_install]
            .into_iter()
            .flatten()
            .flat_map(|script| script.lines())
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
    }
}

/// Loads a YAML list of app definitions.
pub fn load_app_definitions(path: &Path) -> anyhow::Result<Vec<AppDefinition>> {
    let raw =
        fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let apps: Vec<AppDefinition> = serde_yaml::from_str(&raw)
        .with_context(|| format!("Invalid app definitions in {}", path.display()))?;
    Ok(apps)
}
