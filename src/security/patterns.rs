//! Built-in pattern tables.
//!
//! Three sets, each stored as plain strings and compiled once when a
//! [`PatternLibrary`] is built:
//! - critical: catastrophic, irreversible operations. Enforced at every level.
//! - dangerous: high-risk idioms. Denied under moderate, audited under enterprise.
//! - safe: allow-list consulted only by strict mode.

use regex::Regex;

use super::error::SecurityError;

/// Recursive deletion of filesystem roots, raw block-device writes,
/// filesystem formatting and fork bombs.
pub const CRITICAL_PATTERNS: &[&str] = &[
    // Recursive flag before the target, in any position: rm -rf /, rm -r -f "/", rm --recursive ~
    r#"\brm\s+(?:[^\s;&|]+\s+)*?(?:-[a-zA-Z]*[rR][a-zA-Z]*|--recursive)\s+(?:[^\s;&|]+\s+)*?["']?(?:/|~|\$HOME|\$\{HOME\})/?\*?["']?(?:\s|$|[;&|])"#,
    // Target before the flag, which GNU rm accepts: rm / -rf
    r#"\brm\s+(?:[^\s;&|]+\s+)*?["']?(?:/|~|\$HOME|\$\{HOME\})/?\*?["']?\s+(?:[^\s;&|]+\s+)*?(?:-[a-zA-Z]*[rR][a-zA-Z]*|--recursive)(?:\s|$|[;&|])"#,
    r"\brm\s+(?:-[a-zA-Z-]+\s+)*--no-preserve-root\b",
    r"\bdd\s+.*\bof=/dev/(?:sd|hd|vd|xvd|nvme|mmcblk|disk)",
    r">\s*/dev/(?:sd|hd|vd|xvd|nvme|mmcblk)[a-z0-9]*\b",
    r"\bmkfs(?:\.[a-z0-9]+)?\s",
    r"\bmkswap\s+/dev/",
    r"\bwipefs\s+(?:-[a-zA-Z-]+\s+)*/dev/",
    r":\(\)\s*\{\s*:\s*\|\s*:\s*&\s*\}\s*;\s*:",
    r"\b\w+\(\)\s*\{\s*\w+\s*\|\s*\w+\s*&\s*\}\s*;",
];

/// Reverse shells, download-into-interpreter, SUID/SGID manipulation,
/// credential file writes and obfuscated shell chains.
pub const DANGEROUS_PATTERNS: &[&str] = &[
    r"\b(?:nc|ncat|netcat)\b.*\s-[a-zA-Z]*[ec]\s",
    r"/dev/(?:tcp|udp)/",
    r"\b(?:ba)?sh\s+-i\s+[<>]&",
    r"\bsocat\b.*\bexec:",
    r"\b(?:curl|wget|fetch)\b[^|]*\|\s*(?:sudo\s+(?:-\S+\s+)*)?(?:(?:\S*/)?env\s+)?(?:\S*/)?(?:ba|z|k|da|c|tc)?sh\b",
    r"\b(?:curl|wget|fetch)\b[^|]*\|\s*(?:sudo\s+(?:-\S+\s+)*)?(?:(?:\S*/)?env\s+)?(?:\S*/)?(?:python[0-9.]*|perl|ruby|node|php)\b",
    r"\bchmod\s+(?:-[a-zA-Z]+\s+)*(?:[ugoa]*\+[rwxXt]*s|[2-7][0-7]{3})\b",
    r"\bchmod\s+(?:-[a-zA-Z]+\s+)*-R\s+777\s+/(?:\s|$)",
    r">>?\s*/etc/(?:passwd|shadow|group|gshadow|sudoers)\b",
    r"\btee\s+(?:-a\s+)?/etc/(?:passwd|shadow|group|gshadow|sudoers)\b",
    r"\b(?:ba)?sh\s+-c\s+.*\b(?:ba)?sh\s+-c\b",
    r"\$\([^)]*\b(?:curl|wget|nc|base64|eval|rm)\b[^)]*\)",
    r"`[^`]*\b(?:curl|wget|nc|base64|eval|rm)\b[^`]*`",
    r"\bbase64\s+(?:-d|--decode)\b[^|]*\|\s*(?:ba|z)?sh\b",
    r"\beval\s+.*\b(?:curl|wget)\b",
];

/// Strict-mode allow-list. Every entry is anchored, matches only spaces and
/// tabs between words and rejects shell composition characters, line breaks
/// included, so a safe prefix cannot smuggle a second command.
pub const SAFE_PATTERNS: &[&str] = &[
    r"^(?:sudo[ \t]+)?(?:apt|apt-get|dnf|yum|zypper|pacman|snap|flatpak|brew|pip3?|npm|cargo|gem)[ \t]+(?:-[a-zA-Z]+[ \t]+)*(?:install|update|upgrade|search|list|info|show|refresh|-S[a-z]*|-Q[a-z]*)(?:[ \t]|$)[^;&|<>`$\n\r]*$",
    r"^[\w./-]+[ \t]+(?:--version|-v|-V|version|--help|-h|help)[ \t]*$",
    r"^(?:ls|cat|head|tail|less|more|grep|stat|file|wc|du|df|pwd|whoami|which|uname|date|echo|id|hostname|printenv)(?:[ \t]|$)[^;&|<>`$\n\r]*$",
    r"^(?:cd|true|false|test|type|command[ \t]+-v|alias|export)(?:[ \t]|$)[^;&|<>`$\n\r]*$",
];

/// One compiled pattern set. Matching is a linear scan; the first hit wins.
#[derive(Debug, Clone)]
pub struct PatternSet {
    compiled: Vec<(&'static str, Regex)>,
}

impl PatternSet {
    pub fn compile(patterns: &[&'static str]) -> Result<Self, SecurityError> {
        let compiled = patterns
            .iter()
            .map(|&pattern| {
                Regex::new(pattern)
                    .map(|re| (pattern, re))
                    .map_err(|source| SecurityError::Pattern { pattern, source })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { compiled })
    }

    /// Returns the source of the first pattern matching `command`.
    pub fn first_match(&self, command: &str) -> Option<&'static str> {
        self.compiled
            .iter()
            .find(|(_, re)| re.is_match(command))
            .map(|(pattern, _)| *pattern)
    }

    pub fn is_match(&self, command: &str) -> bool {
        self.first_match(command).is_some()
    }

    pub fn len(&self) -> usize {
        self.compiled.len()
    }

    pub fn is_empty(&self) -> bool {
        self.compiled.is_empty()
    }
}

/// The engine's immutable pattern data.
#[derive(Debug, Clone)]
pub struct PatternLibrary {
    critical: PatternSet,
    dangerous: PatternSet,
    safe: PatternSet,
}

impl PatternLibrary {
    /// Compiles the built-in tables.
    pub fn builtin() -> Result<Self, SecurityError> {
        Ok(Self {
            critical: PatternSet::compile(CRITICAL_PATTERNS)?,
            dangerous: PatternSet::compile(DANGEROUS_PATTERNS)?,
            safe: PatternSet::compile(SAFE_PATTERNS)?,
        })
    }

    pub fn critical(&self) -> &PatternSet {
        &self.critical
    }

    pub fn dangerous(&self) -> &PatternSet {
        &self.dangerous
    }

    pub fn safe(&self) -> &PatternSet {
        &self.safe
    }
}
