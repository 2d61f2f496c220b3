//! Bounded record of what the executor did with each command.
//!
//! The installer front end reads this to present results; nothing here is
//! persisted.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

/// What happened to a command.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CommandStatus {
    Executed { exit_code: Option<i32> },
    Simulated,
    Denied { reason: String },
    Failed { error: String },
}

/// A single command with its outcome and captured output.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CommandRecord {
    pub command: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_name: Option<String>,
    #[serde(flatten)]
    pub status: CommandStatus,
    pub output: String,
}

impl CommandRecord {
    pub fn new(command: impl Into<String>, app_name: Option<&str>, status: CommandStatus) -> Self {
        Self {
            command: command.into(),
            app_name: app_name.filter(|name| !name.is_empty()).map(str::to_string),
            status,
            output: String::new(),
        }
    }

    /// Attaches output, stripping terminal escape sequences.
    pub fn with_output(mut self, raw: &str) -> Self {
        self.output = strip_ansi_codes(raw);
        self
    }
}

/// Keeps the most recent `max_len` records.
#[derive(Debug)]
pub struct CommandLog {
    entries: VecDeque<CommandRecord>,
    max_len: usize,
}

impl CommandLog {
    pub fn new(max_len: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(max_len),
            max_len,
        }
    }

    /// Adds a record, evicting the oldest one when full.
    pub fn push(&mut self, record: CommandRecord) {
        if self.max_len == 0 {
            return;
        }
        if self.entries.len() >= self.max_len {
            self.entries.pop_front();
        }
        self.entries.push_back(record);
    }

    pub fn entries(&self) -> impl Iterator<Item = &CommandRecord> {
        self.entries.iter()
    }

    /// Up to `n` most recent records, oldest first.
    pub fn recent(&self, n: usize) -> Vec<CommandRecord> {
        let start = self.entries.len().saturating_sub(n);
        self.entries.iter().skip(start).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl Default for CommandLog {
    fn default() -> Self {
        Self::new(200)
    }
}

/// Strip ANSI escape codes (CSI and OSC sequences) from text.
fn strip_ansi_codes(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch != '\x1b' {
            result.push(ch);
            continue;
        }
        match chars.peek() {
            Some('[') => {
                chars.next();
                // CSI ends at the first letter
                for next_ch in chars.by_ref() {
                    if next_ch.is_ascii_alphabetic() {
                        break;
                    }
                }
            }
            Some(']') => {
                chars.next();
                // OSC ends at BEL or ST (ESC \)
                while let Some(next_ch) = chars.next() {
                    if next_ch == '\x07' {
                        break;
                    }
                    if next_ch == '\x1b' && chars.peek() == Some(&'\\') {
                        chars.next();
                        break;
                    }
                }
            }
            _ => {}
        }
    }

    result
}
