//! Shell execution for validated commands.
//!
//! This module spawns commands through the system shell and keeps a bounded
//! log of what was run, simulated or refused.

mod command_log;
mod runner;

pub use command_log::{CommandLog, CommandRecord, CommandStatus};
pub use runner::{CommandOutput, DEFAULT_MAX_OUTPUT_BYTES, DEFAULT_TIMEOUT_SECS, ShellRunner};
