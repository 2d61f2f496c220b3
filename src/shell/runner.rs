//! Child process execution for validated commands.
//!
//! Commands run through `sh -c` with output captured. On unix the child leads
//! its own process group so a timeout or cancellation can take down the
//! whole subtree instead of orphaning grandchildren.

use std::future::Future;
use std::process::Stdio;

use tokio::process::Command;
use tokio::time::{Duration, sleep};
use tracing::{debug, warn};

#[cfg(unix)]
use nix::sys::signal::{Signal, killpg};
#[cfg(unix)]
use nix::unistd::Pid;

use crate::security::ExecutionError;

/// Default timeout for one command in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Captured output beyond this many bytes is truncated (1MB).
pub const DEFAULT_MAX_OUTPUT_BYTES: usize = 1_000_000;

// Grace period between SIGTERM and SIGKILL.
#[cfg(unix)]
const KILL_GRACE: Duration = Duration::from_millis(500);

/// Output of a command that ran to completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
    /// Stdout followed by stderr, lossily decoded.
    pub output: String,
    pub truncated: bool,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

#[derive(Debug, Clone)]
pub struct ShellRunner {
    shell: String,
    timeout_secs: u64,
    max_output_bytes: usize,
}

impl Default for ShellRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl ShellRunner {
    pub fn new() -> Self {
        Self {
            shell: default_shell().to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
        }
    }

    pub fn with_shell(mut self, shell: impl Into<String>) -> Self {
        self.shell = shell.into();
        self
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn with_max_output(mut self, bytes: usize) -> Self {
        self.max_output_bytes = bytes;
        self
    }

    pub fn timeout_secs(&self) -> u64 {
        self.timeout_secs
    }

    /// Runs `command`, terminating it when the timeout elapses or `cancel`
    /// resolves, whichever comes first.
    pub async fn run<C>(&self, command: &str, cancel: C) -> Result<CommandOutput, ExecutionError>
    where
        C: Future<Output = ()>,
    {
        let mut cmd = Command::new(&self.shell);
        cmd.arg(shell_flag())
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        #[cfg(unix)]
        {
            cmd.process_group(0);
        }

        let child = cmd.spawn()?;
        let pid = child.id();
        debug!("Spawned '{}' (pid {:?})", command, pid);

        tokio::select! {
            result = child.wait_with_output() => {
                let output = result?;
                let mut combined = output.stdout;
                combined.extend_from_slice(&output.stderr);
                let (text, truncated) = self.truncate_output(&combined);
                Ok(CommandOutput {
                    exit_code: output.status.code(),
                    output: text,
                    truncated,
                })
            }
            _ = sleep(Duration::from_secs(self.timeout_secs)) => {
                warn!("Command '{}' timed out after {}s, terminating", command, self.timeout_secs);
                terminate_group(pid).await;
                Err(ExecutionError::TimedOut(self.timeout_secs))
            }
            _ = cancel => {
                warn!("Command '{}' cancelled, terminating", command);
                terminate_group(pid).await;
                Err(ExecutionError::Cancelled)
            }
        }
    }

    fn truncate_output(&self, bytes: &[u8]) -> (String, bool) {
        if bytes.len() <= self.max_output_bytes {
            return (String::from_utf8_lossy(bytes).into_owned(), false);
        }

        let mut end = self.max_output_bytes;
        while end > 0 && (bytes[end] & 0xC0) == 0x80 {
            end -= 1;
        }
        let text = String::from_utf8_lossy(&bytes[..end]);
        (
            format!("{}...\n[Output truncated, {} bytes total]", text, bytes.len()),
            true,
        )
    }
}

#[cfg(unix)]
fn default_shell() -> &'static str {
    "sh"
}

#[cfg(not(unix))]
fn default_shell() -> &'static str {
    "cmd"
}

#[cfg(unix)]
fn shell_flag() -> &'static str {
    "-c"
}

#[cfg(not(unix))]
fn shell_flag() -> &'static str {
    "/C"
}

#[cfg(unix)]
async fn terminate_group(pid: Option<u32>) {
    let Some(pid) = pid.and_then(|pid| i32::try_from(pid).ok()) else {
        return;
    };
    let pgid = Pid::from_raw(pid);

    if let Err(e) = killpg(pgid, Signal::SIGTERM) {
        debug!("SIGTERM to process group {} failed: {}", pid, e);
        return;
    }
    sleep(KILL_GRACE).await;
    if let Err(e) = killpg(pgid, Signal::SIGKILL) {
        // ESRCH here means the group already exited after SIGTERM.
        debug!("SIGKILL to process group {} failed: {}", pid, e);
    }
}

// Elsewhere kill_on_drop takes care of the direct child.
#[cfg(not(unix))]
async fn terminate_group(_pid: Option<u32>) {}
