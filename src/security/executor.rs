//! Command execution gated on validation.
//!
//! [`SecureExecutor`] is the only path from a command string to a child
//! process. A denied command is logged and returned as an error; it never
//! reaches the shell.

use std::future::{Future, pending};
use std::sync::Mutex;

use serde::Serialize;
use tracing::{debug, error, info, warn};

use super::{ExecutionError, ValidationOutcome, Validator};
use crate::apps::AppDefinition;
use crate::shell::{CommandLog, CommandRecord, CommandStatus, ShellRunner};

/// What the executor will do with a validated command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionDecision {
    /// Run the command.
    Execute,
    /// Report what would run without running it.
    Simulate,
    /// Do not run the command.
    Deny { reason: String },
}

/// Maps a validation outcome onto an execution decision.
///
/// # Examples
/// ```
/// use rusty_setup::security::{DenialReason, ValidationOutcome};
/// use rusty_setup::security::executor::{gate_command, ExecutionDecision};
///
/// assert_eq!(gate_command(&ValidationOutcome::allow(), false), ExecutionDecision::Execute);
/// assert_eq!(gate_command(&ValidationOutcome::allow(), true), ExecutionDecision::Simulate);
///
/// let denied = ValidationOutcome::deny(DenialReason::BlacklistMatch);
/// assert!(matches!(gate_command(&denied, true), ExecutionDecision::Deny { .. }));
/// ```
pub fn gate_command(outcome: &ValidationOutcome, dry_run: bool) -> ExecutionDecision {
    match (outcome.allowed, dry_run) {
        (false, _) => ExecutionDecision::Deny {
            reason: outcome.describe(),
        },
        (true, true) => ExecutionDecision::Simulate,
        (true, false) => ExecutionDecision::Execute,
    }
}

/// Result of a command that passed validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionReport {
    pub command: String,
    /// `None` for dry runs and for processes killed by a signal.
    pub exit_code: Option<i32>,
    pub output: String,
    pub dry_run: bool,
}

impl ExecutionReport {
    pub fn success(&self) -> bool {
        self.dry_run || self.exit_code == Some(0)
    }
}

pub struct SecureExecutor {
    validator: Validator,
    runner: ShellRunner,
    dry_run: bool,
    log: Mutex<CommandLog>,
}

impl SecureExecutor {
    pub fn new(validator: Validator) -> Self {
        Self {
            validator,
            runner: ShellRunner::new(),
            dry_run: false,
            log: Mutex::new(CommandLog::default()),
        }
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.runner = self.runner.with_timeout(secs);
        self
    }

    pub fn with_runner(mut self, runner: ShellRunner) -> Self {
        self.runner = runner;
        self
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    pub fn validator(&self) -> &Validator {
        &self.validator
    }

    pub fn validator_mut(&mut self) -> &mut Validator {
        &mut self.validator
    }

    /// Whitelists the executable behind every install-phase command of
    /// `app`. Returns how many distinct tokens were derived.
    ///
    /// Only the leading token is whitelisted, so this never reaches past the
    /// critical gate or widens what the app's arguments may do.
    pub fn trust_app(&mut self, app: &AppDefinition) -> usize {
        let mut tokens: Vec<&str> = app.commands().filter_map(install_token).collect();
        tokens.sort_unstable();
        tokens.dedup();

        for token in &tokens {
            self.validator.add_to_whitelist(token);
        }
        info!("Trusted app '{}': whitelisted {:?}", app.name, tokens);
        tokens.len()
    }

    /// Applies [`trust_app`](Self::trust_app) to every definition marked trusted.
    pub fn trust_apps<'a>(&mut self, apps: impl IntoIterator<Item = &'a AppDefinition>) -> usize {
        apps.into_iter()
            .filter(|app| app.trusted)
            .map(|app| self.trust_app(app))
            .sum()
    }

    pub fn check(&self, command: &str, app_name: Option<&str>) -> ValidationOutcome {
        match app_name {
            Some(app) => self.validator.validate_for_app(command, app),
            None => self.validator.validate(command),
        }
    }

    pub async fn execute(&self, command: &str) -> Result<ExecutionReport, ExecutionError> {
        self.execute_with_cancel(command, None, pending::<()>()).await
    }

    pub async fn execute_for_app(
        &self,
        command: &str,
        app_name: &str,
    ) -> Result<ExecutionReport, ExecutionError> {
        self.execute_with_cancel(command, Some(app_name), pending::<()>()).await
    }

    /// Validates and runs `command`. When `cancel` resolves first the child
    /// and its process group are terminated.
    pub async fn execute_with_cancel<C>(
        &self,
        command: &str,
        app_name: Option<&str>,
        cancel: C,
    ) -> Result<ExecutionReport, ExecutionError>
    where
        C: Future<Output = ()>,
    {
        let command = command.trim();
        let outcome = self.check(command, app_name);

        match gate_command(&outcome, self.dry_run) {
            ExecutionDecision::Deny { reason } => {
                warn!("Denied '{}': {}", command, reason);
                self.record(CommandRecord::new(
                    command,
                    app_name,
                    CommandStatus::Denied { reason },
                ));
                Err(ExecutionError::Denied {
                    command: command.to_string(),
                    outcome,
                })
            }
            ExecutionDecision::Simulate => {
                info!("[dry-run] Would execute: {}", command);
                self.record(CommandRecord::new(command, app_name, CommandStatus::Simulated));
                Ok(ExecutionReport {
                    command: command.to_string(),
                    exit_code: None,
                    output: format!("[dry-run] would execute: {}", command),
                    dry_run: true,
                })
            }
            ExecutionDecision::Execute => {
                debug!("Executing: {}", command);
                match self.runner.run(command, cancel).await {
                    Ok(out) => {
                        let status = CommandStatus::Executed {
                            exit_code: out.exit_code,
                        };
                        self.record(
                            CommandRecord::new(command, app_name, status).with_output(&out.output),
                        );
                        Ok(ExecutionReport {
                            command: command.to_string(),
                            exit_code: out.exit_code,
                            output: out.output,
                            dry_run: false,
                        })
                    }
                    Err(e) => {
                        error!("Execution of '{}' failed: {}", command, e);
                        self.record(CommandRecord::new(
                            command,
                            app_name,
                            CommandStatus::Failed { error: e.to_string() },
                        ));
                        Err(e)
                    }
                }
            }
        }
    }

    /// Runs the install phases of `app` in order, stopping after the first
    /// command that fails to run or exits non-zero.
    pub async fn install_app(
        &self,
        app: &AppDefinition,
    ) -> Result<Vec<ExecutionReport>, ExecutionError> {
        let mut reports = Vec::new();
        for command in app.commands() {
            let report = self.execute_for_app(command, &app.name).await?;
            let ok = report.success();
            reports.push(report);
            if !ok {
                warn!("Install of '{}' stopped at failing command '{}'", app.name, command);
                break;
            }
        }
        Ok(reports)
    }

    /// Most recent commands handled by this executor, oldest first.
    pub fn history(&self, limit: usize) -> Vec<CommandRecord> {
        match self.log.lock() {
            Ok(log) => log.recent(limit),
            Err(_) => Vec::new(),
        }
    }

    fn record(&self, record: CommandRecord) {
        match self.log.lock() {
            Ok(mut log) => log.push(record),
            Err(e) => error!("Command log lock poisoned: {}", e),
        }
    }
}

/// Leading executable of an install command, looking through `sudo` and
/// its flags.
pub fn install_token(command: &str) -> Option<&str> {
    let mut tokens = command.split_whitespace();
    let first = tokens.next()?;
    if first != "sudo" {
        return Some(first);
    }
    tokens.find(|token| !token.starts_with('-'))
}
