//! Command-line entry point for rusty-setup.
//!
//! Thin front end over the library: load the security policy, build a
//! validator, then check or run one command.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use rusty_setup::apps::load_app_definitions;
use rusty_setup::security::{
    ConfigStore, ExecutionError, SecureExecutor, SecurityConfig, SecurityLevel, Validator,
};
use rusty_setup::shell::DEFAULT_TIMEOUT_SECS;
use rusty_setup::utils;

#[derive(Parser, Debug)]
#[command(name = "rusty-setup")]
#[command(
    author,
    version,
    about = "Developer environment installer with command security validation",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Security policy file (defaults to the user, then system location)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Override the configured security level for this run
    #[arg(short, long, global = true, value_parser = parse_level)]
    level: Option<SecurityLevel>,

    /// Show info-level logs on stderr
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Validate a command without running it
    Check {
        /// Application whose overrides apply
        #[arg(long)]
        app: Option<String>,

        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },

    /// Validate and run a command
    Run {
        /// Application whose overrides apply
        #[arg(long)]
        app: Option<String>,

        /// Report what would run without running it
        #[arg(long)]
        dry_run: bool,

        /// Seconds before the command is terminated
        #[arg(long, default_value_t = DEFAULT_TIMEOUT_SECS)]
        timeout: u64,

        /// YAML app definitions whose trusted entries get auto-whitelisted
        #[arg(long)]
        trust: Option<PathBuf>,

        /// Print the execution report as JSON
        #[arg(long)]
        json: bool,

        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },

    /// Inspect or create the security policy file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the effective policy as YAML
    Show,

    /// Write the built-in default policy
    Init {
        /// Destination (defaults to the user policy location)
        path: Option<PathBuf>,

        /// Replace an existing file
        #[arg(long)]
        force: bool,
    },
}

fn parse_level(s: &str) -> Result<SecurityLevel, String> {
    s.parse::<SecurityLevel>().map_err(|e| e.to_string())
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    utils::logger::init_logging(cli.verbose);

    let store = ConfigStore::new(cli.config.clone());

    match cli.command {
        Commands::Check { app, command } => {
            let validator = build_validator(&store, cli.level)?;
            let command = command.join(" ");
            let outcome = match app.as_deref() {
                Some(app) => validator.validate_for_app(&command, app),
                None => validator.validate(&command),
            };

            if outcome.allowed {
                println!("allowed ({}): {}", validator.level(), outcome.describe());
                Ok(ExitCode::SUCCESS)
            } else {
                println!("denied ({}): {}", validator.level(), outcome.describe());
                Ok(ExitCode::FAILURE)
            }
        }

        Commands::Run {
            app,
            dry_run,
            timeout,
            trust,
            json,
            command,
        } => {
            let validator = build_validator(&store, cli.level)?;
            let mut executor = SecureExecutor::new(validator)
                .with_dry_run(dry_run)
                .with_timeout(timeout);

            if let Some(path) = trust {
                let apps = load_app_definitions(&path)?;
                executor.trust_apps(&apps);
            }

            let command = command.join(" ");
            let cancel = async {
                if tokio::signal::ctrl_c().await.is_err() {
                    std::future::pending::<()>().await;
                }
            };

            match executor.execute_with_cancel(&command, app.as_deref(), cancel).await {
                Ok(report) => {
                    if json {
                        println!("{}", serde_json::to_string_pretty(&report)?);
                    } else {
                        print!("{}", report.output);
                        if report.dry_run {
                            println!();
                        }
                    }
                    Ok(if report.success() { ExitCode::SUCCESS } else { ExitCode::FAILURE })
                }
                Err(e @ ExecutionError::Denied { .. }) => {
                    eprintln!("{}", e);
                    Ok(ExitCode::FAILURE)
                }
                Err(e) => Err(e).with_context(|| format!("Failed to execute '{}'", command)),
            }
        }

        Commands::Config { action: ConfigAction::Show } => {
            let config = store.load()?;
            match store.resolve() {
                Some(path) => println!("# source: {}", path.display()),
                None => println!("# source: built-in default"),
            }
            print!("{}", config.to_yaml()?);
            Ok(ExitCode::SUCCESS)
        }

        Commands::Config {
            action: ConfigAction::Init { path, force },
        } => {
            let path = path
                .or_else(|| store.save_target())
                .context("Cannot determine a location for the security policy")?;
            if path.exists() && !force {
                anyhow::bail!("{} already exists (use --force to replace it)", path.display());
            }
            ConfigStore::save(&SecurityConfig::default(), &path)?;
            println!("Wrote default security policy to {}", path.display());
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn build_validator(store: &ConfigStore, level: Option<SecurityLevel>) -> Result<Validator> {
    let config = store.load().context("Failed to load security policy")?;
    let mut validator = Validator::new(config)?;
    if let Some(level) = level {
        validator.set_level(level)?;
    }
    Ok(validator)
}
