//! rusty-setup - developer environment installer with a command security gate
//!
//! Every shell command that comes from user configuration or a third-party
//! app definition is validated before it runs:
//! - [`security`] decides whether a command may run (patterns, overrides, levels)
//! - [`shell`] spawns validated commands and records what happened
//! - [`apps`] models the install commands declared by app definitions
//!
//! # Example
//!
//! ```no_run
//! use rusty_setup::security::{ConfigStore, SecureExecutor, Validator};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ConfigStore::new(None).load()?;
//!     let executor = SecureExecutor::new(Validator::new(config)?).with_dry_run(true);
//!
//!     let report = executor.execute("apt-get install -y git").await?;
//!     println!("{}", report.output);
//!     Ok(())
//! }
//! ```

pub mod apps;
pub mod security;
pub mod shell;
pub mod utils;

pub use apps::AppDefinition;
pub use security::{
    ConfigStore, SecureExecutor, SecurityConfig, SecurityLevel, ValidationOutcome, Validator,
};
