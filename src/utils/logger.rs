//! Logging initialization and configuration.
//!
//! Two sinks:
//! - a per-run log file under the user state directory (`RUST_LOG`
//!   controls its level, defaulting to `info`),
//! - stderr, showing warnings (audit events included) or, with `verbose`,
//!   everything at `info` and above.
//!
//! Log files are named by start time, e.g.
//! `~/.local/state/rusty-setup/logs/rusty-setup.2024-12-06-14-30-25.log`.

use std::fs;
use std::path::PathBuf;

use chrono::Local;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Directory receiving log files.
pub fn log_dir() -> PathBuf {
    dirs::state_dir()
        .or_else(dirs::data_local_dir)
        .map(|dir| dir.join("rusty-setup").join("logs"))
        .unwrap_or_else(|| PathBuf::from("logs"))
}

/// Initialize the logging system. Call once, before anything logs.
pub fn init_logging(verbose: bool) {
    let log_dir = log_dir();

    let log_file = match fs::create_dir_all(&log_dir) {
        Ok(()) => {
            let timestamp = Local::now().format("%Y-%m-%d-%H-%M-%S");
            let log_path = log_dir.join(format!("rusty-setup.{}.log", timestamp));
            match fs::File::create(&log_path) {
                Ok(file) => Some((file, log_path)),
                Err(e) => {
                    eprintln!("Warning: Failed to create log file: {}", e);
                    None
                }
            }
        }
        Err(e) => {
            eprintln!("Warning: Failed to create logs directory: {}", e);
            None
        }
    };

    let mut log_path = None;
    let file_layer = log_file.map(|(file, path)| {
        log_path = Some(path);
        let (non_blocking, guard) = tracing_appender::non_blocking(file);
        // Keep the writer alive for the whole process.
        std::mem::forget(guard);

        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        fmt::layer()
            .with_writer(non_blocking)
            .with_ansi(false)
            .with_target(true)
            .with_thread_ids(true)
            .with_line_number(true)
            .with_filter(env_filter)
    });

    let stderr_level = if verbose { LevelFilter::INFO } else { LevelFilter::WARN };
    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .with_filter(stderr_level);

    tracing_subscriber::registry()
        .with(file_layer)
        .with(stderr_layer)
        .init();

    if let Some(path) = log_path {
        tracing::debug!("Logging initialized - writing to {}", path.display());
    }
}
