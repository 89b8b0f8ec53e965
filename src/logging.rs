// src/logging.rs

//! Logging setup for `taskship` using `tracing` + `tracing-subscriber`.
//!
//! Priority for determining the log level:
//! 1. `--log-level` CLI flag (if provided)
//! 2. `TASKSHIP_LOG` environment variable (e.g. "info", "debug")
//! 3. default to `info`
//!
//! A level applies to `taskship` itself; other crates stay at `warn`.
//!
//! Logs are sent to STDERR so that status tables and dry-run plans on stdout
//! stay machine-readable.

use anyhow::Result;
use tracing::Level;
use tracing_subscriber::{EnvFilter, fmt};

use crate::cli::LogLevel;

/// Environment variable consulted when no `--log-level` is given.
///
/// Holds either a bare level (`debug`) or a full filter directive
/// (`taskship::remote=trace,info`).
pub const LOG_ENV_VAR: &str = "TASKSHIP_LOG";

/// Initialise global logging subscriber.
///
/// Safe to call once at startup.
pub fn init_logging(cli_level: Option<LogLevel>) -> Result<()> {
    let filter = match cli_level {
        Some(lvl) => EnvFilter::new(directive_for(level_from_log_level(lvl))),
        None => EnvFilter::new(match std::env::var(LOG_ENV_VAR) {
            Ok(s) => directive_from_env(&s),
            Err(_) => directive_for(Level::INFO),
        }),
    };

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_writer(std::io::stderr)
        .init();

    Ok(())
}

/// `taskship` logs at `level`; other crates are capped at `warn`.
fn directive_for(level: Level) -> String {
    let others = level.min(Level::WARN);
    format!(
        "{},taskship={}",
        others.as_str().to_ascii_lowercase(),
        level.as_str().to_ascii_lowercase()
    )
}

fn directive_from_env(value: &str) -> String {
    if let Some(level) = parse_level_str(value) {
        return directive_for(level);
    }
    let value = value.trim();
    if !value.is_empty() && EnvFilter::try_new(value).is_ok() {
        return value.to_string();
    }
    eprintln!("taskship: ignoring invalid {LOG_ENV_VAR}={value:?}");
    directive_for(Level::INFO)
}

fn level_from_log_level(lvl: LogLevel) -> Level {
    match lvl {
        LogLevel::Error => Level::ERROR,
        LogLevel::Warn => Level::WARN,
        LogLevel::Info => Level::INFO,
        LogLevel::Debug => Level::DEBUG,
        LogLevel::Trace => Level::TRACE,
    }
}

fn parse_level_str(s: &str) -> Option<Level> {
    match s.trim().to_lowercase().as_str() {
        "error" => Some(Level::ERROR),
        "warn" | "warning" => Some(Level::WARN),
        "info" => Some(Level::INFO),
        "debug" => Some(Level::DEBUG),
        "trace" => Some(Level::TRACE),
        _ => None,
    }
}
