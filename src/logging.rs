// src/logging.rs

//! Logging setup using `tracing` + `tracing-subscriber`.
//!
//! Priority for determining the log level:
//! 1. explicit level (e.g. `[config].log_level`)
//! 2. `COMPOSITE_LOG` environment variable (e.g. "info", "debug")
//! 3. default to `info`
//!
//! Logs are sent to STDERR.

use anyhow::{Result, anyhow};
use tracing_subscriber::fmt;

use crate::types::LogLevel;

/// Environment variable consulted when no explicit level is given.
pub const LOG_ENV_VAR: &str = "COMPOSITE_LOG";

/// Initialise the global logging subscriber.
///
/// Returns an error if a global subscriber is already installed.
pub fn init_logging(level: Option<LogLevel>) -> Result<()> {
    let level = resolve_level(level, std::env::var(LOG_ENV_VAR).ok().as_deref());

    fmt()
        .with_max_level(level)
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow!("failed to install tracing subscriber: {e}"))
}

/// Pick the effective level from an explicit level and the raw value of
/// [`LOG_ENV_VAR`]. Unparseable environment values are ignored.
pub fn resolve_level(explicit: Option<LogLevel>, env_value: Option<&str>) -> tracing::Level {
    match explicit {
        Some(lvl) => level_from_log_level(lvl),
        None => env_value
            .and_then(|s| s.parse::<LogLevel>().ok())
            .map(level_from_log_level)
            .unwrap_or(tracing::Level::INFO),
    }
}

fn level_from_log_level(lvl: LogLevel) -> tracing::Level {
    match lvl {
        LogLevel::Error => tracing::Level::ERROR,
        LogLevel::Warn => tracing::Level::WARN,
        LogLevel::Info => tracing::Level::INFO,
        LogLevel::Debug => tracing::Level::DEBUG,
        LogLevel::Trace => tracing::Level::TRACE,
    }
}
