// src/logging.rs

//! Logging setup for `jobpipe` using `tracing` + `tracing-subscriber`.
//!
//! Filter priority:
//! 1. `--log-level` CLI flag, applied to every target
//! 2. `JOBPIPE_LOG`, either a bare level (`"debug"`) or full `EnvFilter`
//!    directives (`"info,jobpipe::pipeline=trace"`)
//! 3. `info`
//!
//! Tool output is logged per line at `debug` (progress lines at `trace`),
//! so `JOBPIPE_LOG=debug` is enough to see what a failing tool printed.
//! Logs go to STDERR; stdout carries only status output.

use anyhow::{Context, Result};
use tracing_subscriber::{fmt, EnvFilter};

use crate::cli::LogLevel;

/// Environment variable consulted when `--log-level` is not given.
pub const LOG_ENV_VAR: &str = "JOBPIPE_LOG";

const DEFAULT_DIRECTIVES: &str = "info";

/// Initialise the global subscriber. Call once at startup.
pub fn init_logging(cli_level: Option<LogLevel>) -> Result<()> {
    let directives = match cli_level {
        Some(lvl) => level_name(lvl).to_string(),
        None => std::env::var(LOG_ENV_VAR)
            .ok()
            .and_then(|s| env_directives(&s))
            .unwrap_or_else(|| DEFAULT_DIRECTIVES.to_string()),
    };

    let filter = EnvFilter::try_new(&directives)
        .with_context(|| format!("invalid log filter '{directives}'"))?;

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install log subscriber: {e}"))?;

    Ok(())
}

fn level_name(lvl: LogLevel) -> &'static str {
    match lvl {
        LogLevel::Error => "error",
        LogLevel::Warn => "warn",
        LogLevel::Info => "info",
        LogLevel::Debug => "debug",
        LogLevel::Trace => "trace",
    }
}

/// Normalise the env var: known level names (including `warning`) map to
/// themselves, anything else non-empty is passed through as directives.
fn env_directives(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    let directives = match raw.to_lowercase().as_str() {
        "warning" => "warn".to_string(),
        "error" | "warn" | "info" | "debug" | "trace" => raw.to_lowercase(),
        _ => raw.to_string(),
    };
    Some(directives)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_levels_are_normalised() {
        assert_eq!(env_directives(" DEBUG ").as_deref(), Some("debug"));
        assert_eq!(env_directives("warning").as_deref(), Some("warn"));
        assert_eq!(env_directives("   "), None);
    }

    #[test]
    fn directives_pass_through() {
        let raw = "info,jobpipe::pipeline=trace";
        assert_eq!(env_directives(raw).as_deref(), Some(raw));
        assert!(EnvFilter::try_new(raw).is_ok());
    }
}
