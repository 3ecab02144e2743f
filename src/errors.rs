// src/errors.rs

//! Crate-wide error type and the job failure taxonomy.
//!
//! Stage failures are classified into exactly one of the `Process*` /
//! `OutputNotFound` variants before they are written to the status store.
//! [`JobpipeError::kind`] gives a stable tag that prefixes the client-facing
//! `error` field.

use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum JobpipeError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Rejected before a job exists; never written to the status store.
    #[error("invalid input: {0}")]
    InputInvalid(String),

    #[error("job queue is full ({capacity} jobs waiting)")]
    QueueFull { capacity: usize },

    #[error("dispatcher is shut down")]
    DispatcherClosed,

    /// The store refused to mutate a record that already reached a terminal
    /// status.
    #[error("job {job_id} is already terminal ({status})")]
    TerminalStatus { job_id: String, status: String },

    #[error("stage '{stage}': failed to launch '{program}': {reason}")]
    ProcessLaunchFailed {
        stage: String,
        program: String,
        reason: String,
    },

    #[error("stage '{stage}' exceeded {timeout:?}; last output: {diagnostic}")]
    ProcessTimeout {
        stage: String,
        timeout: Duration,
        diagnostic: String,
    },

    #[error("stage '{stage}' exited with code {exit_code}: {diagnostic}")]
    ProcessExitNonZero {
        stage: String,
        exit_code: i32,
        diagnostic: String,
    },

    #[error("stage '{stage}' reported success but output '{output}' was not found")]
    OutputNotFound { stage: String, output: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl JobpipeError {
    /// Stable, machine-friendly tag for this failure class.
    pub fn kind(&self) -> &'static str {
        match self {
            JobpipeError::ConfigError(_) => "config_error",
            JobpipeError::IoError(_) => "io_error",
            JobpipeError::TomlError(_) => "config_error",
            JobpipeError::JsonError(_) => "json_error",
            JobpipeError::InputInvalid(_) => "input_invalid",
            JobpipeError::QueueFull { .. } => "queue_full",
            JobpipeError::DispatcherClosed => "dispatcher_closed",
            JobpipeError::TerminalStatus { .. } => "terminal_status",
            JobpipeError::ProcessLaunchFailed { .. } => "process_launch_failed",
            JobpipeError::ProcessTimeout { .. } => "process_timeout",
            JobpipeError::ProcessExitNonZero { .. } => "process_exit_non_zero",
            JobpipeError::OutputNotFound { .. } => "output_not_found",
            JobpipeError::Other(_) => "internal_error",
        }
    }

    /// Message written to the `error` field of a terminal job status.
    pub fn client_message(&self) -> String {
        format!("{}: {}", self.kind(), self)
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, JobpipeError>;

/// Maximum number of trailing output lines kept in a diagnostic.
pub const DIAGNOSTIC_TAIL_LINES: usize = 20;

/// Maximum size in bytes of a diagnostic tail.
pub const DIAGNOSTIC_TAIL_BYTES: usize = 2000;

/// Keep only the last few non-empty lines of captured tool output, bounded in
/// size, so error payloads stay small.
pub fn diagnostic_tail(output: &str) -> String {
    let lines: Vec<&str> = output
        .split(['\n', '\r'])
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();

    let start = lines.len().saturating_sub(DIAGNOSTIC_TAIL_LINES);
    let tail = lines[start..].join("\n");

    if tail.len() <= DIAGNOSTIC_TAIL_BYTES {
        return tail;
    }

    // Cut on a char boundary, keeping the end of the output.
    let mut cut = tail.len() - DIAGNOSTIC_TAIL_BYTES;
    while !tail.is_char_boundary(cut) {
        cut += 1;
    }
    tail[cut..].to_string()
}
