// src/status/mod.rs

//! Job status records and the store they live in.
//!
//! The store is the only state shared between workers. Every mutation goes
//! through [`StatusStore::set`], which merges an update into the current
//! record atomically with respect to readers, and which refuses to touch a
//! record that already reached a terminal status.
//!
//! - [`memory`] keeps records in-process.
//! - [`file`] keeps one JSON file per job so other processes on the node can
//!   poll the same records.

pub mod file;
pub mod memory;

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::StoreConfig;
use crate::errors::{JobpipeError, Result};
use crate::types::{JobId, StoreBackend};

pub use file::FileStatusStore;
pub use memory::MemoryStatusStore;

/// Lifecycle state of a job as seen by polling clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum StatusState {
    Pending,
    /// Running the named stage.
    Running(String),
    Completed,
    Error,
    /// No record exists (never created, or expired). Only produced at the
    /// polling boundary, never stored.
    Unknown,
}

impl StatusState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, StatusState::Completed | StatusState::Error)
    }
}

impl fmt::Display for StatusState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusState::Pending => f.write_str("pending"),
            StatusState::Running(stage) => write!(f, "running:{stage}"),
            StatusState::Completed => f.write_str("completed"),
            StatusState::Error => f.write_str("error"),
            StatusState::Unknown => f.write_str("unknown"),
        }
    }
}

impl FromStr for StatusState {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(StatusState::Pending),
            "completed" => Ok(StatusState::Completed),
            "error" => Ok(StatusState::Error),
            "unknown" => Ok(StatusState::Unknown),
            other => match other.strip_prefix("running:") {
                Some(stage) if !stage.is_empty() => Ok(StatusState::Running(stage.to_string())),
                _ => Err(format!("invalid job status: {other}")),
            },
        }
    }
}

impl From<StatusState> for String {
    fn from(state: StatusState) -> Self {
        state.to_string()
    }
}

impl TryFrom<String> for StatusState {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, String> {
        value.parse()
    }
}

/// Result payload of a completed job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JobResult {
    /// Stem name -> output reference.
    Tracks { tracks: BTreeMap<String, String> },
    /// Single output reference.
    File { file: String },
}

/// The single mutable record per job, in its stable wire shape:
/// `{status, progress, message, result, error}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStatus {
    pub status: StatusState,
    pub progress: u8,
    pub message: String,
    pub result: Option<JobResult>,
    pub error: Option<String>,
}

impl JobStatus {
    /// Snapshot returned for ids the store does not know.
    pub fn unknown() -> Self {
        Self {
            status: StatusState::Unknown,
            progress: 0,
            message: String::new(),
            result: None,
            error: None,
        }
    }

    fn blank() -> Self {
        Self {
            status: StatusState::Pending,
            ..Self::unknown()
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Merge `update` into this record.
    ///
    /// Progress never moves backwards; a lower value in the update is
    /// ignored. Terminal records are rejected by the caller before merging.
    fn merge(&mut self, update: StatusUpdate) {
        if let Some(status) = update.status {
            self.status = status;
        }
        if let Some(progress) = update.progress {
            self.progress = self.progress.max(progress.min(100));
        }
        if let Some(message) = update.message {
            self.message = message;
        }
        if let Some(result) = update.result {
            self.result = Some(result);
        }
        if let Some(error) = update.error {
            self.error = Some(error);
        }
    }
}

/// Partial record: only the `Some` fields are written.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusUpdate {
    pub status: Option<StatusState>,
    pub progress: Option<u8>,
    pub message: Option<String>,
    pub result: Option<JobResult>,
    pub error: Option<String>,
}

impl StatusUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(mut self, status: StatusState) -> Self {
        self.status = Some(status);
        self
    }

    pub fn progress(mut self, progress: u8) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn result(mut self, result: JobResult) -> Self {
        self.result = Some(result);
        self
    }

    pub fn error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    /// Initial record written at dispatch.
    pub fn pending(message: impl Into<String>) -> Self {
        Self::new()
            .status(StatusState::Pending)
            .progress(0)
            .message(message)
    }

    /// Entering a stage.
    pub fn running(stage: &str, progress: u8, message: impl Into<String>) -> Self {
        Self::new()
            .status(StatusState::Running(stage.to_string()))
            .progress(progress)
            .message(message)
    }

    pub fn completed(result: JobResult, message: impl Into<String>) -> Self {
        Self::new()
            .status(StatusState::Completed)
            .progress(100)
            .message(message)
            .result(result)
    }

    pub fn failed(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new()
            .status(StatusState::Error)
            .message(message)
            .error(error)
    }

    /// True if this update would move a record into a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.status.as_ref().is_some_and(StatusState::is_terminal)
    }
}

/// Apply `update` on top of `current` (or a blank record), refusing to
/// mutate terminal records.
pub(crate) fn merge_record(
    job_id: &JobId,
    current: Option<JobStatus>,
    update: StatusUpdate,
) -> Result<JobStatus> {
    let mut record = current.unwrap_or_else(JobStatus::blank);
    if record.is_terminal() {
        return Err(JobpipeError::TerminalStatus {
            job_id: job_id.to_string(),
            status: record.status.to_string(),
        });
    }
    record.merge(update);
    Ok(record)
}

/// Boxed future returned by store operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Mapping from job id to current status record.
///
/// Implementations must make `set` atomic with respect to `get`: a reader
/// sees either the record before or after a merge, never a mix. Records
/// expire a fixed retention window after their last write; expired records
/// read as absent.
pub trait StatusStore: Send + Sync + fmt::Debug {
    /// Merge `update` into the record for `job_id`, creating it if absent.
    /// Returns the record after the merge.
    fn set<'a>(&'a self, job_id: &'a JobId, update: StatusUpdate) -> StoreFuture<'a, JobStatus>;

    /// Current snapshot, or `None` if absent or expired.
    fn get<'a>(&'a self, job_id: &'a JobId) -> StoreFuture<'a, Option<JobStatus>>;

    /// Drop expired records, returning how many were removed.
    fn purge_expired(&self) -> StoreFuture<'_, usize>;
}

/// Polling view: absent records surface as `unknown`, never as an error.
pub async fn poll(store: &dyn StatusStore, job_id: &JobId) -> Result<JobStatus> {
    Ok(store.get(job_id).await?.unwrap_or_else(JobStatus::unknown))
}

/// Build the store selected by `[store].backend`.
pub fn open_store(cfg: &StoreConfig) -> Result<Arc<dyn StatusStore>> {
    let store: Arc<dyn StatusStore> = match cfg.backend {
        StoreBackend::Memory => Arc::new(MemoryStatusStore::new(cfg.retention)),
        StoreBackend::File => Arc::new(FileStatusStore::open(&cfg.dir, cfg.retention)?),
    };
    info!(backend = ?cfg.backend, retention = ?cfg.retention, "status store opened");
    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_is_stored_as_a_plain_string() {
        let state = StatusState::Running("separate".to_string());
        let json = serde_json::to_string(&state).unwrap();
        assert_eq!(json, r#""running:separate""#);
        assert_eq!(serde_json::from_str::<StatusState>(&json).unwrap(), state);
        assert_eq!(
            serde_json::from_str::<StatusState>(r#""error""#).unwrap(),
            StatusState::Error
        );
    }

    #[test]
    fn malformed_state_strings_are_rejected() {
        assert!(StatusState::try_from("running:".to_string()).is_err());
        assert!(serde_json::from_str::<StatusState>(r#""paused""#).is_err());
    }
}
