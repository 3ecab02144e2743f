use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Kind of job; selects the stage list a job runs through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    Download,
    Separate,
    Mix,
    Karaoke,
    Transcribe,
}

impl JobKind {
    pub const ALL: [JobKind; 5] = [
        JobKind::Download,
        JobKind::Separate,
        JobKind::Mix,
        JobKind::Karaoke,
        JobKind::Transcribe,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::Download => "download",
            JobKind::Separate => "separate",
            JobKind::Mix => "mix",
            JobKind::Karaoke => "karaoke",
            JobKind::Transcribe => "transcribe",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "download" => Ok(JobKind::Download),
            "separate" => Ok(JobKind::Separate),
            "mix" => Ok(JobKind::Mix),
            "karaoke" => Ok(JobKind::Karaoke),
            "transcribe" => Ok(JobKind::Transcribe),
            other => Err(format!(
                "invalid job kind: {other} (expected download, separate, mix, karaoke or transcribe)"
            )),
        }
    }
}

/// Opaque short job identifier handed to clients.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    /// Length of generated identifiers (hex characters).
    pub const LEN: usize = 12;

    /// Allocate a fresh random identifier.
    pub fn generate() -> Self {
        let simple = uuid::Uuid::new_v4().simple().to_string();
        JobId(simple[..Self::LEN].to_string())
    }

    /// Parse an identifier coming from a client.
    ///
    /// Only `[A-Za-z0-9_-]` is accepted since ids double as file and
    /// directory names for staging, outputs and the file-backed store.
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        let valid = !s.is_empty()
            && s.len() <= 64
            && s
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        valid.then(|| JobId(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where job status records live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// In-process map; lost on restart, visible to this process only.
    Memory,
    /// One JSON file per job in a shared directory, readable by other
    /// processes on the same node (e.g. a separate `jobpipe status`).
    File,
}

impl Default for StoreBackend {
    fn default() -> Self {
        StoreBackend::Memory
    }
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "memory" => Ok(StoreBackend::Memory),
            "file" => Ok(StoreBackend::File),
            other => Err(format!(
                "invalid store backend: {other} (expected \"memory\" or \"file\")"
            )),
        }
    }
}
