// src/job/mod.rs

//! Jobs: what a client asks for, and the immutable record a dispatcher
//! creates from it.
//!
//! - [`JobRequest`] is the wire-level submission, tagged by `kind`.
//! - [`Job`] adds the allocated id and creation time; it never changes after
//!   creation.
//! - [`validate`] rejects bad requests (`InputInvalid`) before a job exists.

pub mod validate;

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{JobId, JobKind};

pub use validate::{validate_request, VALID_STEMS};

/// Where the media for a job comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaSource {
    /// Remote locator handed to the downloader.
    Url(String),
    /// Local file, copied into the job's staging directory.
    File(PathBuf),
}

impl MediaSource {
    pub fn locator(&self) -> String {
        match self {
            MediaSource::Url(url) => url.clone(),
            MediaSource::File(path) => path.display().to_string(),
        }
    }
}

/// A job submission.
///
/// ```json
/// {"kind": "separate", "source": {"url": "https://youtu.be/abc"}}
/// {"kind": "mix", "tracks": {"vocals": "/data/v.wav"}, "gains": {"vocals": 0.5}}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum JobRequest {
    /// Fetch audio from a URL.
    Download { url: String },

    /// Split a track into stems.
    Separate { source: MediaSource },

    /// Combine stem files with per-stem gains into one file.
    Mix {
        tracks: BTreeMap<String, PathBuf>,
        #[serde(default)]
        gains: BTreeMap<String, f32>,
    },

    /// Replace a video's soundtrack with its instrumental.
    Karaoke { source: MediaSource },

    /// Convert one stem into note events.
    Transcribe { audio: PathBuf, stem: String },
}

impl JobRequest {
    pub fn kind(&self) -> JobKind {
        match self {
            JobRequest::Download { .. } => JobKind::Download,
            JobRequest::Separate { .. } => JobKind::Separate,
            JobRequest::Mix { .. } => JobKind::Mix,
            JobRequest::Karaoke { .. } => JobKind::Karaoke,
            JobRequest::Transcribe { .. } => JobKind::Transcribe,
        }
    }

    /// Human-readable description of the external resource this request
    /// operates on.
    pub fn locator(&self) -> String {
        match self {
            JobRequest::Download { url } => url.clone(),
            JobRequest::Separate { source } | JobRequest::Karaoke { source } => source.locator(),
            JobRequest::Mix { tracks, .. } => tracks
                .iter()
                .map(|(stem, path)| format!("{stem}={}", path.display()))
                .collect::<Vec<_>>()
                .join(","),
            JobRequest::Transcribe { audio, stem } => format!("{stem}={}", audio.display()),
        }
    }

    /// Base name a single-file result is published under, when the request
    /// decides it. `None` keeps the name the tool gave the file.
    pub fn result_name(&self) -> Option<&str> {
        match self {
            JobRequest::Transcribe { stem, .. } => Some(stem.as_str()),
            _ => None,
        }
    }
}

/// An accepted job. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub request: JobRequest,
    pub created_at: DateTime<Utc>,
}

impl Job {
    pub fn new(id: JobId, request: JobRequest) -> Self {
        Self {
            id,
            request,
            created_at: Utc::now(),
        }
    }

    pub fn kind(&self) -> JobKind {
        self.request.kind()
    }

    /// Fingerprint of (kind, locator). Two jobs over the same external
    /// resource share it even though their ids differ.
    pub fn resource_key(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.kind().as_str().as_bytes());
        hasher.update(b"\0");
        hasher.update(self.request.locator().as_bytes());
        hasher.finalize().to_hex().as_str()[..16].to_string()
    }
}
