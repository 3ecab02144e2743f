// src/job/validate.rs

use std::path::Path;

use crate::config::SourcesSection;
use crate::errors::{JobpipeError, Result};
use crate::fs::FileSystem;
use crate::job::{JobRequest, MediaSource};

/// Stem names a client may refer to.
pub const VALID_STEMS: [&str; 8] = [
    "vocals",
    "drums",
    "bass",
    "guitar",
    "piano",
    "other",
    "accompaniment",
    "original",
];

/// Upper bound for a per-stem mix gain (linear).
pub const MAX_GAIN: f32 = 4.0;

/// Check a request before any job id or status record exists for it.
pub fn validate_request(
    request: &JobRequest,
    sources: &SourcesSection,
    fs: &dyn FileSystem,
) -> Result<()> {
    match request {
        JobRequest::Download { url } => validate_url(url, sources),
        JobRequest::Separate { source } | JobRequest::Karaoke { source } => {
            validate_source(source, sources, fs)
        }
        JobRequest::Mix { tracks, gains } => {
            if tracks.is_empty() {
                return invalid("mix requires at least one track".to_string());
            }
            for (stem, path) in tracks {
                validate_stem(stem)?;
                validate_file(path, fs)?;
            }
            for (stem, gain) in gains {
                if !tracks.contains_key(stem) {
                    return invalid(format!("gain given for '{stem}' which is not a mix track"));
                }
                if !gain.is_finite() || *gain < 0.0 || *gain > MAX_GAIN {
                    return invalid(format!(
                        "gain for '{stem}' must be within 0.0..={MAX_GAIN} (got {gain})"
                    ));
                }
            }
            Ok(())
        }
        JobRequest::Transcribe { audio, stem } => {
            validate_stem(stem)?;
            validate_file(audio, fs)
        }
    }
}

fn validate_source(source: &MediaSource, sources: &SourcesSection, fs: &dyn FileSystem) -> Result<()> {
    match source {
        MediaSource::Url(url) => validate_url(url, sources),
        MediaSource::File(path) => validate_file(path, fs),
    }
}

fn validate_url(url: &str, sources: &SourcesSection) -> Result<()> {
    let url = url.trim();
    if !(url.starts_with("https://") || url.starts_with("http://")) {
        return invalid(format!("'{url}' is not an http(s) URL"));
    }
    if !sources
        .allowed_url_patterns
        .iter()
        .any(|pattern| url.contains(pattern.as_str()))
    {
        return invalid(format!("'{url}' does not match any supported source"));
    }
    Ok(())
}

fn validate_file(path: &Path, fs: &dyn FileSystem) -> Result<()> {
    if !fs.is_file(path) {
        return invalid(format!("file not found: {}", path.display()));
    }
    Ok(())
}

fn validate_stem(stem: &str) -> Result<()> {
    if !VALID_STEMS.contains(&stem) {
        return invalid(format!(
            "unsupported stem name '{stem}' (expected one of {})",
            VALID_STEMS.join(", ")
        ));
    }
    Ok(())
}

fn invalid(msg: String) -> Result<()> {
    Err(JobpipeError::InputInvalid(msg))
}
