// src/config/model.rs

use std::path::PathBuf;
use std::time::Duration;

use regex::Regex;
use serde::Deserialize;

use crate::types::StoreBackend;

/// Top-level configuration as read from a TOML file.
///
/// ```toml
/// [dispatcher]
/// max_concurrent_jobs = 2
/// queue_capacity = 64
///
/// [store]
/// backend = "file"
/// dir = ".jobpipe/status"
/// retention = "1h"
///
/// [tools.separator]
/// program = "python3"
/// args = ["-u", "-m", "demucs"]
/// timeout = "600s"
/// model = "htdemucs_6s"
/// ```
///
/// All sections are optional and have reasonable defaults.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawConfigFile {
    #[serde(default)]
    pub dispatcher: DispatcherSection,

    #[serde(default)]
    pub store: RawStoreSection,

    #[serde(default)]
    pub paths: PathsSection,

    #[serde(default)]
    pub progress: ProgressSection,

    #[serde(default)]
    pub sources: SourcesSection,

    #[serde(default)]
    pub tools: RawToolsSection,
}

/// `[dispatcher]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct DispatcherSection {
    /// Number of pipelines allowed to run at the same time.
    #[serde(default = "default_max_concurrent_jobs")]
    pub max_concurrent_jobs: usize,

    /// Submissions waiting for a free slot before `submit` starts rejecting.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

fn default_max_concurrent_jobs() -> usize {
    2
}

fn default_queue_capacity() -> usize {
    64
}

impl Default for DispatcherSection {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: default_max_concurrent_jobs(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

/// `[store]` section, before duration strings are parsed.
#[derive(Debug, Clone, Deserialize)]
pub struct RawStoreSection {
    #[serde(default)]
    pub backend: StoreBackend,

    /// Directory used by the file backend.
    #[serde(default = "default_store_dir")]
    pub dir: PathBuf,

    /// How long a record survives after its last write.
    #[serde(default = "default_retention")]
    pub retention: String,

    #[serde(default = "default_sweep_interval")]
    pub sweep_interval: String,
}

fn default_store_dir() -> PathBuf {
    PathBuf::from(".jobpipe/status")
}

fn default_retention() -> String {
    "1h".to_string()
}

fn default_sweep_interval() -> String {
    "60s".to_string()
}

impl Default for RawStoreSection {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            dir: default_store_dir(),
            retention: default_retention(),
            sweep_interval: default_sweep_interval(),
        }
    }
}

/// `[paths]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct PathsSection {
    /// Parent of the per-job staging directories.
    #[serde(default = "default_staging_root")]
    pub staging_root: PathBuf,

    /// Parent of the per-job published output directories.
    #[serde(default = "default_output_root")]
    pub output_root: PathBuf,

    /// Prefix of output references in result payloads.
    #[serde(default = "default_public_prefix")]
    pub public_prefix: String,

    /// Leave staging directories behind after a job ends (debugging aid).
    #[serde(default)]
    pub keep_staging: bool,
}

fn default_staging_root() -> PathBuf {
    PathBuf::from(".jobpipe/staging")
}

fn default_output_root() -> PathBuf {
    PathBuf::from(".jobpipe/output")
}

fn default_public_prefix() -> String {
    "/files/jobs".to_string()
}

impl Default for PathsSection {
    fn default() -> Self {
        Self {
            staging_root: default_staging_root(),
            output_root: default_output_root(),
            public_prefix: default_public_prefix(),
            keep_staging: false,
        }
    }
}

/// `[progress]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ProgressSection {
    /// Minimum increase in overall percentage points between two progress
    /// writes for the same job.
    #[serde(default = "default_min_step")]
    pub min_step: u8,
}

fn default_min_step() -> u8 {
    1
}

impl Default for ProgressSection {
    fn default() -> Self {
        Self {
            min_step: default_min_step(),
        }
    }
}

/// `[sources]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct SourcesSection {
    /// A URL source is accepted if it contains any of these substrings.
    #[serde(default = "default_allowed_url_patterns")]
    pub allowed_url_patterns: Vec<String>,
}

fn default_allowed_url_patterns() -> Vec<String> {
    [
        "youtube.com/watch",
        "youtu.be/",
        "youtube.com/shorts/",
        "youtube.com/embed/",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

impl Default for SourcesSection {
    fn default() -> Self {
        Self {
            allowed_url_patterns: default_allowed_url_patterns(),
        }
    }
}

/// `[tools]` section. Every field is optional; missing values fall back to
/// the built-in defaults for that tool during validation.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawToolsSection {
    #[serde(default)]
    pub downloader: RawToolConfig,

    #[serde(default)]
    pub separator: RawToolConfig,

    #[serde(default)]
    pub ffmpeg: RawToolConfig,

    #[serde(default)]
    pub transcriber: RawToolConfig,
}

/// `[tools.<name>]` section.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawToolConfig {
    /// Executable to launch.
    #[serde(default)]
    pub program: Option<String>,

    /// Arguments placed before the stage-specific ones.
    #[serde(default)]
    pub args: Option<Vec<String>>,

    /// Hard wall-clock limit, e.g. `"120s"`.
    #[serde(default)]
    pub timeout: Option<String>,

    /// Regex with one capture group holding the percentage. Replaces the
    /// built-in progress strategy for this tool.
    #[serde(default)]
    pub progress_regex: Option<String>,

    /// Separation model name (separator only).
    #[serde(default)]
    pub model: Option<String>,

    /// Compute device (separator only).
    #[serde(default)]
    pub device: Option<String>,
}

/// Validated configuration.
///
/// Only obtainable through `ConfigFile::try_from(RawConfigFile)` (see
/// `validate.rs`), so durations and regexes are always parsed.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub dispatcher: DispatcherSection,
    pub store: StoreConfig,
    pub paths: PathsSection,
    pub progress: ProgressSection,
    pub sources: SourcesSection,
    pub tools: ToolSet,
}

#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub dir: PathBuf,
    pub retention: Duration,
    pub sweep_interval: Duration,
}

#[derive(Debug, Clone)]
pub struct ToolSet {
    pub downloader: ToolConfig,
    pub separator: SeparatorConfig,
    pub ffmpeg: ToolConfig,
    pub transcriber: ToolConfig,
}

#[derive(Debug, Clone)]
pub struct ToolConfig {
    pub program: String,
    pub args: Vec<String>,
    pub timeout: Duration,
    pub progress_regex: Option<Regex>,
}

#[derive(Debug, Clone)]
pub struct SeparatorConfig {
    pub tool: ToolConfig,
    pub model: String,
    pub device: Option<String>,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(
        dispatcher: DispatcherSection,
        store: StoreConfig,
        paths: PathsSection,
        progress: ProgressSection,
        sources: SourcesSection,
        tools: ToolSet,
    ) -> Self {
        Self {
            dispatcher,
            store,
            paths,
            progress,
            sources,
            tools,
        }
    }

    /// Built-in defaults, validated like any other config.
    pub fn defaults() -> crate::errors::Result<Self> {
        ConfigFile::try_from(RawConfigFile::default())
    }
}
