// src/pipeline/stage.rs

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::ConfigFile;
use crate::errors::{JobpipeError, Result};
use crate::exec::{ProcessInvocation, ProgressBand};
use crate::job::Job;

/// Files produced so far in a job, keyed by output name (`"source"`,
/// `"vocals"`, `"mix"`, ...).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StageOutputs {
    files: BTreeMap<String, PathBuf>,
}

impl StageOutputs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, path: PathBuf) {
        self.files.insert(name.into(), path);
    }

    pub fn get(&self, name: &str) -> Option<&Path> {
        self.files.get(name).map(PathBuf::as_path)
    }

    /// Like [`get`](Self::get), for outputs a later stage cannot do without.
    pub fn require(&self, name: &str) -> Result<&Path> {
        self.get(name).ok_or_else(|| {
            JobpipeError::Other(anyhow::anyhow!(
                "output '{name}' of an earlier stage is not available"
            ))
        })
    }
}

/// Everything a stage's input resolver may look at.
#[derive(Debug, Clone, Copy)]
pub struct StageContext<'a> {
    pub job: &'a Job,
    /// Exclusive staging directory of this job.
    pub staging_dir: &'a Path,
    pub config: &'a ConfigFile,
    /// Outputs located after earlier stages.
    pub outputs: &'a StageOutputs,
}

/// What a stage does once its inputs are resolved.
#[derive(Debug, Clone)]
pub enum StageAction {
    /// Run an external process.
    Run(ProcessInvocation),
    /// Copy a local file into the staging directory (no process).
    CopyFile { from: PathBuf, to: PathBuf },
}

/// Builds the stage action from the job and prior outputs.
pub type InputResolver = Arc<dyn Fn(&StageContext<'_>) -> Result<StageAction> + Send + Sync>;

/// A file a stage is expected to leave in the staging directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputSpec {
    /// Name later stages and the result payload refer to.
    pub name: String,
    /// Glob relative to the staging directory, e.g.
    /// `"separated/htdemucs_6s/*/vocals.wav"`.
    pub pattern: String,
    /// File-name glob used for the fallback recursive search.
    pub file_name: String,
    /// A missing required output fails the stage with `OutputNotFound`.
    pub required: bool,
}

impl OutputSpec {
    pub fn required(name: &str, pattern: &str, file_name: &str) -> Self {
        Self {
            name: name.to_string(),
            pattern: pattern.to_string(),
            file_name: file_name.to_string(),
            required: true,
        }
    }

    pub fn optional(name: &str, pattern: &str, file_name: &str) -> Self {
        Self {
            required: false,
            ..Self::required(name, pattern, file_name)
        }
    }
}

/// One step of a job's pipeline.
#[derive(Clone)]
pub struct Stage {
    pub name: String,
    /// Status message written when the stage starts.
    pub start_message: String,
    pub band: ProgressBand,
    pub resolver: InputResolver,
    pub outputs: Vec<OutputSpec>,
    /// Tool label shown by dry runs (`"ffmpeg"`, `"separator"`, `"copy"`).
    pub tool: String,
}

impl Stage {
    pub fn new<F>(name: &str, band: ProgressBand, start_message: &str, resolver: F) -> Self
    where
        F: Fn(&StageContext<'_>) -> Result<StageAction> + Send + Sync + 'static,
    {
        Self {
            name: name.to_string(),
            start_message: start_message.to_string(),
            band,
            resolver: Arc::new(resolver),
            outputs: Vec::new(),
            tool: String::new(),
        }
    }

    pub fn output(mut self, spec: OutputSpec) -> Self {
        self.outputs.push(spec);
        self
    }

    pub fn tool(mut self, tool: &str) -> Self {
        self.tool = tool.to_string();
        self
    }

    pub fn resolve(&self, ctx: &StageContext<'_>) -> Result<StageAction> {
        (self.resolver)(ctx)
    }
}

impl fmt::Debug for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stage")
            .field("name", &self.name)
            .field("band", &self.band)
            .field("tool", &self.tool)
            .field("outputs", &self.outputs)
            .finish_non_exhaustive()
    }
}

/// How the result payload of a completed job is assembled from outputs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResultSpec {
    /// `{"tracks": {track: ref}}` from `(track name, output name)` pairs.
    /// Outputs that were not produced are left out.
    Tracks(Vec<(String, String)>),
    /// `{"file": ref}` from one output.
    File(String),
}

/// The ordered stage list of one job kind plus its result shape.
#[derive(Debug, Clone)]
pub struct Pipeline {
    pub stages: Vec<Stage>,
    pub result: ResultSpec,
}

impl Pipeline {
    pub fn new(stages: Vec<Stage>, result: ResultSpec) -> Self {
        Self { stages, result }
    }

    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name.as_str()).collect()
    }
}
