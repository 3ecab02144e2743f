#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use jobpipe::config::{ConfigFile, RawConfigFile, RawToolConfig};
use jobpipe::exec::{ProcessInvocation, ProgressBand};
use jobpipe::job::{Job, JobRequest, MediaSource};
use jobpipe::pipeline::{Stage, StageAction, StageContext};
use jobpipe::types::{JobId, StoreBackend};

/// Builder for `ConfigFile` rooted in a (temporary) directory.
///
/// Staging, output and file-store directories all live under `root`, and
/// every tool gets a short timeout so hang scenarios finish quickly.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new(root: &Path) -> Self {
        let mut config = RawConfigFile::default();
        config.paths.staging_root = root.join("staging");
        config.paths.output_root = root.join("output");
        config.store.dir = root.join("status");
        for tool in [
            &mut config.tools.downloader,
            &mut config.tools.separator,
            &mut config.tools.ffmpeg,
            &mut config.tools.transcriber,
        ] {
            tool.timeout = Some("2s".to_string());
        }
        Self { config }
    }

    pub fn max_concurrent_jobs(mut self, n: usize) -> Self {
        self.config.dispatcher.max_concurrent_jobs = n;
        self
    }

    pub fn queue_capacity(mut self, n: usize) -> Self {
        self.config.dispatcher.queue_capacity = n;
        self
    }

    pub fn min_step(mut self, step: u8) -> Self {
        self.config.progress.min_step = step;
        self
    }

    pub fn store_backend(mut self, backend: StoreBackend) -> Self {
        self.config.store.backend = backend;
        self
    }

    pub fn retention(mut self, retention: &str) -> Self {
        self.config.store.retention = retention.to_string();
        self
    }

    pub fn keep_staging(mut self, keep: bool) -> Self {
        self.config.paths.keep_staging = keep;
        self
    }

    pub fn separator_model(mut self, model: &str) -> Self {
        self.config.tools.separator.model = Some(model.to_string());
        self
    }

    /// Change one tool section, e.g. `.tool("ffmpeg", |t| t.timeout = ...)`.
    pub fn tool(mut self, name: &str, edit: impl FnOnce(&mut RawToolConfig)) -> Self {
        let tool = match name {
            "downloader" => &mut self.config.tools.downloader,
            "separator" => &mut self.config.tools.separator,
            "ffmpeg" => &mut self.config.tools.ffmpeg,
            "transcriber" => &mut self.config.tools.transcriber,
            other => panic!("unknown tool section {other}"),
        };
        edit(tool);
        self
    }

    pub fn raw(self) -> RawConfigFile {
        self.config
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

pub fn download(url: &str) -> JobRequest {
    JobRequest::Download {
        url: url.to_string(),
    }
}

pub fn separate_url(url: &str) -> JobRequest {
    JobRequest::Separate {
        source: MediaSource::Url(url.to_string()),
    }
}

pub fn separate_file(path: impl Into<PathBuf>) -> JobRequest {
    JobRequest::Separate {
        source: MediaSource::File(path.into()),
    }
}

pub fn karaoke_url(url: &str) -> JobRequest {
    JobRequest::Karaoke {
        source: MediaSource::Url(url.to_string()),
    }
}

/// Mix request from `(stem, path, gain)` triples.
pub fn mix(tracks: &[(&str, &Path, f32)]) -> JobRequest {
    let mut paths = BTreeMap::new();
    let mut gains = BTreeMap::new();
    for (stem, path, gain) in tracks {
        paths.insert(stem.to_string(), path.to_path_buf());
        gains.insert(stem.to_string(), *gain);
    }
    JobRequest::Mix {
        tracks: paths,
        gains,
    }
}

pub fn transcribe(audio: impl Into<PathBuf>, stem: &str) -> JobRequest {
    JobRequest::Transcribe {
        audio: audio.into(),
        stem: stem.to_string(),
    }
}

/// A job with a freshly generated id.
pub fn job(request: JobRequest) -> Job {
    Job::new(JobId::generate(), request)
}

/// A stage running `fake-tool <name>` in `<staging>/<name>` with bar-style
/// progress parsing and the given timeout. No declared outputs.
pub fn process_stage(name: &'static str, band: ProgressBand, timeout: Duration) -> Stage {
    Stage::new(name, band, &format!("Running {name}"), move |ctx: &StageContext<'_>| {
        Ok(StageAction::Run(ProcessInvocation {
            stage: name.to_string(),
            program: "fake-tool".to_string(),
            args: vec![name.to_string()],
            cwd: ctx.staging_dir.join(name),
            timeout,
            progress: ProcessInvocation::bar_progress(),
        }))
    })
}
