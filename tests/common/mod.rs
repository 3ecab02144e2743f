#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;

use tempfile::TempDir;

use jobpipe::config::ConfigFile;
use jobpipe::engine::JobDispatcher;
use jobpipe::fs::RealFileSystem;
use jobpipe::pipeline::PipelineExecutor;
use jobpipe::status::StatusStore;
use jobpipe_test_utils::builders::ConfigFileBuilder;
use jobpipe_test_utils::fake_backend::FakeProcessBackend;
use jobpipe_test_utils::recording_store::RecordingStore;

pub type TestResult = Result<(), Box<dyn std::error::Error>>;

/// Temp directory + config + scripted backend + recording store.
pub struct Harness {
    pub dir: TempDir,
    pub config: Arc<ConfigFile>,
    pub store: Arc<RecordingStore>,
    pub backend: Arc<FakeProcessBackend>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(|b| b)
    }

    pub fn with_config(edit: impl FnOnce(ConfigFileBuilder) -> ConfigFileBuilder) -> Self {
        let dir = tempfile::tempdir().expect("create temp dir");
        let config = edit(ConfigFileBuilder::new(dir.path())).build();
        Self {
            dir,
            config: Arc::new(config),
            store: Arc::new(RecordingStore::new()),
            backend: FakeProcessBackend::new(),
        }
    }

    pub fn store(&self) -> Arc<dyn StatusStore> {
        self.store.clone()
    }

    pub fn executor(&self) -> PipelineExecutor {
        PipelineExecutor::new(
            self.store(),
            self.backend.clone(),
            Arc::new(RealFileSystem),
            Arc::clone(&self.config),
        )
    }

    pub fn dispatcher(&self) -> JobDispatcher {
        JobDispatcher::start(
            Arc::clone(&self.config),
            self.store(),
            self.backend.clone(),
            Arc::new(RealFileSystem),
        )
    }

    /// Create a real input file under the temp dir.
    pub fn input_file(&self, name: &str) -> PathBuf {
        let path = self.dir.path().join("inputs").join(name);
        std::fs::create_dir_all(path.parent().expect("input has a parent"))
            .expect("create inputs dir");
        std::fs::write(&path, b"input media").expect("write input file");
        path
    }

    pub fn staging_root(&self) -> PathBuf {
        self.config.paths.staging_root.clone()
    }

    pub fn output_root(&self) -> PathBuf {
        self.config.paths.output_root.clone()
    }
}

/// True if no value is lower than the one before it.
pub fn is_monotonic(values: &[u8]) -> bool {
    values.windows(2).all(|w| w[0] <= w[1])
}
