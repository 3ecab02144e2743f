#![allow(dead_code)]

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use jobpipe::errors::{diagnostic_tail, JobpipeError};
use jobpipe::exec::{ExecFuture, LineCallback, ProcessBackend, ProcessInvocation, ProcessOutput};

/// How a scripted process ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Ending {
    /// Exit with the given code after emitting all lines.
    #[default]
    Exit,
    /// Never exit; the backend reports `ProcessTimeout` once the
    /// invocation's timeout has elapsed.
    Hang,
    /// The program cannot be started.
    LaunchFailure,
    /// The backend panics after emitting all lines.
    Panic,
}

/// Canned behaviour for every invocation of one stage.
#[derive(Debug, Clone, Default)]
pub struct Script {
    pub lines: Vec<String>,
    pub exit_code: i32,
    /// Files created relative to the invocation's working directory before
    /// the process exits.
    pub files: Vec<PathBuf>,
    pub ending: Ending,
    /// Pause between emitted lines (and before exiting).
    pub line_delay: Duration,
}

impl Script {
    pub fn ok() -> Self {
        Self::default()
    }

    pub fn line(mut self, line: impl Into<String>) -> Self {
        self.lines.push(line.into());
        self
    }

    pub fn lines<I, S>(mut self, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.lines.extend(lines.into_iter().map(Into::into));
        self
    }

    pub fn creates(mut self, path: impl Into<PathBuf>) -> Self {
        self.files.push(path.into());
        self
    }

    pub fn exit_code(mut self, code: i32) -> Self {
        self.exit_code = code;
        self
    }

    pub fn hang(mut self) -> Self {
        self.ending = Ending::Hang;
        self
    }

    pub fn launch_failure(mut self) -> Self {
        self.ending = Ending::LaunchFailure;
        self
    }

    pub fn panic(mut self) -> Self {
        self.ending = Ending::Panic;
        self
    }

    pub fn line_delay(mut self, delay: Duration) -> Self {
        self.line_delay = delay;
        self
    }
}

/// `ProcessBackend` that never launches anything.
///
/// Each stage name maps to a [`Script`]; unscripted stages exit 0 without
/// output or files. Every invocation is recorded, and the number of
/// concurrently running invocations is tracked so tests can assert on pool
/// bounds.
#[derive(Debug, Default)]
pub struct FakeProcessBackend {
    scripts: Mutex<HashMap<String, Script>>,
    invocations: Mutex<Vec<ProcessInvocation>>,
    running: AtomicUsize,
    peak: AtomicUsize,
}

impl FakeProcessBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn script(&self, stage: &str, script: Script) {
        self.scripts
            .lock()
            .unwrap()
            .insert(stage.to_string(), script);
    }

    pub fn invocations(&self) -> Vec<ProcessInvocation> {
        self.invocations.lock().unwrap().clone()
    }

    pub fn invocations_for(&self, stage: &str) -> Vec<ProcessInvocation> {
        self.invocations()
            .into_iter()
            .filter(|inv| inv.stage == stage)
            .collect()
    }

    /// Highest number of invocations that were running at the same time.
    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    fn enter(&self) {
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    fn leave(&self) {
        self.running.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ProcessBackend for FakeProcessBackend {
    fn run<'a>(
        &'a self,
        invocation: ProcessInvocation,
        mut on_line: LineCallback<'a>,
    ) -> ExecFuture<'a, ProcessOutput> {
        Box::pin(async move {
            self.invocations.lock().unwrap().push(invocation.clone());
            let script = self
                .scripts
                .lock()
                .unwrap()
                .get(&invocation.stage)
                .cloned()
                .unwrap_or_default();

            if script.ending == Ending::LaunchFailure {
                return Err(JobpipeError::ProcessLaunchFailed {
                    stage: invocation.stage.clone(),
                    program: invocation.program.clone(),
                    reason: "No such file or directory (os error 2)".to_string(),
                });
            }

            self.enter();
            let mut output = String::new();
            for line in &script.lines {
                if !script.line_delay.is_zero() {
                    tokio::time::sleep(script.line_delay).await;
                }
                on_line(line.as_str());
                output.push_str(line);
                output.push('\n');
            }

            if script.ending == Ending::Panic {
                self.leave();
                panic!("scripted panic in stage '{}'", invocation.stage);
            }

            if script.ending == Ending::Hang {
                tokio::time::sleep(invocation.timeout).await;
                self.leave();
                return Err(JobpipeError::ProcessTimeout {
                    stage: invocation.stage.clone(),
                    timeout: invocation.timeout,
                    diagnostic: diagnostic_tail(&output),
                });
            }

            for file in &script.files {
                let path = invocation.cwd.join(file);
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                std::fs::write(&path, b"fake media")?;
            }
            if !script.line_delay.is_zero() {
                tokio::time::sleep(script.line_delay).await;
            }
            self.leave();

            Ok(ProcessOutput {
                exit_code: script.exit_code,
                output,
            })
        })
    }
}
