// src/exec/mod.rs

//! Process execution layer.
//!
//! This module is responsible for actually running the external tools a
//! stage needs, using `tokio::process::Command`, and for turning their
//! output into progress.
//!
//! - [`invocation`] describes one command to run and what it left behind.
//! - [`runner`] owns the real chunked-read process runner.
//! - [`progress`] holds the progress parsing strategies, band mapping and
//!   write throttling.
//! - [`backend`] provides the `ProcessBackend` trait so tests can replace
//!   the runner with a scripted implementation.

pub mod backend;
pub mod invocation;
pub mod progress;
pub mod runner;

pub use backend::{ExecFuture, LineCallback, ProcessBackend};
pub use invocation::{ProcessInvocation, ProcessOutput};
pub use progress::{
    map_stage_progress, BarProgressParser, NoProgress, ProgressBand, ProgressParser,
    ProgressStrategy, ProgressThrottle, RegexProgressParser, StageProgress,
};
pub use runner::ProcessRunner;
