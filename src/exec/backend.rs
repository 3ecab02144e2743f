// src/exec/backend.rs

//! Pluggable process backend abstraction.
//!
//! The pipeline executor talks to a `ProcessBackend` instead of spawning
//! processes itself. Production code uses [`ProcessRunner`]; tests provide a
//! scripted backend that emits canned output, creates output files and
//! simulates hangs without launching anything.
//!
//! [`ProcessRunner`]: crate::exec::ProcessRunner

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use crate::errors::Result;
use crate::exec::invocation::{ProcessInvocation, ProcessOutput};

/// Boxed future returned by backends.
pub type ExecFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Per-line output callback. Invoked synchronously in arrival order; must
/// not block.
pub type LineCallback<'a> = Box<dyn FnMut(&str) + Send + 'a>;

/// Trait abstracting how one stage process is executed.
pub trait ProcessBackend: Send + Sync + fmt::Debug {
    /// Run `invocation` to completion.
    ///
    /// Implementations must:
    /// - return `ProcessLaunchFailed` if the program cannot be started
    /// - return `ProcessTimeout` (with the output captured so far) once
    ///   `invocation.timeout` elapses, after terminating the process
    /// - return `Ok` with the exit code otherwise, including non-zero exits
    fn run<'a>(
        &'a self,
        invocation: ProcessInvocation,
        on_line: LineCallback<'a>,
    ) -> ExecFuture<'a, ProcessOutput>;
}
