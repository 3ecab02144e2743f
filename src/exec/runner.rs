// src/exec/runner.rs

//! Real process runner built on `tokio::process`.

use std::collections::VecDeque;
use std::process::Stdio;

use anyhow::Context;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::errors::{diagnostic_tail, JobpipeError, Result};
use crate::exec::backend::{ExecFuture, LineCallback, ProcessBackend};
use crate::exec::invocation::{ProcessInvocation, ProcessOutput};

/// Bytes read from a pipe per wakeup.
pub const CHUNK_SIZE: usize = 100;

/// Chunks of output retained for diagnostics.
pub const MAX_CAPTURED_CHUNKS: usize = 500;

/// Launches external commands and streams their output line by line.
///
/// stdout and stderr are read concurrently in fixed-size chunks, so
/// progress bars redrawn with `\r` are seen as they happen instead of when a
/// newline finally arrives.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    chunk_size: usize,
    max_chunks: usize,
}

impl Default for ProcessRunner {
    fn default() -> Self {
        Self {
            chunk_size: CHUNK_SIZE,
            max_chunks: MAX_CAPTURED_CHUNKS,
        }
    }
}

impl ProcessRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the capture bound (mostly useful in tests).
    pub fn with_max_chunks(mut self, max_chunks: usize) -> Self {
        self.max_chunks = max_chunks.max(1);
        self
    }

    /// Run `invocation` to completion, feeding every output line to
    /// `on_line` in arrival order.
    ///
    /// A non-zero exit is returned as `Ok`; classifying it is up to the
    /// caller. Launch failures and timeouts are errors.
    pub async fn execute(
        &self,
        invocation: &ProcessInvocation,
        on_line: &mut (dyn FnMut(&str) + Send),
    ) -> Result<ProcessOutput> {
        info!(
            stage = %invocation.stage,
            program = %invocation.program,
            cwd = ?invocation.cwd,
            timeout = ?invocation.timeout,
            "starting process"
        );
        debug!(stage = %invocation.stage, cmd = %invocation.command_line(), "command line");

        let mut cmd = Command::new(&invocation.program);
        cmd.args(&invocation.args)
            .current_dir(&invocation.cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| JobpipeError::ProcessLaunchFailed {
            stage: invocation.stage.clone(),
            program: invocation.program.clone(),
            reason: e.to_string(),
        })?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let mut capture = OutputCapture::new(self.max_chunks);

        let finished = tokio::time::timeout(invocation.timeout, async {
            pump_output(stdout, stderr, self.chunk_size, &mut capture, on_line).await;
            child.wait().await
        })
        .await;

        match finished {
            Ok(status) => {
                let status = status.with_context(|| {
                    format!("waiting for process of stage '{}'", invocation.stage)
                })?;
                let exit_code = status.code().unwrap_or(-1);
                info!(
                    stage = %invocation.stage,
                    exit_code,
                    success = status.success(),
                    "process exited"
                );
                Ok(ProcessOutput {
                    exit_code,
                    output: capture.contents(),
                })
            }
            Err(_) => {
                warn!(
                    stage = %invocation.stage,
                    timeout = ?invocation.timeout,
                    "process exceeded its timeout; killing"
                );
                if let Err(e) = child.kill().await {
                    warn!(stage = %invocation.stage, error = %e, "failed to kill timed-out process");
                }
                Err(JobpipeError::ProcessTimeout {
                    stage: invocation.stage.clone(),
                    timeout: invocation.timeout,
                    diagnostic: diagnostic_tail(&capture.contents()),
                })
            }
        }
    }
}

impl ProcessBackend for ProcessRunner {
    fn run<'a>(
        &'a self,
        invocation: ProcessInvocation,
        mut on_line: LineCallback<'a>,
    ) -> ExecFuture<'a, ProcessOutput> {
        Box::pin(async move { self.execute(&invocation, &mut *on_line).await })
    }
}

/// Read both pipes until EOF, splitting each into lines independently.
async fn pump_output<O, E>(
    stdout: Option<O>,
    stderr: Option<E>,
    chunk_size: usize,
    capture: &mut OutputCapture,
    on_line: &mut (dyn FnMut(&str) + Send),
) where
    O: AsyncRead + Unpin,
    E: AsyncRead + Unpin,
{
    let mut stdout = stdout;
    let mut stderr = stderr;
    let mut out_buf = vec![0u8; chunk_size];
    let mut err_buf = vec![0u8; chunk_size];
    let mut out_lines = LineSplitter::default();
    let mut err_lines = LineSplitter::default();

    while stdout.is_some() || stderr.is_some() {
        tokio::select! {
            read = read_chunk(&mut stdout, &mut out_buf), if stdout.is_some() => match read {
                Ok(0) | Err(_) => {
                    out_lines.finish(on_line);
                    stdout = None;
                }
                Ok(n) => {
                    capture.push(&out_buf[..n]);
                    out_lines.feed(&out_buf[..n], on_line);
                }
            },
            read = read_chunk(&mut stderr, &mut err_buf), if stderr.is_some() => match read {
                Ok(0) | Err(_) => {
                    err_lines.finish(on_line);
                    stderr = None;
                }
                Ok(n) => {
                    capture.push(&err_buf[..n]);
                    err_lines.feed(&err_buf[..n], on_line);
                }
            },
        }
    }
}

async fn read_chunk<R: AsyncRead + Unpin>(
    reader: &mut Option<R>,
    buf: &mut [u8],
) -> std::io::Result<usize> {
    match reader {
        Some(r) => r.read(buf).await,
        None => std::future::pending().await,
    }
}

/// Splits a byte stream into lines on `\n` or `\r`, carrying partial lines
/// across chunks. Empty lines are dropped.
#[derive(Debug, Default)]
pub(crate) struct LineSplitter {
    pending: Vec<u8>,
}

impl LineSplitter {
    pub(crate) fn feed(&mut self, chunk: &[u8], on_line: &mut (dyn FnMut(&str) + Send)) {
        for &b in chunk {
            if b == b'\n' || b == b'\r' {
                self.flush(on_line);
            } else {
                self.pending.push(b);
            }
        }
    }

    pub(crate) fn finish(&mut self, on_line: &mut (dyn FnMut(&str) + Send)) {
        self.flush(on_line);
    }

    fn flush(&mut self, on_line: &mut (dyn FnMut(&str) + Send)) {
        if self.pending.is_empty() {
            return;
        }
        let line = String::from_utf8_lossy(&self.pending);
        let line = line.trim();
        if !line.is_empty() {
            on_line(line);
        }
        self.pending.clear();
    }
}

/// Ring of the most recent output chunks.
#[derive(Debug)]
struct OutputCapture {
    chunks: VecDeque<Vec<u8>>,
    max_chunks: usize,
}

impl OutputCapture {
    fn new(max_chunks: usize) -> Self {
        Self {
            chunks: VecDeque::new(),
            max_chunks,
        }
    }

    fn push(&mut self, chunk: &[u8]) {
        if self.chunks.len() == self.max_chunks {
            self.chunks.pop_front();
        }
        self.chunks.push_back(chunk.to_vec());
    }

    fn contents(&self) -> String {
        let bytes: Vec<u8> = self.chunks.iter().flatten().copied().collect();
        String::from_utf8_lossy(&bytes).into_owned()
    }
}
