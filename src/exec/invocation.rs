// src/exec/invocation.rs

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::config::ToolConfig;
use crate::errors::diagnostic_tail;
use crate::exec::progress::{BarProgressParser, NoProgress, ProgressStrategy, RegexProgressParser};

/// One external command to run for one stage of one job.
#[derive(Debug, Clone)]
pub struct ProcessInvocation {
    /// Stage this process belongs to (used in logs and error messages).
    pub stage: String,
    pub program: String,
    pub args: Vec<String>,
    /// Working directory; always inside the job's staging directory.
    pub cwd: PathBuf,
    /// Hard wall-clock limit; the process is killed when it is exceeded.
    pub timeout: Duration,
    pub progress: ProgressStrategy,
}

impl ProcessInvocation {
    /// Invocation of a configured tool: the tool's prefix args followed by
    /// `args`, with the tool's timeout.
    ///
    /// The progress strategy is the tool's `progress_regex` when set, and
    /// `fallback` otherwise.
    pub fn for_tool(
        stage: &str,
        tool: &ToolConfig,
        args: impl IntoIterator<Item = String>,
        cwd: impl Into<PathBuf>,
        fallback: ProgressStrategy,
    ) -> Self {
        let progress: ProgressStrategy = match &tool.progress_regex {
            Some(re) => Arc::new(RegexProgressParser::new(re.clone())),
            None => fallback,
        };

        let mut all_args = tool.args.clone();
        all_args.extend(args);

        Self {
            stage: stage.to_string(),
            program: tool.program.clone(),
            args: all_args,
            cwd: cwd.into(),
            timeout: tool.timeout,
            progress,
        }
    }

    /// Strategy for tools drawing tqdm-style progress bars.
    pub fn bar_progress() -> ProgressStrategy {
        Arc::new(BarProgressParser)
    }

    /// Strategy for tools without usable progress output.
    pub fn no_progress() -> ProgressStrategy {
        Arc::new(NoProgress)
    }

    /// Shell-like rendering for logs and dry runs.
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .map(|part| {
                if part.is_empty() || part.contains(char::is_whitespace) {
                    format!("'{part}'")
                } else {
                    part.to_string()
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// What a finished process left behind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutput {
    /// Exit code, or -1 when the process was terminated by a signal.
    pub exit_code: i32,
    /// Combined stdout/stderr, bounded to the most recent chunks.
    pub output: String,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Bounded tail of the captured output for error messages.
    pub fn diagnostic(&self) -> String {
        diagnostic_tail(&self.output)
    }
}
