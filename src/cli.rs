// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use crate::types::JobKind;

/// Command-line arguments for `jobpipe`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "jobpipe",
    version,
    about = "Run media processing jobs as pipelines of external tools.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// Default: `$JOBPIPE_CONFIG`, else `Jobpipe.toml` in the current
    /// working directory if it exists, else built-in defaults.
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `JOBPIPE_LOG` or a default level will be used.
    #[arg(long, global = true, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Submit jobs and follow them until they finish.
    ///
    /// Each REQUEST is a JSON object tagged by `kind`, e.g.
    /// `{"kind":"separate","source":{"url":"https://youtu.be/abc"}}`.
    /// Status snapshots are printed to stdout as JSON lines.
    Run {
        #[arg(value_name = "REQUEST", required = true)]
        requests: Vec<String>,

        /// Interval between status polls, e.g. `500ms`.
        #[arg(long, value_name = "DURATION", default_value = "500ms")]
        poll_interval: String,
    },

    /// Print the status record of a job (`unknown` if absent).
    Status {
        #[arg(value_name = "JOB_ID")]
        job_id: String,
    },

    /// Print the stages of a job kind without running anything.
    Plan {
        #[arg(value_name = "KIND")]
        kind: JobKind,
    },

    /// Remove expired status records from the configured store.
    Sweep,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_takes_requests_and_global_flags() {
        let args = CliArgs::try_parse_from([
            "jobpipe",
            "run",
            r#"{"kind":"download","url":"https://youtu.be/a"}"#,
            "--config",
            "Jobpipe.toml",
            "--log-level",
            "debug",
        ])
        .unwrap();

        assert_eq!(args.config, Some(PathBuf::from("Jobpipe.toml")));
        assert!(matches!(args.log_level, Some(LogLevel::Debug)));
        match args.command {
            Command::Run {
                requests,
                poll_interval,
            } => {
                assert_eq!(requests.len(), 1);
                assert_eq!(poll_interval, "500ms");
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn plan_parses_job_kind() {
        let args = CliArgs::try_parse_from(["jobpipe", "plan", "karaoke"]).unwrap();
        assert!(matches!(args.command, Command::Plan { kind: JobKind::Karaoke }));
        assert!(CliArgs::try_parse_from(["jobpipe", "plan", "remix"]).is_err());
    }

    #[test]
    fn run_requires_at_least_one_request() {
        assert!(CliArgs::try_parse_from(["jobpipe", "run"]).is_err());
    }
}
