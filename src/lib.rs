// src/lib.rs

pub mod cli;
pub mod config;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod fs;
pub mod job;
pub mod logging;
pub mod pipeline;
pub mod status;
pub mod types;

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::cli::{CliArgs, Command};
use crate::config::{load_effective, parse_duration, ConfigFile, ToolConfig};
use crate::engine::JobDispatcher;
use crate::errors::{JobpipeError, Result};
use crate::exec::ProcessRunner;
use crate::fs::RealFileSystem;
use crate::job::JobRequest;
use crate::pipeline::{pipeline_for, ResultSpec};
use crate::status::{open_store, poll, JobStatus, StatusState};
use crate::types::{JobId, JobKind, StoreBackend};

/// One line of `jobpipe run` output.
#[derive(Debug, Serialize)]
struct StatusLine<'a> {
    job_id: &'a JobId,
    #[serde(flatten)]
    status: &'a JobStatus,
}

/// High-level entry point used by `main.rs`. Returns the process exit code.
///
/// This wires together:
/// - config loading
/// - status store
/// - dispatcher / worker pool / process runner
/// - Ctrl-C handling
pub async fn run(args: CliArgs) -> Result<i32> {
    let cfg = Arc::new(load_effective(args.config.as_deref())?);

    match args.command {
        Command::Run {
            requests,
            poll_interval,
        } => {
            let every = parse_duration(&poll_interval).map_err(|e| {
                JobpipeError::InputInvalid(format!("--poll-interval: {e}"))
            })?;
            run_jobs(cfg, &requests, every).await
        }
        Command::Status { job_id } => print_status(&cfg, &job_id).await,
        Command::Plan { kind } => {
            print_plan(&cfg, kind);
            Ok(0)
        }
        Command::Sweep => sweep(&cfg).await,
    }
}

async fn run_jobs(cfg: Arc<ConfigFile>, requests: &[String], every: std::time::Duration) -> Result<i32> {
    let store = open_store(&cfg.store)?;
    let dispatcher = JobDispatcher::start(
        Arc::clone(&cfg),
        store,
        Arc::new(ProcessRunner::new()),
        Arc::new(RealFileSystem),
    );

    let mut failed = false;
    let mut ids = Vec::new();
    for (index, raw) in requests.iter().enumerate() {
        let submitted = match serde_json::from_str::<JobRequest>(raw) {
            Ok(request) => dispatcher.submit(request).await,
            Err(e) => Err(JobpipeError::InputInvalid(format!("request {index}: {e}"))),
        };
        match submitted {
            Ok(id) => ids.push(id),
            Err(e) => {
                failed = true;
                warn!(request = index, error = %e, "submission rejected");
                println!(
                    "{}",
                    serde_json::json!({ "request": index, "error": e.client_message() })
                );
            }
        }
    }

    let followed = tokio::select! {
        res = follow(&dispatcher, &ids, every) => Some(res),
        _ = tokio::signal::ctrl_c() => None,
    };

    let Some(all_completed) = followed else {
        warn!("interrupted; running pipelines are abandoned");
        return Ok(130);
    };
    let all_completed = all_completed?;

    dispatcher.shutdown().await;
    Ok(if failed || !all_completed { 1 } else { 0 })
}

/// Print a JSON line whenever a job's record changes, until all are
/// terminal. Returns whether every job completed.
async fn follow(dispatcher: &JobDispatcher, ids: &[JobId], every: std::time::Duration) -> Result<bool> {
    let mut last: BTreeMap<&JobId, JobStatus> = BTreeMap::new();
    let mut done: BTreeMap<&JobId, bool> = BTreeMap::new();

    while done.len() < ids.len() {
        for id in ids {
            if done.contains_key(id) {
                continue;
            }
            let status = dispatcher.poll(id).await?;
            if last.get(id) != Some(&status) {
                let line = StatusLine {
                    job_id: id,
                    status: &status,
                };
                println!("{}", serde_json::to_string(&line)?);
            }
            if status.is_terminal() || status.status == StatusState::Unknown {
                done.insert(id, status.status == StatusState::Completed);
            }
            last.insert(id, status);
        }
        if done.len() < ids.len() {
            tokio::time::sleep(every).await;
        }
    }

    debug!(jobs = ids.len(), "all jobs reached a terminal status");
    Ok(done.values().all(|ok| *ok))
}

async fn print_status(cfg: &ConfigFile, raw_id: &str) -> Result<i32> {
    let job_id = JobId::parse(raw_id)
        .ok_or_else(|| JobpipeError::InputInvalid(format!("'{raw_id}' is not a valid job id")))?;

    if cfg.store.backend == StoreBackend::Memory {
        warn!("the memory store is private to each process; use [store] backend = \"file\" to query jobs from another process");
    }

    let store = open_store(&cfg.store)?;
    let status = poll(store.as_ref(), &job_id).await?;
    println!("{}", serde_json::to_string_pretty(&status)?);
    Ok(0)
}

async fn sweep(cfg: &ConfigFile) -> Result<i32> {
    let store = open_store(&cfg.store)?;
    let removed = store.purge_expired().await?;
    info!(removed, "sweep complete");
    println!("removed {removed} expired status record(s)");
    Ok(0)
}

/// Dry run: print the stages a job kind runs through, execute nothing.
fn print_plan(cfg: &ConfigFile, kind: JobKind) {
    let pipeline = pipeline_for(kind, cfg);

    println!("jobpipe plan: {kind}");
    println!(
        "  dispatcher: max_concurrent_jobs = {}, queue_capacity = {}",
        cfg.dispatcher.max_concurrent_jobs, cfg.dispatcher.queue_capacity
    );
    println!();

    println!("stages ({}):", pipeline.stages.len());
    for stage in &pipeline.stages {
        println!("  - {} {}", stage.name, stage.band);
        println!("      message: {}", stage.start_message);
        if let Some(tool) = tool_config(cfg, &stage.tool) {
            println!("      tool: {} ({})", stage.tool, tool.program);
            println!("      timeout: {:?}", tool.timeout);
        }
        for output in &stage.outputs {
            println!(
                "      output: {} <- {}{}",
                output.name,
                output.pattern,
                if output.required { "" } else { " (optional)" }
            );
        }
    }

    println!();
    match &pipeline.result {
        ResultSpec::Tracks(tracks) => {
            let names: Vec<&str> = tracks.iter().map(|(t, _)| t.as_str()).collect();
            println!("result: tracks {names:?}");
        }
        ResultSpec::File(output) => println!("result: file <- {output}"),
    }

    debug!("plan complete (no execution)");
}

fn tool_config<'a>(cfg: &'a ConfigFile, label: &str) -> Option<&'a ToolConfig> {
    match label {
        "downloader" => Some(&cfg.tools.downloader),
        "separator" => Some(&cfg.tools.separator.tool),
        "ffmpeg" => Some(&cfg.tools.ffmpeg),
        "transcriber" => Some(&cfg.tools.transcriber),
        _ => None,
    }
}
