// src/pipeline/executor.rs

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, error, info, trace, warn};

use crate::config::ConfigFile;
use crate::errors::{JobpipeError, Result};
use crate::exec::{LineCallback, ProcessBackend, ProcessInvocation, ProcessOutput, StageProgress};
use crate::fs::FileSystem;
use crate::job::Job;
use crate::pipeline::outputs::locate_output;
use crate::pipeline::publish::publish_result;
use crate::pipeline::stage::{Pipeline, Stage, StageAction, StageContext, StageOutputs};
use crate::status::{JobResult, StatusStore, StatusUpdate};
use crate::types::JobId;

/// A stage-tagged failure, before it is written to the store.
#[derive(Debug)]
struct StageFailure {
    stage: String,
    error: JobpipeError,
}

impl StageFailure {
    fn at(stage: &str) -> impl FnOnce(JobpipeError) -> StageFailure + '_ {
        move |error| StageFailure {
            stage: stage.to_string(),
            error,
        }
    }
}

/// Drives the stages of one job and owns every write to its status record
/// after `pending`.
///
/// The executor is a generic interpreter: what a job does is entirely
/// described by its [`Pipeline`].
#[derive(Debug, Clone)]
pub struct PipelineExecutor {
    store: Arc<dyn StatusStore>,
    backend: Arc<dyn ProcessBackend>,
    fs: Arc<dyn FileSystem>,
    config: Arc<ConfigFile>,
}

impl PipelineExecutor {
    pub fn new(
        store: Arc<dyn StatusStore>,
        backend: Arc<dyn ProcessBackend>,
        fs: Arc<dyn FileSystem>,
        config: Arc<ConfigFile>,
    ) -> Self {
        Self {
            store,
            backend,
            fs,
            config,
        }
    }

    pub fn config(&self) -> &ConfigFile {
        &self.config
    }

    /// Exclusive staging directory of `job_id`.
    ///
    /// Always absolute, since tools run with their stage work directory as
    /// cwd.
    pub fn staging_dir(&self, job_id: &JobId) -> PathBuf {
        let root = &self.config.paths.staging_root;
        std::path::absolute(root)
            .unwrap_or_else(|_| root.clone())
            .join(job_id.as_str())
    }

    /// Run every stage of `pipeline` for `job`, then write exactly one
    /// terminal status.
    ///
    /// On failure the remaining stages are skipped and the classified error
    /// is both written to the store and returned.
    pub async fn run(&self, job: &Job, pipeline: &Pipeline) -> Result<JobResult> {
        let staging = self.staging_dir(&job.id);
        info!(
            job_id = %job.id,
            kind = %job.kind(),
            stages = ?pipeline.stage_names(),
            staging = ?staging,
            "pipeline started"
        );

        let outcome = match self.run_stages(job, pipeline, &staging).await {
            Ok(result) => {
                let update = StatusUpdate::completed(result.clone(), "Completed");
                match self.store.set(&job.id, update).await {
                    Ok(_) => {
                        info!(job_id = %job.id, "pipeline completed");
                        Ok(result)
                    }
                    Err(e) => {
                        error!(job_id = %job.id, error = %e, "failed to record completion");
                        Err(e)
                    }
                }
            }
            Err(StageFailure { stage, error }) => {
                warn!(
                    job_id = %job.id,
                    stage = %stage,
                    kind = error.kind(),
                    error = %error,
                    "pipeline failed"
                );
                let update =
                    StatusUpdate::failed(error.client_message(), format!("Failed during {stage}"));
                if let Err(e) = self.store.set(&job.id, update).await {
                    error!(job_id = %job.id, error = %e, "failed to record job error");
                }
                Err(error)
            }
        };

        self.cleanup(&job.id, &staging);
        outcome
    }

    /// Record a pipeline that ended without writing its own terminal status
    /// (its task panicked or was aborted), and clean up after it.
    pub async fn record_abnormal_end(&self, job_id: &JobId, reason: &str) {
        let update = StatusUpdate::failed(
            format!("internal_error: pipeline ended abnormally: {reason}"),
            "Failed unexpectedly",
        );
        if let Err(e) = self.store.set(job_id, update).await {
            warn!(job_id = %job_id, error = %e, "could not record abnormal pipeline end");
        }
        self.cleanup(job_id, &self.staging_dir(job_id));
    }

    async fn run_stages(
        &self,
        job: &Job,
        pipeline: &Pipeline,
        staging: &Path,
    ) -> std::result::Result<JobResult, StageFailure> {
        self.fs
            .create_dir_all(staging)
            .map_err(|e| StageFailure::at("setup")(e.into()))?;

        let mut outputs = StageOutputs::new();
        for stage in &pipeline.stages {
            self.run_stage(job, stage, staging, &mut outputs)
                .await
                .map_err(StageFailure::at(&stage.name))?;
        }

        publish_result(
            self.fs.as_ref(),
            &self.config.paths,
            &job.id,
            &pipeline.result,
            &outputs,
            job.request.result_name(),
        )
        .map_err(StageFailure::at("publish"))
    }

    async fn run_stage(
        &self,
        job: &Job,
        stage: &Stage,
        staging: &Path,
        outputs: &mut StageOutputs,
    ) -> Result<()> {
        self.fs.create_dir_all(&staging.join(&stage.name))?;

        let action = {
            let ctx = StageContext {
                job,
                staging_dir: staging,
                config: &self.config,
                outputs: &*outputs,
            };
            stage.resolve(&ctx)?
        };

        self.store
            .set(
                &job.id,
                StatusUpdate::running(&stage.name, stage.band.start, &stage.start_message),
            )
            .await?;
        info!(job_id = %job.id, stage = %stage.name, band = %stage.band, "stage started");

        match action {
            StageAction::Run(invocation) => {
                let output = self.run_process(job, stage, invocation).await?;
                if !output.success() {
                    return Err(JobpipeError::ProcessExitNonZero {
                        stage: stage.name.clone(),
                        exit_code: output.exit_code,
                        diagnostic: output.diagnostic(),
                    });
                }
            }
            StageAction::CopyFile { from, to } => {
                debug!(job_id = %job.id, stage = %stage.name, from = ?from, to = ?to, "copying input");
                self.fs.copy(&from, &to)?;
            }
        }

        for spec in &stage.outputs {
            match locate_output(self.fs.as_ref(), staging, spec)? {
                Some(path) => outputs.insert(spec.name.clone(), path),
                None if spec.required => {
                    return Err(JobpipeError::OutputNotFound {
                        stage: stage.name.clone(),
                        output: spec.name.clone(),
                    });
                }
                None => debug!(job_id = %job.id, stage = %stage.name, output = %spec.name, "optional output not produced"),
            }
        }

        self.store
            .set(&job.id, StatusUpdate::new().progress(stage.band.end))
            .await?;
        info!(job_id = %job.id, stage = %stage.name, "stage finished");
        Ok(())
    }

    /// Run one process, writing mapped progress to the store as it arrives.
    ///
    /// The line callback only parses and queues; all store writes happen on
    /// this task, in order, and are drained before returning so no progress
    /// write can land after the terminal status.
    async fn run_process(
        &self,
        job: &Job,
        stage: &Stage,
        invocation: ProcessInvocation,
    ) -> Result<ProcessOutput> {
        let (tx, mut rx) = mpsc::unbounded_channel::<(u8, u8)>();
        let mut tracker = StageProgress::new(
            invocation.progress.clone(),
            stage.band,
            self.config.progress.min_step,
        );

        let job_id = job.id.clone();
        let stage_name = stage.name.clone();
        let on_line: LineCallback<'_> = Box::new(move |line: &str| match tracker.observe(line) {
            Some(progress) => {
                trace!(job_id = %job_id, stage = %stage_name, "{line}");
                let _ = tx.send(progress);
            }
            None => debug!(job_id = %job_id, stage = %stage_name, "{line}"),
        });

        let mut run = self.backend.run(invocation, on_line);
        let result = loop {
            tokio::select! {
                biased;
                Some((stage_pct, overall)) = rx.recv() => {
                    self.write_progress(&job.id, stage, stage_pct, overall).await;
                }
                result = &mut run => break result,
            }
        };
        drop(run);

        while let Ok((stage_pct, overall)) = rx.try_recv() {
            self.write_progress(&job.id, stage, stage_pct, overall).await;
        }
        result
    }

    /// Progress writes are best-effort; a failed write never fails the stage.
    async fn write_progress(&self, job_id: &JobId, stage: &Stage, stage_pct: u8, overall: u8) {
        let update = StatusUpdate::new()
            .progress(overall)
            .message(format!("{} ({stage_pct}%)", stage.start_message));
        if let Err(e) = self.store.set(job_id, update).await {
            warn!(job_id = %job_id, stage = %stage.name, error = %e, "progress write failed");
        }
    }

    fn cleanup(&self, job_id: &JobId, staging: &Path) {
        if self.config.paths.keep_staging {
            debug!(job_id = %job_id, staging = ?staging, "keeping staging directory");
            return;
        }
        if !self.fs.exists(staging) {
            return;
        }
        match self.fs.remove_dir_all(staging) {
            Ok(()) => debug!(job_id = %job_id, "staging directory removed"),
            Err(e) => warn!(job_id = %job_id, error = %e, "failed to remove staging directory"),
        }
    }
}
