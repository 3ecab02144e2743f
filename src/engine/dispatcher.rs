// src/engine/dispatcher.rs

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::ConfigFile;
use crate::errors::{JobpipeError, Result};
use crate::exec::ProcessBackend;
use crate::fs::FileSystem;
use crate::job::{validate_request, Job, JobRequest};
use crate::pipeline::PipelineExecutor;
use crate::status::{poll, JobStatus, StatusState, StatusStore, StatusUpdate};
use crate::types::JobId;

use super::sweeper::spawn_sweeper;
use super::worker_pool::{spawn_worker_pool, ActiveJobs, QueuedJob};

/// Accepts job requests and runs them on a bounded pool of pipeline slots.
///
/// - `submit` validates, allocates an id, writes `pending` and enqueues.
/// - At most `[dispatcher].max_concurrent_jobs` pipelines run at once;
///   up to `[dispatcher].queue_capacity` more wait in the queue, beyond
///   which submissions are rejected with `QueueFull`.
/// - Every id maps to exactly one pipeline run. There are no retries and
///   no cancellation; resubmitting creates an independent job.
#[derive(Debug)]
pub struct JobDispatcher {
    config: Arc<ConfigFile>,
    store: Arc<dyn StatusStore>,
    fs: Arc<dyn FileSystem>,
    queue: mpsc::Sender<QueuedJob>,
    active: Arc<ActiveJobs>,
    pool: JoinHandle<()>,
    sweeper: JoinHandle<()>,
}

impl JobDispatcher {
    /// Start the worker pool and the status sweeper.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(
        config: Arc<ConfigFile>,
        store: Arc<dyn StatusStore>,
        backend: Arc<dyn ProcessBackend>,
        fs: Arc<dyn FileSystem>,
    ) -> Self {
        let executor = PipelineExecutor::new(
            Arc::clone(&store),
            backend,
            Arc::clone(&fs),
            Arc::clone(&config),
        );

        let (queue, rx) = mpsc::channel(config.dispatcher.queue_capacity);
        let pool = spawn_worker_pool(rx, executor, config.dispatcher.max_concurrent_jobs);
        let sweeper = spawn_sweeper(Arc::clone(&store), config.store.sweep_interval);

        info!(
            max_concurrent_jobs = config.dispatcher.max_concurrent_jobs,
            queue_capacity = config.dispatcher.queue_capacity,
            "dispatcher started"
        );

        Self {
            config,
            store,
            fs,
            queue,
            active: ActiveJobs::new(),
            pool,
            sweeper,
        }
    }

    /// Accept a job and return its id.
    ///
    /// Invalid requests fail with `InputInvalid` before anything is written;
    /// a full queue fails with `QueueFull` and leaves no record behind.
    pub async fn submit(&self, request: JobRequest) -> Result<JobId> {
        validate_request(&request, &self.config.sources, self.fs.as_ref())?;

        let slot = self.queue.try_reserve().map_err(|e| match e {
            TrySendError::Full(()) => JobpipeError::QueueFull {
                capacity: self.config.dispatcher.queue_capacity,
            },
            TrySendError::Closed(()) => JobpipeError::DispatcherClosed,
        })?;

        let job = Job::new(JobId::generate(), request);
        let Some(registration) = self.active.register(&job) else {
            return Err(JobpipeError::Other(anyhow::anyhow!(
                "job id {} is already active",
                job.id
            )));
        };
        if registration.same_resource > 0 {
            info!(
                job_id = %job.id,
                resource = %job.resource_key(),
                others = registration.same_resource,
                "resource already has active jobs; running independently"
            );
        }

        self.store
            .set(&job.id, StatusUpdate::pending("Queued"))
            .await?;

        let id = job.id.clone();
        info!(job_id = %id, kind = %job.kind(), locator = %job.request.locator(), "job accepted");
        slot.send(QueuedJob {
            job,
            guard: registration.guard,
        });
        Ok(id)
    }

    /// Current status of `job_id`; `unknown` if there is no record.
    pub async fn poll(&self, job_id: &JobId) -> Result<JobStatus> {
        poll(self.store.as_ref(), job_id).await
    }

    /// Poll until `job_id` reaches a terminal status (or reads as unknown).
    pub async fn wait_for(&self, job_id: &JobId, every: Duration) -> Result<JobStatus> {
        loop {
            let status = self.poll(job_id).await?;
            if status.is_terminal() || status.status == StatusState::Unknown {
                return Ok(status);
            }
            tokio::time::sleep(every).await;
        }
    }

    /// Jobs accepted and not yet finished (queued or running).
    pub fn active_jobs(&self) -> usize {
        self.active.count()
    }

    /// Stop accepting jobs, wait for queued and running pipelines to finish,
    /// then stop the sweeper.
    pub async fn shutdown(self) {
        let JobDispatcher {
            queue,
            pool,
            sweeper,
            ..
        } = self;

        drop(queue);
        if let Err(e) = pool.await {
            warn!(error = %e, "worker pool ended abnormally");
        }
        sweeper.abort();
        info!("dispatcher stopped");
    }
}
