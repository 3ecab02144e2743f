// src/engine/worker_pool.rs

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info};

use crate::job::Job;
use crate::pipeline::{pipeline_for, PipelineExecutor};
use crate::types::JobId;

/// Jobs between acceptance and the end of their pipeline.
///
/// Guarantees a job id is executed at most once, and counts jobs per
/// resource fingerprint so resubmissions can be noticed.
#[derive(Debug, Default)]
pub struct ActiveJobs {
    inner: Mutex<ActiveInner>,
}

#[derive(Debug, Default)]
struct ActiveInner {
    ids: HashSet<JobId>,
    resources: HashMap<String, usize>,
}

/// Registration of an active job; unregisters on drop.
#[derive(Debug)]
pub struct ActiveGuard {
    jobs: Arc<ActiveJobs>,
    id: JobId,
    resource: String,
}

/// Outcome of [`ActiveJobs::register`].
#[derive(Debug)]
pub struct Registration {
    pub guard: ActiveGuard,
    /// Other active jobs over the same resource at registration time.
    pub same_resource: usize,
}

impl ActiveJobs {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register `job`. Returns `None` if its id is already active.
    pub fn register(self: &Arc<Self>, job: &Job) -> Option<Registration> {
        let resource = job.resource_key();
        let mut inner = self.inner.lock();
        if !inner.ids.insert(job.id.clone()) {
            return None;
        }
        let count = inner.resources.entry(resource.clone()).or_insert(0);
        let same_resource = *count;
        *count += 1;

        Some(Registration {
            guard: ActiveGuard {
                jobs: Arc::clone(self),
                id: job.id.clone(),
                resource,
            },
            same_resource,
        })
    }

    pub fn count(&self) -> usize {
        self.inner.lock().ids.len()
    }

    fn release(&self, id: &JobId, resource: &str) {
        let mut inner = self.inner.lock();
        inner.ids.remove(id);
        if let Some(count) = inner.resources.get_mut(resource) {
            *count -= 1;
            if *count == 0 {
                inner.resources.remove(resource);
            }
        }
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.jobs.release(&self.id, &self.resource);
    }
}

/// A job waiting for a pipeline slot.
#[derive(Debug)]
pub struct QueuedJob {
    pub job: Job,
    pub guard: ActiveGuard,
}

/// Spawn the pool loop: wait for one of `max_concurrent` slots, then pull
/// the next queued job and run its pipeline in its own task.
///
/// A job leaves the queue only once a slot is free, so at most the queue's
/// capacity of jobs ever wait. The loop ends once the queue is closed and
/// drained, after every running pipeline has finished.
pub fn spawn_worker_pool(
    mut queue: mpsc::Receiver<QueuedJob>,
    executor: PipelineExecutor,
    max_concurrent: usize,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let slots = Arc::new(Semaphore::new(max_concurrent.max(1)));
        let mut running = JoinSet::new();
        info!(max_concurrent, "worker pool started");

        loop {
            let Ok(permit) = Arc::clone(&slots).acquire_owned().await else {
                break;
            };
            let Some(QueuedJob { job, guard }) = queue.recv().await else {
                break;
            };
            while let Some(finished) = running.try_join_next() {
                log_join(finished);
            }

            debug!(job_id = %job.id, kind = %job.kind(), "job assigned to pipeline slot");
            let executor = executor.clone();
            running.spawn(async move {
                let _permit = permit;
                let _guard = guard;
                supervise(executor, job).await;
            });
        }

        info!(in_flight = running.len(), "job queue closed; waiting for running pipelines");
        while let Some(finished) = running.join_next().await {
            log_join(finished);
        }
        info!("worker pool stopped");
    })
}

/// Run the pipeline of `job` in a child task so that a panic inside it still
/// ends the job with a terminal status.
async fn supervise(executor: PipelineExecutor, job: Job) {
    let job_id = job.id.clone();
    let pipeline_executor = executor.clone();
    let run = tokio::spawn(async move {
        let pipeline = pipeline_for(job.kind(), pipeline_executor.config());
        // Outcome is recorded in the status store by the executor.
        let _ = pipeline_executor.run(&job, &pipeline).await;
    });

    if let Err(e) = run.await {
        error!(job_id = %job_id, error = %e, "pipeline task panicked or was aborted");
        executor.record_abnormal_end(&job_id, &e.to_string()).await;
    }
}

fn log_join(result: Result<(), tokio::task::JoinError>) {
    if let Err(e) = result {
        error!(error = %e, "pipeline supervisor ended abnormally");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::JobRequest;

    fn download_job(url: &str) -> Job {
        Job::new(
            JobId::generate(),
            JobRequest::Download {
                url: url.to_string(),
            },
        )
    }

    #[test]
    fn same_id_registers_once() {
        let jobs = ActiveJobs::new();
        let job = download_job("https://youtu.be/a");
        let first = jobs.register(&job);
        assert!(first.is_some());
        assert!(jobs.register(&job).is_none());
        drop(first);
        assert!(jobs.register(&job).is_some());
    }

    #[test]
    fn counts_jobs_per_resource() {
        let jobs = ActiveJobs::new();
        let a = jobs.register(&download_job("https://youtu.be/a")).unwrap();
        let b = jobs.register(&download_job("https://youtu.be/a")).unwrap();
        let c = jobs.register(&download_job("https://youtu.be/c")).unwrap();
        assert_eq!(a.same_resource, 0);
        assert_eq!(b.same_resource, 1);
        assert_eq!(c.same_resource, 0);
        assert_eq!(jobs.count(), 3);

        drop(a);
        drop(b);
        let d = jobs.register(&download_job("https://youtu.be/a")).unwrap();
        assert_eq!(d.same_resource, 0);
    }
}
