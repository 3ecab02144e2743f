#![allow(dead_code)]

use std::sync::Mutex;
use std::time::Duration;

use jobpipe::status::{
    JobStatus, MemoryStatusStore, StatusState, StatusStore, StatusUpdate, StoreFuture,
};
use jobpipe::types::JobId;

/// Memory store that also keeps every accepted write.
///
/// Tests use the history to assert on progress monotonicity and on the
/// number of terminal writes, which a plain snapshot cannot show.
#[derive(Debug)]
pub struct RecordingStore {
    inner: MemoryStatusStore,
    history: Mutex<Vec<(JobId, JobStatus)>>,
    rejected: Mutex<Vec<(JobId, StatusUpdate)>>,
}

impl RecordingStore {
    pub fn new() -> Self {
        Self {
            inner: MemoryStatusStore::new(Duration::from_secs(3600)),
            history: Mutex::new(Vec::new()),
            rejected: Mutex::new(Vec::new()),
        }
    }

    /// Records after each accepted write for `job_id`, oldest first.
    pub fn history(&self, job_id: &JobId) -> Vec<JobStatus> {
        self.history
            .lock()
            .unwrap()
            .iter()
            .filter(|(id, _)| id == job_id)
            .map(|(_, status)| status.clone())
            .collect()
    }

    pub fn progress_values(&self, job_id: &JobId) -> Vec<u8> {
        self.history(job_id).iter().map(|s| s.progress).collect()
    }

    /// Stages `job_id` was seen running, in order, without repeats.
    pub fn stages(&self, job_id: &JobId) -> Vec<String> {
        let mut stages: Vec<String> = Vec::new();
        for status in self.history(job_id) {
            if let StatusState::Running(stage) = status.status {
                if stages.last() != Some(&stage) {
                    stages.push(stage);
                }
            }
        }
        stages
    }

    pub fn terminal_writes(&self, job_id: &JobId) -> usize {
        self.history(job_id)
            .iter()
            .filter(|s| s.is_terminal())
            .count()
    }

    /// Writes refused by the store (e.g. after a terminal status).
    pub fn rejected(&self) -> Vec<(JobId, StatusUpdate)> {
        self.rejected.lock().unwrap().clone()
    }

    pub fn job_ids(&self) -> Vec<JobId> {
        let mut ids: Vec<JobId> = Vec::new();
        for (id, _) in self.history.lock().unwrap().iter() {
            if !ids.contains(id) {
                ids.push(id.clone());
            }
        }
        ids
    }
}

impl Default for RecordingStore {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusStore for RecordingStore {
    fn set<'a>(&'a self, job_id: &'a JobId, update: StatusUpdate) -> StoreFuture<'a, JobStatus> {
        Box::pin(async move {
            match self.inner.set(job_id, update.clone()).await {
                Ok(status) => {
                    self.history
                        .lock()
                        .unwrap()
                        .push((job_id.clone(), status.clone()));
                    Ok(status)
                }
                Err(e) => {
                    self.rejected.lock().unwrap().push((job_id.clone(), update));
                    Err(e)
                }
            }
        })
    }

    fn get<'a>(&'a self, job_id: &'a JobId) -> StoreFuture<'a, Option<JobStatus>> {
        self.inner.get(job_id)
    }

    fn purge_expired(&self) -> StoreFuture<'_, usize> {
        self.inner.purge_expired()
    }
}
