// src/status/memory.rs

use std::collections::HashMap;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::status::{merge_record, JobStatus, StatusStore, StatusUpdate, StoreFuture};
use crate::types::JobId;

#[derive(Debug)]
struct Entry {
    status: JobStatus,
    written_at: Instant,
}

/// In-process status store for single-node deployments.
#[derive(Debug)]
pub struct MemoryStatusStore {
    retention: Duration,
    entries: Mutex<HashMap<JobId, Entry>>,
}

impl MemoryStatusStore {
    pub fn new(retention: Duration) -> Self {
        Self {
            retention,
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn is_expired(&self, entry: &Entry, now: Instant) -> bool {
        now.saturating_duration_since(entry.written_at) >= self.retention
    }
}

impl StatusStore for MemoryStatusStore {
    fn set<'a>(&'a self, job_id: &'a JobId, update: StatusUpdate) -> StoreFuture<'a, JobStatus> {
        Box::pin(async move {
            let now = Instant::now();
            let mut entries = self.entries.lock();

            let current = entries
                .get(job_id)
                .filter(|e| !self.is_expired(e, now))
                .map(|e| e.status.clone());
            let had_record = current.is_some();

            let merged = merge_record(job_id, current, update)?;

            entries.insert(
                job_id.clone(),
                Entry {
                    status: merged.clone(),
                    written_at: now,
                },
            );

            debug!(
                job_id = %job_id,
                status = %merged.status,
                progress = merged.progress,
                created = !had_record,
                "status record updated (memory)"
            );
            Ok(merged)
        })
    }

    fn get<'a>(&'a self, job_id: &'a JobId) -> StoreFuture<'a, Option<JobStatus>> {
        Box::pin(async move {
            let now = Instant::now();
            let entries = self.entries.lock();
            Ok(entries
                .get(job_id)
                .filter(|e| !self.is_expired(e, now))
                .map(|e| e.status.clone()))
        })
    }

    fn purge_expired(&self) -> StoreFuture<'_, usize> {
        Box::pin(async move {
            let now = Instant::now();
            let mut entries = self.entries.lock();
            let before = entries.len();
            entries.retain(|_, e| !self.is_expired(e, now));
            let removed = before - entries.len();
            if removed > 0 {
                info!(removed, "purged expired status records (memory)");
            }
            Ok(removed)
        })
    }
}
