// src/status/file.rs

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::errors::Result;
use crate::status::{merge_record, JobStatus, StatusStore, StatusUpdate, StoreFuture};
use crate::types::JobId;

/// On-disk representation: the wire record plus the last write time.
#[derive(Debug, Serialize, Deserialize)]
struct StoredRecord {
    #[serde(flatten)]
    status: JobStatus,
    updated_at: DateTime<Utc>,
}

/// Status store keeping one JSON file per job under a shared directory.
///
/// Writes go to a temporary file that is then renamed over the record, so
/// readers in any process see either the old or the new record. Writes from
/// this process are serialized; across processes the single-writer-per-job
/// rule of the executor keeps merges from racing.
#[derive(Debug)]
pub struct FileStatusStore {
    dir: PathBuf,
    retention: Duration,
    write_lock: Mutex<()>,
}

impl FileStatusStore {
    /// Open (creating if needed) the store directory.
    pub fn open(dir: impl AsRef<Path>, retention: Duration) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("creating status store directory {:?}", dir))?;
        Ok(Self {
            dir,
            retention,
            write_lock: Mutex::new(()),
        })
    }

    fn record_path(&self, job_id: &JobId) -> PathBuf {
        self.dir.join(format!("{}.json", job_id.as_str()))
    }

    fn is_expired(&self, record: &StoredRecord, now: DateTime<Utc>) -> bool {
        match (now - record.updated_at).to_std() {
            Ok(age) => age >= self.retention,
            // Written "in the future" (clock skew between processes).
            Err(_) => false,
        }
    }

    async fn read_record(&self, path: &Path) -> Result<Option<StoredRecord>> {
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        match serde_json::from_slice::<StoredRecord>(&bytes) {
            Ok(record) => Ok(Some(record)),
            Err(e) => {
                warn!(path = ?path, error = %e, "unreadable status record; treating as absent");
                Ok(None)
            }
        }
    }

    async fn write_record(&self, path: &Path, record: &StoredRecord) -> Result<()> {
        let bytes = serde_json::to_vec(record)?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &bytes)
            .await
            .with_context(|| format!("writing status record {:?}", tmp))?;
        tokio::fs::rename(&tmp, path)
            .await
            .with_context(|| format!("replacing status record {:?}", path))?;
        Ok(())
    }
}

impl StatusStore for FileStatusStore {
    fn set<'a>(&'a self, job_id: &'a JobId, update: StatusUpdate) -> StoreFuture<'a, JobStatus> {
        Box::pin(async move {
            let _guard = self.write_lock.lock().await;
            let path = self.record_path(job_id);
            let now = Utc::now();

            let current = self
                .read_record(&path)
                .await?
                .filter(|r| !self.is_expired(r, now))
                .map(|r| r.status);

            let merged = merge_record(job_id, current, update)?;
            let record = StoredRecord {
                status: merged,
                updated_at: now,
            };
            self.write_record(&path, &record).await?;

            debug!(
                job_id = %job_id,
                status = %record.status.status,
                progress = record.status.progress,
                "status record updated (file)"
            );
            Ok(record.status)
        })
    }

    fn get<'a>(&'a self, job_id: &'a JobId) -> StoreFuture<'a, Option<JobStatus>> {
        Box::pin(async move {
            let path = self.record_path(job_id);
            let now = Utc::now();
            Ok(self
                .read_record(&path)
                .await?
                .filter(|r| !self.is_expired(r, now))
                .map(|r| r.status))
        })
    }

    fn purge_expired(&self) -> StoreFuture<'_, usize> {
        Box::pin(async move {
            let _guard = self.write_lock.lock().await;
            let now = Utc::now();
            let mut removed = 0;

            let mut entries = tokio::fs::read_dir(&self.dir)
                .await
                .with_context(|| format!("reading status store directory {:?}", self.dir))?;

            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if path.extension().and_then(|e| e.to_str()) != Some("json") {
                    continue;
                }
                let Some(record) = self.read_record(&path).await? else {
                    continue;
                };
                if self.is_expired(&record, now) {
                    match tokio::fs::remove_file(&path).await {
                        Ok(()) => removed += 1,
                        Err(e) if e.kind() == ErrorKind::NotFound => {}
                        Err(e) => return Err(e.into()),
                    }
                }
            }

            if removed > 0 {
                info!(removed, dir = ?self.dir, "purged expired status records (file)");
            }
            Ok(removed)
        })
    }
}
