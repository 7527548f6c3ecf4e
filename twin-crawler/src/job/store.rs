//! Concurrent keyed storage for job records.
//!
//! Every mutation runs under the lock of the job it touches, so operations on
//! the same job are linearized while unrelated jobs proceed in parallel. Lock
//! acquisition is bounded; running out of time is reported as
//! [`Error::LockTimeout`] instead of being retried.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::model::{MultiTransferJob, TransferProcess};
use super::state::JobState;
use crate::{Error, Result};

/// Configuration for the job store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Upper bound for acquiring the lock of one job, in milliseconds.
    pub lock_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            lock_timeout_ms: 10_000,
        }
    }
}

/// Guarded job storage used by the orchestrator.
///
/// Lookups return `Ok(None)` on a miss. `Err` is reserved for fatal
/// conditions: lock timeouts and invalid state transitions.
pub trait JobStore: Send + Sync {
    /// Store a new `UNSAVED` job and move it to `INITIAL`.
    fn create(&self, job: MultiTransferJob) -> Result<MultiTransferJob>;

    fn find(&self, job_id: &str) -> Result<Option<MultiTransferJob>>;

    /// Find the job that still has `transfer_id` outstanding.
    fn find_by_transfer_id(&self, transfer_id: &str) -> Result<Option<MultiTransferJob>>;

    /// Register a started transfer (`INITIAL|IN_PROGRESS -> IN_PROGRESS`).
    ///
    /// Unknown or already terminal jobs are skipped with a warning.
    fn add_transfer(&self, job_id: &str, transfer_id: &str) -> Result<()>;

    /// Record a finished transfer, possibly moving the job to
    /// `TRANSFERS_FINISHED`. Returns `None` when nothing was recorded.
    fn complete_transfer(
        &self,
        job_id: &str,
        transfer: TransferProcess,
    ) -> Result<Option<MultiTransferJob>>;

    /// `TRANSFERS_FINISHED|INITIAL -> COMPLETED`.
    fn complete_job(&self, job_id: &str) -> Result<Option<MultiTransferJob>>;

    /// Move a non-terminal job to `ERROR` with `detail`.
    fn mark_error(&self, job_id: &str, detail: &str) -> Result<Option<MultiTransferJob>>;

    /// All jobs, newest first.
    fn list(&self) -> Result<Vec<MultiTransferJob>>;
}

/// In-memory [`JobStore`] with one lock per job.
pub struct InMemoryJobStore {
    jobs: DashMap<String, Arc<Mutex<MultiTransferJob>>>,
    /// Outstanding transfer id -> owning job id.
    transfer_index: DashMap<String, String>,
    lock_timeout: Duration,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::with_config(&StoreConfig::default())
    }

    pub fn with_config(config: &StoreConfig) -> Self {
        Self {
            jobs: DashMap::new(),
            transfer_index: DashMap::new(),
            lock_timeout: Duration::from_millis(config.lock_timeout_ms),
        }
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Run `op` on the locked record of `job_id`.
    ///
    /// The map guard is released before the job lock is taken, so no shard
    /// lock is ever held while waiting on a job.
    fn with_job<R>(
        &self,
        job_id: &str,
        op: impl FnOnce(&mut MultiTransferJob) -> Result<R>,
    ) -> Result<Option<R>> {
        let Some(slot) = self.jobs.get(job_id).map(|entry| Arc::clone(entry.value())) else {
            return Ok(None);
        };
        let mut guard = slot
            .try_lock_for(self.lock_timeout)
            .ok_or_else(|| Error::LockTimeout {
                job_id: job_id.to_string(),
                waited_ms: self.lock_timeout.as_millis() as u64,
            })?;
        op(&mut guard).map(Some)
    }
}

impl Default for InMemoryJobStore {
    fn default() -> Self {
        Self::new()
    }
}

impl JobStore for InMemoryJobStore {
    fn create(&self, mut job: MultiTransferJob) -> Result<MultiTransferJob> {
        if job.state != JobState::Unsaved {
            return Err(Error::invalid_transition(job.state, JobState::Initial));
        }
        job.mark_saved()?;

        match self.jobs.entry(job.id.clone()) {
            Entry::Occupied(_) => Err(Error::Other(format!("job {} already exists", job.id))),
            Entry::Vacant(slot) => {
                slot.insert(Arc::new(Mutex::new(job.clone())));
                debug!(job_id = %job.id, "Stored new job");
                Ok(job)
            }
        }
    }

    fn find(&self, job_id: &str) -> Result<Option<MultiTransferJob>> {
        self.with_job(job_id, |job| Ok(job.clone()))
    }

    fn find_by_transfer_id(&self, transfer_id: &str) -> Result<Option<MultiTransferJob>> {
        let Some(job_id) = self
            .transfer_index
            .get(transfer_id)
            .map(|entry| entry.value().clone())
        else {
            return Ok(None);
        };

        // The index entry may be stale by the time the job lock is held.
        let found = self.with_job(&job_id, |job| {
            Ok(job
                .is_transfer_outstanding(transfer_id)
                .then(|| job.clone()))
        })?;
        Ok(found.flatten())
    }

    fn add_transfer(&self, job_id: &str, transfer_id: &str) -> Result<()> {
        let added = self.with_job(job_id, |job| {
            if job.state.is_terminal() {
                return Ok(false);
            }
            job.add_transfer(transfer_id)?;
            self.transfer_index
                .insert(transfer_id.to_string(), job_id.to_string());
            Ok(true)
        })?;

        match added {
            Some(true) => {
                debug!(job_id = %job_id, transfer_id = %transfer_id, "Registered transfer");
            }
            Some(false) => {
                warn!(
                    job_id = %job_id,
                    transfer_id = %transfer_id,
                    "Job already terminal, transfer not registered"
                );
            }
            None => {
                warn!(
                    job_id = %job_id,
                    transfer_id = %transfer_id,
                    "Unknown job, transfer not registered"
                );
            }
        }
        Ok(())
    }

    fn complete_transfer(
        &self,
        job_id: &str,
        transfer: TransferProcess,
    ) -> Result<Option<MultiTransferJob>> {
        let transfer_id = transfer.transfer_id.clone();
        let updated = self.with_job(job_id, |job| {
            if !job.complete_transfer(transfer)? {
                return Ok(None);
            }
            self.transfer_index.remove(&transfer_id);
            Ok(Some(job.clone()))
        })?;

        match updated {
            None => {
                warn!(job_id = %job_id, transfer_id = %transfer_id, "Unknown job, completion not recorded");
                Ok(None)
            }
            Some(None) => {
                warn!(
                    job_id = %job_id,
                    transfer_id = %transfer_id,
                    "Transfer not outstanding, completion not recorded"
                );
                Ok(None)
            }
            Some(job) => Ok(job),
        }
    }

    fn complete_job(&self, job_id: &str) -> Result<Option<MultiTransferJob>> {
        let completed = self.with_job(job_id, |job| {
            job.complete()?;
            Ok(job.clone())
        })?;
        if completed.is_none() {
            warn!(job_id = %job_id, "Unknown job, cannot complete");
        }
        Ok(completed)
    }

    fn mark_error(&self, job_id: &str, detail: &str) -> Result<Option<MultiTransferJob>> {
        let failed = self.with_job(job_id, |job| {
            job.fail(detail)?;
            Ok(job.clone())
        })?;
        if failed.is_none() {
            warn!(job_id = %job_id, detail = %detail, "Unknown job, cannot mark as error");
        }
        Ok(failed)
    }

    fn list(&self) -> Result<Vec<MultiTransferJob>> {
        let ids: Vec<String> = self.jobs.iter().map(|entry| entry.key().clone()).collect();
        let mut jobs = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(job) = self.find(&id)? {
                jobs.push(job);
            }
        }
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(jobs)
    }
}
