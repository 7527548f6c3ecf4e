//! Read-side view of jobs and their results.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::assembler::assemble;
use crate::collaborators::BlobPersistence;
use crate::crawl::load_containers;
use crate::domain::ItemContainer;
use crate::job::{JobParameters, JobState, JobStore, MultiTransferJob};
use crate::{Error, Result};

/// Job record without its transfer lists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSnapshot {
    pub id: String,
    pub state: JobState,
    pub parameters: JobParameters,
    pub error_detail: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_modified_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<&MultiTransferJob> for JobSnapshot {
    fn from(job: &MultiTransferJob) -> Self {
        Self {
            id: job.id.clone(),
            state: job.state,
            parameters: job.parameters.clone(),
            error_detail: job.error_detail.clone(),
            created_at: job.created_at,
            last_modified_at: job.last_modified_at,
            completed_at: job.completed_at,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSummary {
    pub completed_transfers: usize,
    pub outstanding_transfers: usize,
    /// Tombstones in the returned result (0 when no result is returned).
    pub tombstones: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobView {
    pub job: JobSnapshot,
    pub summary: JobSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<ItemContainer>,
}

/// Looks up jobs and their assembled results.
pub struct JobQueryService {
    store: Arc<dyn JobStore>,
    blobs: Arc<dyn BlobPersistence>,
}

impl JobQueryService {
    pub fn new(store: Arc<dyn JobStore>, blobs: Arc<dyn BlobPersistence>) -> Self {
        Self { store, blobs }
    }

    /// View of one job.
    ///
    /// A `COMPLETED` job carries its persisted aggregate. Any other job
    /// carries the assembly of its completed transfers when `include_partial`
    /// is set, and no result otherwise.
    pub async fn get_job(&self, job_id: &str, include_partial: bool) -> Result<JobView> {
        let job = self
            .store
            .find(job_id)?
            .ok_or_else(|| Error::JobNotFound(job_id.to_string()))?;

        let result = if job.state == JobState::Completed {
            self.load_result(&job).await
        } else if include_partial {
            let containers = load_containers(self.blobs.as_ref(), &job).await;
            Some(assemble(&containers))
        } else {
            None
        };

        let summary = JobSummary {
            completed_transfers: job.completed_transfers.len(),
            outstanding_transfers: job.outstanding_transfer_ids.len(),
            tombstones: result.as_ref().map_or(0, |r| r.tombstones.len()),
        };

        Ok(JobView {
            job: JobSnapshot::from(&job),
            summary,
            result,
        })
    }

    /// Jobs in one of `states` (all jobs when empty), newest first.
    pub fn list_jobs(&self, states: &[JobState]) -> Result<Vec<JobSnapshot>> {
        Ok(self
            .store
            .list()?
            .iter()
            .filter(|job| states.is_empty() || states.contains(&job.state))
            .map(JobSnapshot::from)
            .collect())
    }

    async fn load_result(&self, job: &MultiTransferJob) -> Option<ItemContainer> {
        let key = MultiTransferJob::result_key(&job.id);
        match self.blobs.get(&key).await {
            Ok(Some(bytes)) => match ItemContainer::from_bytes(&bytes) {
                Ok(result) => Some(result),
                Err(e) => {
                    warn!(job_id = %job.id, error = %e, "Stored job result is unreadable");
                    None
                }
            },
            Ok(None) => {
                warn!(job_id = %job.id, "Completed job has no stored result");
                None
            }
            Err(e) => {
                warn!(job_id = %job.id, error = %e, "Failed to load job result");
                None
            }
        }
    }
}
