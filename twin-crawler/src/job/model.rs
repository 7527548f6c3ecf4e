//! Job record and transfer payloads.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::parameters::JobParameters;
use super::state::{JobState, transition};
use crate::Result;

/// Result reported by one finished transfer.
///
/// The full per-item container lives in the blob store under
/// [`TransferProcess::blob_key`]; the job only keeps what recursion needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferProcess {
    pub transfer_id: String,
    /// Item crawled by this transfer.
    pub item_id: String,
    /// Tree depth of the crawled item (root = 0).
    pub depth: u32,
    /// Unique child item ids discovered by the transfer.
    pub ids_to_process: Vec<String>,
}

impl TransferProcess {
    pub fn new(transfer_id: impl Into<String>, item_id: impl Into<String>, depth: u32) -> Self {
        Self {
            transfer_id: transfer_id.into(),
            item_id: item_id.into(),
            depth,
            ids_to_process: Vec::new(),
        }
    }

    pub fn with_children(mut self, ids: Vec<String>) -> Self {
        self.ids_to_process = ids;
        self
    }

    /// Blob key of the item container produced by a transfer.
    pub fn blob_key(transfer_id: &str) -> String {
        format!("transfer/{transfer_id}")
    }
}

/// One logical crawl with its own state machine and accumulated results.
///
/// Mutated only through the [`JobStore`](super::JobStore) guarded operations;
/// the methods below apply one validated change to a locked record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MultiTransferJob {
    pub id: String,
    pub state: JobState,
    pub parameters: JobParameters,
    /// Transfers started but not yet reported back.
    pub outstanding_transfer_ids: BTreeSet<String>,
    /// Transfers reported back, in arrival order.
    pub completed_transfers: Vec<TransferProcess>,
    /// Set only when `state == ERROR`.
    pub error_detail: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_modified_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl MultiTransferJob {
    /// Build an unsaved job with a fresh identifier.
    pub fn new(parameters: JobParameters) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            state: JobState::Unsaved,
            parameters,
            outstanding_transfer_ids: BTreeSet::new(),
            completed_transfers: Vec::new(),
            error_detail: None,
            created_at: now,
            last_modified_at: now,
            completed_at: None,
        }
    }

    /// Blob key of the assembled result of a job.
    pub fn result_key(job_id: &str) -> String {
        format!("job/{job_id}")
    }

    pub fn is_transfer_outstanding(&self, transfer_id: &str) -> bool {
        self.outstanding_transfer_ids.contains(transfer_id)
    }

    pub fn is_transfer_completed(&self, transfer_id: &str) -> bool {
        self.completed_transfers
            .iter()
            .any(|t| t.transfer_id == transfer_id)
    }

    fn move_to(&mut self, target: JobState) -> Result<()> {
        self.state = transition(self.state, target)?;
        self.last_modified_at = Utc::now();
        if self.state.is_terminal() {
            self.completed_at = Some(self.last_modified_at);
        }
        Ok(())
    }

    pub(crate) fn mark_saved(&mut self) -> Result<()> {
        self.move_to(JobState::Initial)
    }

    pub(crate) fn add_transfer(&mut self, transfer_id: &str) -> Result<()> {
        self.move_to(JobState::InProgress)?;
        self.outstanding_transfer_ids.insert(transfer_id.to_string());
        Ok(())
    }

    /// Move `transfer` from outstanding to completed.
    ///
    /// Returns `false` without touching the record when the transfer is not
    /// outstanding (duplicate or unknown completion). Only an `IN_PROGRESS`
    /// job advances to `TRANSFERS_FINISHED`; a job already in `ERROR` still
    /// records the result so the two sets stay disjoint.
    pub(crate) fn complete_transfer(&mut self, transfer: TransferProcess) -> Result<bool> {
        if !self.is_transfer_outstanding(&transfer.transfer_id) {
            return Ok(false);
        }
        if self.state == JobState::InProgress && self.outstanding_transfer_ids.len() == 1 {
            self.move_to(JobState::TransfersFinished)?;
        } else {
            self.last_modified_at = Utc::now();
        }
        self.outstanding_transfer_ids.remove(&transfer.transfer_id);
        self.completed_transfers.push(transfer);
        Ok(true)
    }

    pub(crate) fn complete(&mut self) -> Result<()> {
        self.move_to(JobState::Completed)
    }

    pub(crate) fn fail(&mut self, detail: impl Into<String>) -> Result<()> {
        self.move_to(JobState::Error)?;
        self.error_detail = Some(detail.into());
        Ok(())
    }
}
