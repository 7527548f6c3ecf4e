//! Transfer requests and the transfer process manager contract.

use serde::{Deserialize, Serialize};

use crate::Result;
use crate::job::JobParameters;

/// One item to crawl on behalf of a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferRequest {
    pub job_id: String,
    pub item_id: String,
    /// Tree depth of the item (root = 0).
    pub depth: u32,
    /// Parameters of the owning job.
    pub parameters: JobParameters,
}

impl TransferRequest {
    pub fn new(
        job_id: impl Into<String>,
        item_id: impl Into<String>,
        depth: u32,
        parameters: JobParameters,
    ) -> Self {
        Self {
            job_id: job_id.into(),
            item_id: item_id.into(),
            depth,
            parameters,
        }
    }
}

/// Synchronous outcome of starting a transfer or a job.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ResponseStatus {
    Ok,
    /// The manager refused the request (shutting down, saturated, invalid).
    NotStarted,
    FatalError,
}

impl ResponseStatus {
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferInitiateResponse {
    /// Present when the transfer was started.
    pub transfer_id: Option<String>,
    pub status: ResponseStatus,
}

impl TransferInitiateResponse {
    pub fn started(transfer_id: impl Into<String>) -> Self {
        Self {
            transfer_id: Some(transfer_id.into()),
            status: ResponseStatus::Ok,
        }
    }

    pub fn rejected(status: ResponseStatus) -> Self {
        Self {
            transfer_id: None,
            status,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobInitiateResponse {
    pub job_id: String,
    pub status: ResponseStatus,
}

/// Callback invoked with the id of a transfer before its work is scheduled.
pub type OnStarted<'a> = &'a (dyn Fn(&str) -> Result<()> + Send + Sync);

/// Executes transfers off the calling task.
///
/// `initiate` acknowledges synchronously. For a started transfer it must call
/// `on_started` exactly once, before any asynchronous work is scheduled, and
/// later deliver exactly one completion for it. When `on_started` fails the
/// transfer must not be scheduled and the error is returned.
pub trait TransferProcessManager: Send + Sync {
    fn initiate(
        &self,
        request: TransferRequest,
        on_started: OnStarted<'_>,
    ) -> Result<TransferInitiateResponse>;
}
