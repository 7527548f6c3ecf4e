use async_trait::async_trait;

use super::transfer::TransferRequest;
use crate::Result;
use crate::job::{MultiTransferJob, TransferProcess};

/// Domain logic plugged into the orchestrator.
///
/// Calls for unrelated jobs may overlap. Any `Err` returned here moves the
/// job to `ERROR` with the detail "handler failed".
#[async_trait]
pub trait RecursiveJobHandler: Send + Sync {
    /// Root requests of a freshly stored job.
    async fn initiate(&self, job: &MultiTransferJob) -> Result<Vec<TransferRequest>>;

    /// Follow-up requests derived from one completed transfer.
    async fn recurse(
        &self,
        job: &MultiTransferJob,
        transfer: &TransferProcess,
    ) -> Result<Vec<TransferRequest>>;

    /// Final aggregation, called once after every transfer finished.
    async fn complete(&self, job: &MultiTransferJob) -> Result<()>;

    /// Drop per-job bookkeeping of a job that ended in `ERROR`.
    fn abandon(&self, _job_id: &str) {}
}
