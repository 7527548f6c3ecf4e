//! Graph crawl handler: derives transfers from the digital twin graph and
//! assembles the per-item containers once a job has finished.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::{debug, info, warn};

use super::visited::VisitedItems;
use crate::assembler::Assembler;
use crate::collaborators::BlobPersistence;
use crate::domain::ItemContainer;
use crate::job::{MultiTransferJob, TransferProcess};
use crate::orchestrator::{RecursiveJobHandler, TransferRequest};
use crate::{Error, Result};

/// [`RecursiveJobHandler`] crawling the relationship tree of a root item.
///
/// Child ids are scheduled at the shallowest depth they are found at and
/// only while that depth stays within the job's `depth` parameter. An item
/// found again on a shorter path is scheduled again, so the crawled subtree
/// does not depend on the order transfers finish in.
pub struct GraphCrawlHandler {
    blobs: Arc<dyn BlobPersistence>,
    visited: VisitedItems,
}

impl GraphCrawlHandler {
    pub fn new(blobs: Arc<dyn BlobPersistence>) -> Self {
        Self {
            blobs,
            visited: VisitedItems::new(),
        }
    }

    pub fn visited(&self) -> &VisitedItems {
        &self.visited
    }
}

/// Load the containers of all completed transfers of `job`, in arrival order.
///
/// Missing or unreadable containers are skipped.
pub async fn load_containers(blobs: &dyn BlobPersistence, job: &MultiTransferJob) -> Vec<ItemContainer> {
    let mut containers = Vec::with_capacity(job.completed_transfers.len());
    for transfer in &job.completed_transfers {
        let key = TransferProcess::blob_key(&transfer.transfer_id);
        match blobs.get(&key).await {
            Ok(Some(bytes)) => match ItemContainer::from_bytes(&bytes) {
                Ok(container) => containers.push(container),
                Err(e) => {
                    warn!(job_id = %job.id, key = %key, error = %e, "Skipping unreadable container")
                }
            },
            Ok(None) => warn!(job_id = %job.id, key = %key, "Container missing, skipping"),
            Err(e) => warn!(job_id = %job.id, key = %key, error = %e, "Failed to load container"),
        }
    }
    containers
}

#[async_trait]
impl RecursiveJobHandler for GraphCrawlHandler {
    async fn initiate(&self, job: &MultiTransferJob) -> Result<Vec<TransferRequest>> {
        let params = &job.parameters;
        let root = params
            .root_item_id()
            .ok_or_else(|| Error::handler("job has no root item id"))?;
        // Reject malformed parameters before anything is crawled.
        params.depth()?;
        params.bom_lifecycle()?;

        self.visited.mark(&job.id, root, 0);
        debug!(job_id = %job.id, root_item_id = %root, "Initiating crawl");
        Ok(vec![TransferRequest::new(
            job.id.clone(),
            root,
            0,
            params.clone(),
        )])
    }

    async fn recurse(
        &self,
        job: &MultiTransferJob,
        transfer: &TransferProcess,
    ) -> Result<Vec<TransferRequest>> {
        let max_depth = job.parameters.depth()?;
        let child_depth = transfer.depth + 1;
        if child_depth > max_depth {
            debug!(
                job_id = %job.id,
                item_id = %transfer.item_id,
                depth = transfer.depth,
                "Depth limit reached, not expanding children"
            );
            return Ok(Vec::new());
        }

        let requests: Vec<TransferRequest> = transfer
            .ids_to_process
            .iter()
            .filter(|child| self.visited.mark(&job.id, child, child_depth))
            .map(|child| {
                TransferRequest::new(
                    job.id.clone(),
                    child.clone(),
                    child_depth,
                    job.parameters.clone(),
                )
            })
            .collect();

        debug!(
            job_id = %job.id,
            item_id = %transfer.item_id,
            found = transfer.ids_to_process.len(),
            scheduled = requests.len(),
            "Expanded transfer"
        );
        Ok(requests)
    }

    async fn complete(&self, job: &MultiTransferJob) -> Result<()> {
        let containers = load_containers(self.blobs.as_ref(), job).await;
        let mut assembler = Assembler::new();
        for container in &containers {
            assembler.add(container);
        }
        let merged = assembler.containers();
        let aggregate = assembler.finish();

        let key = MultiTransferJob::result_key(&job.id);
        self.blobs
            .put(&key, Bytes::from(aggregate.to_bytes()?))
            .await
            .map_err(|e| Error::handler(format!("failed to persist result of job {}: {e}", job.id)))?;
        self.visited.forget(&job.id);

        info!(
            job_id = %job.id,
            containers = merged,
            relationships = aggregate.relationships.len(),
            tombstones = aggregate.tombstones.len(),
            "Assembled job result"
        );
        Ok(())
    }

    fn abandon(&self, job_id: &str) {
        self.visited.forget(job_id);
    }
}
