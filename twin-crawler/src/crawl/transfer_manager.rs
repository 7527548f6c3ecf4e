//! In-process transfer execution.
//!
//! Every started transfer runs the item pipeline on its own task, bounded by
//! a semaphore and a timeout. Whatever happens to the work (success, timeout
//! or panic) the transfer persists one container and reports exactly one
//! completion; only a shutdown drops it silently.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::sync::{Semaphore, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use super::pipeline::{ItemContext, ItemPipeline};
use crate::Result;
use crate::collaborators::BlobPersistence;
use crate::domain::{ItemContainer, ProcessStep, Tombstone};
use crate::job::TransferProcess;
use crate::orchestrator::{
    OnStarted, ResponseStatus, TransferInitiateResponse, TransferProcessManager, TransferRequest,
};

/// Configuration for transfer execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    /// Maximum transfers running at the same time.
    pub max_concurrent: usize,
    /// Upper bound for one transfer in seconds (0 disables it).
    pub timeout_secs: u64,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 16,
            timeout_secs: 300,
        }
    }
}

/// [`TransferProcessManager`] running the item pipeline on tokio tasks.
pub struct ItemTransferProcessManager {
    pipeline: Arc<ItemPipeline>,
    blobs: Arc<dyn BlobPersistence>,
    completions: mpsc::UnboundedSender<TransferProcess>,
    semaphore: Arc<Semaphore>,
    timeout: Option<Duration>,
    cancellation_token: CancellationToken,
}

impl ItemTransferProcessManager {
    pub fn new(
        pipeline: ItemPipeline,
        blobs: Arc<dyn BlobPersistence>,
        completions: mpsc::UnboundedSender<TransferProcess>,
        config: &TransferConfig,
        cancellation_token: CancellationToken,
    ) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            blobs,
            completions,
            semaphore: Arc::new(Semaphore::new(config.max_concurrent.max(1))),
            timeout: (config.timeout_secs > 0).then(|| Duration::from_secs(config.timeout_secs)),
            cancellation_token,
        }
    }

    /// Transfers that could start right now without waiting.
    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }
}

impl TransferProcessManager for ItemTransferProcessManager {
    fn initiate(
        &self,
        request: TransferRequest,
        on_started: OnStarted<'_>,
    ) -> Result<TransferInitiateResponse> {
        if self.cancellation_token.is_cancelled() || self.completions.is_closed() {
            debug!(item_id = %request.item_id, "Transfer manager stopped, rejecting request");
            return Ok(TransferInitiateResponse::rejected(ResponseStatus::NotStarted));
        }

        let transfer_id = uuid::Uuid::new_v4().to_string();
        on_started(&transfer_id)?;

        let task = TransferTask {
            transfer_id: transfer_id.clone(),
            request,
            pipeline: Arc::clone(&self.pipeline),
            blobs: Arc::clone(&self.blobs),
            completions: self.completions.clone(),
            semaphore: Arc::clone(&self.semaphore),
            timeout: self.timeout,
            cancellation_token: self.cancellation_token.clone(),
        };
        tokio::spawn(task.run());

        Ok(TransferInitiateResponse::started(transfer_id))
    }
}

struct TransferTask {
    transfer_id: String,
    request: TransferRequest,
    pipeline: Arc<ItemPipeline>,
    blobs: Arc<dyn BlobPersistence>,
    completions: mpsc::UnboundedSender<TransferProcess>,
    semaphore: Arc<Semaphore>,
    timeout: Option<Duration>,
    cancellation_token: CancellationToken,
}

impl TransferTask {
    async fn run(self) {
        let transfer_id = self.transfer_id.clone();
        let item_id = self.request.item_id.clone();

        let _permit = tokio::select! {
            _ = self.cancellation_token.cancelled() => {
                debug!(transfer_id = %transfer_id, "Transfer cancelled before start");
                return;
            }
            permit = Arc::clone(&self.semaphore).acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => {
                    debug!(transfer_id = %transfer_id, "Semaphore closed, dropping transfer");
                    return;
                }
            },
        };

        // The pipeline runs on its own task so a panic surfaces as a join error.
        let pipeline = Arc::clone(&self.pipeline);
        let request = self.request.clone();
        let mut work = tokio::spawn(async move { crawl_item(&pipeline, &request).await });

        let outcome = tokio::select! {
            _ = self.cancellation_token.cancelled() => {
                work.abort();
                debug!(transfer_id = %transfer_id, "Transfer cancelled");
                return;
            }
            outcome = wait_for(&mut work, self.timeout) => outcome,
        };

        let (container, children) = match outcome {
            WorkOutcome::Done(container, children) => (container, children),
            WorkOutcome::TimedOut(limit) => {
                work.abort();
                warn!(transfer_id = %transfer_id, item_id = %item_id, ?limit, "Transfer timed out");
                (
                    failure_container(&item_id, ProcessStep::TransferTimeout, format!("transfer timed out after {limit:?}")),
                    Vec::new(),
                )
            }
            WorkOutcome::Aborted(reason) => {
                error!(transfer_id = %transfer_id, item_id = %item_id, reason = %reason, "Transfer task failed");
                (
                    failure_container(&item_id, ProcessStep::TransferAborted, reason),
                    Vec::new(),
                )
            }
        };

        self.persist(&container).await;

        let result = TransferProcess::new(transfer_id.clone(), item_id, self.request.depth)
            .with_children(children);
        if self.completions.send(result).is_err() {
            debug!(transfer_id = %transfer_id, "Completion receiver dropped");
        }
    }

    async fn persist(&self, container: &ItemContainer) {
        let key = TransferProcess::blob_key(&self.transfer_id);
        let bytes = match container.to_bytes() {
            Ok(bytes) => Bytes::from(bytes),
            Err(e) => {
                warn!(transfer_id = %self.transfer_id, error = %e, "Failed to serialize container");
                return;
            }
        };
        if let Err(e) = self.blobs.put(&key, bytes).await {
            warn!(transfer_id = %self.transfer_id, key = %key, error = %e, "Failed to persist container");
        }
    }
}

enum WorkOutcome {
    Done(ItemContainer, Vec<String>),
    TimedOut(Duration),
    Aborted(String),
}

async fn wait_for(
    work: &mut tokio::task::JoinHandle<(ItemContainer, Vec<String>)>,
    limit: Option<Duration>,
) -> WorkOutcome {
    let joined = match limit {
        Some(limit) => match tokio::time::timeout(limit, &mut *work).await {
            Ok(joined) => joined,
            Err(_) => return WorkOutcome::TimedOut(limit),
        },
        None => (&mut *work).await,
    };
    match joined {
        Ok((container, children)) => WorkOutcome::Done(container, children),
        Err(e) if e.is_panic() => WorkOutcome::Aborted("transfer task panicked".to_string()),
        Err(e) => WorkOutcome::Aborted(e.to_string()),
    }
}

async fn crawl_item(pipeline: &ItemPipeline, request: &TransferRequest) -> (ItemContainer, Vec<String>) {
    match ItemContext::from_request(request) {
        Ok(ctx) => pipeline.run(ctx).await.into_parts(),
        Err(e) => (
            failure_container(&request.item_id, ProcessStep::DigitalTwinRequest, e.to_string()),
            Vec::new(),
        ),
    }
}

fn failure_container(item_id: &str, step: ProcessStep, detail: String) -> ItemContainer {
    ItemContainer {
        tombstones: vec![Tombstone::new(item_id, None, step, detail, 0)],
        ..Default::default()
    }
}
