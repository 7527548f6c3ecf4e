//! Job orchestrator driving fan-out and fan-in of transfers.
//!
//! The orchestrator is responsible for:
//! - Storing new jobs and issuing their root transfers
//! - Reacting to transfer completions and issuing follow-up transfers
//! - Detecting the end of a job exactly once and finalizing it
//! - Converting handler failures into job-level `ERROR`
//!
//! Per-job ordering comes from the store's guarded operations only; callbacks
//! for the same or different jobs may run concurrently.

use std::sync::Arc;

use dashmap::DashSet;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::handler::RecursiveJobHandler;
use super::transfer::{
    JobInitiateResponse, ResponseStatus, TransferProcessManager, TransferRequest,
};
use crate::{Error, Result};
use crate::job::{JobParameters, JobState, JobStore, MultiTransferJob, TransferProcess};

/// Error detail recorded when a handler operation fails.
pub const HANDLER_FAILED: &str = "handler failed";

/// Error detail recorded when a follow-up transfer could not be started.
pub const START_FAILED: &str = "failed to start a transfer";

/// Configuration for the orchestrator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Mark the job `ERROR` when one of its root transfers cannot be started.
    pub error_on_initial_start_failure: bool,
}

/// Removes a transfer id from the in-flight set when dropped.
struct InFlightGuard<'a> {
    set: &'a DashSet<String>,
    transfer_id: String,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.set.remove(&self.transfer_id);
    }
}

/// Drives jobs from creation to a terminal state.
pub struct JobOrchestrator {
    store: Arc<dyn JobStore>,
    handler: Arc<dyn RecursiveJobHandler>,
    transfers: Arc<dyn TransferProcessManager>,
    config: OrchestratorConfig,
    /// Transfer ids whose completion is being processed right now.
    in_flight: DashSet<String>,
}

impl JobOrchestrator {
    pub fn new(
        store: Arc<dyn JobStore>,
        handler: Arc<dyn RecursiveJobHandler>,
        transfers: Arc<dyn TransferProcessManager>,
    ) -> Self {
        Self::with_config(store, handler, transfers, OrchestratorConfig::default())
    }

    pub fn with_config(
        store: Arc<dyn JobStore>,
        handler: Arc<dyn RecursiveJobHandler>,
        transfers: Arc<dyn TransferProcessManager>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            store,
            handler,
            transfers,
            config,
            in_flight: DashSet::new(),
        }
    }

    pub fn store(&self) -> &Arc<dyn JobStore> {
        &self.store
    }

    /// Create a job and issue its root transfers.
    ///
    /// A non-OK start status stops the fan-out and is returned as is;
    /// transfers started before it keep running. `Err` is reserved for fatal
    /// store errors.
    pub async fn start_job(&self, parameters: JobParameters) -> Result<JobInitiateResponse> {
        let job = self.store.create(MultiTransferJob::new(parameters))?;
        let job_id = job.id.clone();
        info!(job_id = %job_id, "Created job");

        let requests = match self.handler.initiate(&job).await {
            Ok(requests) => requests,
            Err(e) => {
                error!(job_id = %job_id, error = %e, "Handler failed to initiate job");
                self.fail_job(&job_id, HANDLER_FAILED)?;
                return Ok(JobInitiateResponse {
                    job_id,
                    status: ResponseStatus::FatalError,
                });
            }
        };

        let total = requests.len();
        let mut started = 0usize;
        for request in requests {
            let status = self.start_transfer(&job_id, request)?;
            if !status.is_ok() {
                warn!(
                    job_id = %job_id,
                    status = %status,
                    started,
                    total,
                    "Root transfer not started, stopping fan-out"
                );
                if self.config.error_on_initial_start_failure {
                    self.fail_job(&job_id, START_FAILED)?;
                }
                return Ok(JobInitiateResponse { job_id, status });
            }
            started += 1;
        }

        info!(job_id = %job_id, transfers = started, "Job started");

        if started == 0 {
            debug!(job_id = %job_id, "No root transfers, completing job");
            self.complete_job(&job_id).await?;
        }

        Ok(JobInitiateResponse {
            job_id,
            status: ResponseStatus::Ok,
        })
    }

    /// Handle the completion of one transfer.
    ///
    /// Unknown transfers and duplicates are dropped. Completions for jobs
    /// that are no longer `IN_PROGRESS` are recorded but not expanded.
    /// Handler and start failures end the job in `ERROR`; only fatal store
    /// errors are returned.
    pub async fn transfer_completed(&self, transfer: TransferProcess) -> Result<()> {
        let transfer_id = transfer.transfer_id.clone();
        if !self.in_flight.insert(transfer_id.clone()) {
            debug!(transfer_id = %transfer_id, "Completion already being processed, dropping duplicate");
            return Ok(());
        }
        let _guard = InFlightGuard {
            set: &self.in_flight,
            transfer_id: transfer_id.clone(),
        };

        let Some(job) = self.store.find_by_transfer_id(&transfer_id)? else {
            info!(transfer_id = %transfer_id, "No job waiting for transfer, ignoring completion");
            return Ok(());
        };
        let job_id = job.id.clone();

        if job.state != JobState::InProgress {
            debug!(
                job_id = %job_id,
                transfer_id = %transfer_id,
                state = %job.state,
                "Job not in progress, recording completion without expanding it"
            );
            self.store.complete_transfer(&job_id, transfer)?;
            return Ok(());
        }

        let requests = match self.handler.recurse(&job, &transfer).await {
            Ok(requests) => requests,
            Err(e) => {
                error!(
                    job_id = %job_id,
                    transfer_id = %transfer_id,
                    error = %e,
                    "Handler failed to expand transfer"
                );
                self.fail_job(&job_id, HANDLER_FAILED)?;
                self.store.complete_transfer(&job_id, transfer)?;
                return Ok(());
            }
        };

        let follow_ups = requests.len();
        for request in requests {
            let status = self.start_transfer(&job_id, request)?;
            if !status.is_ok() {
                error!(
                    job_id = %job_id,
                    transfer_id = %transfer_id,
                    status = %status,
                    "Follow-up transfer not started"
                );
                self.fail_job(&job_id, START_FAILED)?;
                self.store.complete_transfer(&job_id, transfer)?;
                return Ok(());
            }
        }

        // Follow-ups are registered before the finished transfer is removed,
        // so the outstanding set never runs empty while work remains.
        let Some(updated) = self.store.complete_transfer(&job_id, transfer)? else {
            return Ok(());
        };

        debug!(
            job_id = %job_id,
            transfer_id = %transfer_id,
            follow_ups,
            outstanding = updated.outstanding_transfer_ids.len(),
            "Transfer completed"
        );

        match updated.state {
            JobState::TransfersFinished => self.complete_job(&job_id).await?,
            // The job failed while this transfer was being expanded.
            JobState::Error => self.handler.abandon(&job_id),
            _ => {}
        }
        Ok(())
    }

    /// Finalize a job whose transfers are all finished.
    pub async fn complete_job(&self, job_id: &str) -> Result<()> {
        let Some(job) = self.store.find(job_id)? else {
            warn!(job_id = %job_id, "Unknown job, nothing to complete");
            return Ok(());
        };

        match self.handler.complete(&job).await {
            Ok(()) => {
                if let Some(done) = self.store.complete_job(job_id)? {
                    info!(
                        job_id = %job_id,
                        transfers = done.completed_transfers.len(),
                        "Job completed"
                    );
                }
                Ok(())
            }
            Err(e) => {
                error!(job_id = %job_id, error = %e, "Handler failed to complete job");
                self.fail_job(job_id, HANDLER_FAILED)
            }
        }
    }

    /// Drain completions until the channel closes or `cancel` fires.
    ///
    /// Each completion is handled on its own task; fatal errors are logged.
    pub async fn run_completion_loop(
        self: Arc<Self>,
        mut completions: mpsc::UnboundedReceiver<TransferProcess>,
        cancel: CancellationToken,
    ) {
        let mut tasks = JoinSet::new();
        info!("Completion loop started");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Completion loop cancelled");
                    break;
                }
                next = completions.recv() => {
                    let Some(transfer) = next else {
                        debug!("Completion channel closed");
                        break;
                    };
                    let orchestrator = Arc::clone(&self);
                    tasks.spawn(async move {
                        let transfer_id = transfer.transfer_id.clone();
                        if let Err(e) = orchestrator.transfer_completed(transfer).await {
                            error!(transfer_id = %transfer_id, error = %e, "Fatal error while handling completion");
                        }
                    });
                }
            }

            while let Some(result) = tasks.try_join_next() {
                if let Err(e) = result {
                    error!(error = %e, "Completion task panicked");
                }
            }
        }

        while let Some(result) = tasks.join_next().await {
            if let Err(e) = result {
                error!(error = %e, "Completion task panicked");
            }
        }
        info!("Completion loop stopped");
    }

    fn start_transfer(&self, job_id: &str, request: TransferRequest) -> Result<ResponseStatus> {
        let item_id = request.item_id.clone();
        let store = Arc::clone(&self.store);
        let owner = job_id.to_string();
        let on_started = move |transfer_id: &str| store.add_transfer(&owner, transfer_id);

        let response = self.transfers.initiate(request, &on_started)?;
        match &response.transfer_id {
            Some(transfer_id) if response.status.is_ok() => {
                debug!(job_id = %job_id, transfer_id = %transfer_id, item_id = %item_id, "Started transfer");
            }
            _ => {
                warn!(job_id = %job_id, item_id = %item_id, status = %response.status, "Transfer not started");
            }
        }
        Ok(response.status)
    }

    fn fail_job(&self, job_id: &str, detail: &str) -> Result<()> {
        match self.store.mark_error(job_id, detail) {
            Ok(Some(_)) => {
                warn!(job_id = %job_id, detail = %detail, "Job failed");
                self.handler.abandon(job_id);
                Ok(())
            }
            Ok(None) => Ok(()),
            // Root transfers may finish the job while the fan-out is still running.
            Err(Error::InvalidStateTransition { from, .. }) => {
                warn!(job_id = %job_id, state = %from, detail = %detail, "Job already finished, not marking as error");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}
