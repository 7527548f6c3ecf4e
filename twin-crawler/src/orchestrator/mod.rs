//! Orchestration core: the handler contract, the transfer contract and the
//! orchestrator tying them to the job store.

mod handler;
mod job_orchestrator;
mod transfer;

pub use handler::RecursiveJobHandler;
pub use job_orchestrator::{HANDLER_FAILED, JobOrchestrator, OrchestratorConfig, START_FAILED};
pub use transfer::{
    JobInitiateResponse, OnStarted, ResponseStatus, TransferInitiateResponse,
    TransferProcessManager, TransferRequest,
};
