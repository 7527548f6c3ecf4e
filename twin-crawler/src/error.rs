//! Crate-wide error types.

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Crate-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Failure of a remote collaborator call after the transport layer gave up.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{endpoint}: {message} (after {retries} retries)")]
pub struct TransportError {
    /// Endpoint (registry or submodel address) that was attempted.
    pub endpoint: String,
    /// Human-readable cause.
    pub message: String,
    /// Retries already spent before giving up.
    pub retries: u32,
}

impl TransportError {
    pub fn new(endpoint: impl Into<String>, message: impl Into<String>, retries: u32) -> Self {
        Self {
            endpoint: endpoint.into(),
            message: message.into(),
            retries,
        }
    }
}

/// Crate-wide error type.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid state transition: cannot transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Timed out after {waited_ms}ms waiting for the lock of job {job_id}")]
    LockTimeout { job_id: String, waited_ms: u64 },

    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Handler error: {0}")]
    Handler(String),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("IO error while {op} {}: {source}", .path.display())]
    IoPath {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn invalid_transition(from: impl ToString, to: impl ToString) -> Self {
        Self::InvalidStateTransition {
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    pub fn handler(msg: impl Into<String>) -> Self {
        Self::Handler(msg.into())
    }

    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn io_path(op: &'static str, path: &Path, source: std::io::Error) -> Self {
        Self::IoPath {
            op,
            path: path.to_path_buf(),
            source,
        }
    }

    /// Programmer or operational errors that must reach the caller instead of
    /// being folded into a job's `ERROR` state.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::InvalidStateTransition { .. } | Self::LockTimeout { .. }
        )
    }
}
