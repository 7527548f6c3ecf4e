//! Job lifecycle states and the transition table.

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Lifecycle state of a [`MultiTransferJob`](super::MultiTransferJob).
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
    strum::EnumIter,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    /// Built in memory, not yet handed to the store.
    Unsaved,
    /// Stored, no transfer started yet.
    Initial,
    /// At least one transfer started and not all of them reported back.
    InProgress,
    /// Every started transfer reported back; waiting for final assembly.
    TransfersFinished,
    /// Final assembly succeeded.
    Completed,
    /// The job stopped advancing; see the job's error detail.
    Error,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unsaved => "UNSAVED",
            Self::Initial => "INITIAL",
            Self::InProgress => "IN_PROGRESS",
            Self::TransfersFinished => "TRANSFERS_FINISHED",
            Self::Completed => "COMPLETED",
            Self::Error => "ERROR",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "UNSAVED" => Some(Self::Unsaved),
            "INITIAL" => Some(Self::Initial),
            "IN_PROGRESS" => Some(Self::InProgress),
            "TRANSFERS_FINISHED" => Some(Self::TransfersFinished),
            "COMPLETED" => Some(Self::Completed),
            "ERROR" => Some(Self::Error),
            _ => None,
        }
    }

    /// Check if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }
}

/// Validate a state change and return the new state.
///
/// `IN_PROGRESS -> IN_PROGRESS` registers one more transfer while others are
/// pending, `ERROR -> ERROR` lets a later error detail overwrite an earlier
/// one. Every other edge not listed here is rejected and the caller keeps the
/// current state.
pub fn transition(current: JobState, target: JobState) -> Result<JobState> {
    match (current, target) {
        (JobState::Unsaved, JobState::Initial)
        | (JobState::Initial, JobState::InProgress)
        | (JobState::InProgress, JobState::InProgress)
        | (JobState::InProgress, JobState::TransfersFinished)
        | (JobState::Initial, JobState::Completed)
        | (JobState::TransfersFinished, JobState::Completed)
        | (JobState::Initial, JobState::Error)
        | (JobState::InProgress, JobState::Error)
        | (JobState::TransfersFinished, JobState::Error)
        | (JobState::Error, JobState::Error) => Ok(target),
        _ => Err(Error::invalid_transition(current, target)),
    }
}
