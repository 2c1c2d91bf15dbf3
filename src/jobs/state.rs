//! Job state machine
//!
//! CREATED → DISPATCHED → RUNNING(mode) → COMPLETED, with FAILED reachable
//! from DISPATCHED and RUNNING. Terminal states admit no transition.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{ExecutionMode, JobError, JobId};

/// Job state enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", tag = "state", content = "mode")]
pub enum JobState {
    /// Submitted, not yet handed to an executor
    Created,
    /// Picked up by the dispatcher, mode not yet started
    Dispatched,
    /// Executing in the given mode
    Running(ExecutionMode),
    /// Output published
    Completed,
    /// Error published
    Failed,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }

    /// Check if transition from this state to `target` is valid
    pub fn can_transition_to(&self, target: JobState) -> bool {
        match (self, target) {
            (JobState::Created, JobState::Dispatched) => true,

            (JobState::Dispatched, JobState::Running(_)) => true,
            (JobState::Dispatched, JobState::Failed) => true,

            (JobState::Running(_), JobState::Completed) => true,
            (JobState::Running(_), JobState::Failed) => true,

            _ => false,
        }
    }
}

/// Lifecycle record of one job
#[derive(Debug, Clone, Serialize)]
pub struct JobRecord {
    pub job_id: JobId,
    pub state: JobState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JobRecord {
    pub fn new(job_id: JobId) -> Self {
        let now = Utc::now();
        Self {
            job_id,
            state: JobState::Created,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn transition(&mut self, target: JobState) -> Result<(), JobError> {
        if !self.state.can_transition_to(target) {
            return Err(JobError::InvalidTransition {
                from: self.state,
                to: target,
            });
        }
        self.state = target;
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }
}
