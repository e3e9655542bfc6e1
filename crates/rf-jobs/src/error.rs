//! Error types for rf-jobs

use crate::state::JobState;
use thiserror::Error;
use uuid::Uuid;

/// Orchestration errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum OrchestrationError {
    /// J001: no job with this id
    #[error("[J001] Job not found: {0}")]
    JobNotFound(Uuid),

    /// J002: the state machine forbids this move
    #[error("[J002] Invalid transition for job {job_id}: {from} -> {to}")]
    InvalidTransition {
        job_id: Uuid,
        from: JobState,
        to: JobState,
    },

    /// J003: the job already reached a terminal state
    #[error("[J003] Job {job_id} is already {state}")]
    AlreadyTerminal { job_id: Uuid, state: JobState },

    /// J004: a report was requested before the job finished
    #[error("[J004] Job {job_id} has not finished (state {state})")]
    JobNotFinished { job_id: Uuid, state: JobState },

    /// J005: the submission was rejected before a job was created
    #[error("[J005] Invalid request: {message}")]
    InvalidRequest { message: String },

    /// J006: the job store failed
    #[error("[J006] Job store error: {message}")]
    Store { message: String },

    /// J007: the worker pool has been shut down
    #[error("[J007] Orchestrator is shut down")]
    ShutDown,

    /// J008: metrics could not be written out
    #[error("[J008] Failed to export metrics to {path}: {message}")]
    MetricsExport { path: String, message: String },
}

impl OrchestrationError {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        OrchestrationError::InvalidRequest {
            message: message.into(),
        }
    }
}

/// Result type alias for OrchestrationError
pub type OrchestrationResult<T> = Result<T, OrchestrationError>;
