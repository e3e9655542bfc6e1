//! Error types for rf-exec

use rf_db::DbError;
use thiserror::Error;

/// Plan execution errors
#[derive(Error, Debug)]
pub enum ExecutionError {
    /// X001: malformed source row in strict mode; nothing was written
    #[error("[X001] Data integrity violation: {message}")]
    DataIntegrity { message: String },

    /// X002: the source or target stopped answering
    #[error("[X002] Connection lost: {message}")]
    ConnectionLost { message: String },

    /// X003: the job ran past its deadline
    #[error("[X003] Execution timed out after {seconds}s")]
    Timeout { seconds: u64 },

    /// X004: cancellation observed at a batch boundary
    #[error("[X004] Execution cancelled after {batches} batches")]
    Cancelled { batches: u64 },

    /// X005: batch size must be positive
    #[error("[X005] Invalid batch size {0}: must be greater than 0")]
    InvalidBatchSize(usize),

    /// X006: the plan cannot run with this registry or spec
    #[error("[X006] Invalid plan: {message}")]
    InvalidPlan { message: String },

    /// X007: any other data handle failure
    #[error("[X007] Storage error: {0}")]
    Storage(DbError),
}

impl From<DbError> for ExecutionError {
    fn from(err: DbError) -> Self {
        if err.is_connection() {
            ExecutionError::ConnectionLost {
                message: err.to_string(),
            }
        } else {
            ExecutionError::Storage(err)
        }
    }
}

/// Result type alias for ExecutionError
pub type ExecResult<T> = Result<T, ExecutionError>;
