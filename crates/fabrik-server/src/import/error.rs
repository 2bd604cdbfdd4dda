//! Error taxonomy of the import-job engine
//!
//! Processing failures never cross the engine boundary as panics or ad-hoc
//! strings; they end up either in the job record's `error_message` (fatal
//! batch/adapter errors) or as one of these variants returned to the caller
//! (validation, not-found, invalid transitions).

use thiserror::Error;

use super::types::JobStatus;

pub type Result<T> = std::result::Result<T, ImportError>;

#[derive(Error, Debug)]
pub enum ImportError {
    #[error("validation error: {0}")]
    Validation(String),

    /// Also returned for jobs belonging to another tenant, which must be
    /// indistinguishable from non-existent jobs.
    #[error("job not found")]
    NotFound,

    #[error("job is {0}; only pending/running jobs can be cancelled")]
    NotCancellable(JobStatus),

    #[error("job is {0}; only failed/cancelled jobs can be retried")]
    NotRetryable(JobStatus),

    #[error("source error: {0}")]
    Source(String),

    #[error("batch write failed: {0}")]
    Write(String),

    #[error("job exceeded maximum runtime")]
    Timeout,

    #[error("worker is not running")]
    WorkerUnavailable,

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl ImportError {
    /// Message recorded in the job row when this error fails a job.
    pub fn job_message(&self) -> String {
        self.to_string()
    }
}
