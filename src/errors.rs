use thiserror::Error;

use crate::api::ApiError;

#[derive(Debug, Error)]
pub enum JobError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Submission failed: {0}")]
    Submission(String),

    #[error("Status poll failed: {0}")]
    Poll(String),

    #[error("Timeout: job {job_id} not ready after {attempts} attempts")]
    Timeout { job_id: String, attempts: u32 },

    #[error("Job {job_id} failed: {error}")]
    RemoteJobFailure { job_id: String, error: String },

    #[error("Job {0} is no longer tracked")]
    Untracked(String),

    #[error("Cancel failed: {0}")]
    Cancel(String),

    #[error("Delete failed: {0}")]
    Delete(String),

    #[error("Catalog fetch failed: {0}")]
    Catalog(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Jobs API unreachable: {0}")]
    Unreachable(String),
}

impl JobError {
    pub fn submission(err: ApiError) -> Self {
        Self::from_api(err, JobError::Submission)
    }

    pub fn poll(err: ApiError) -> Self {
        JobError::Poll(err.to_string())
    }

    pub fn cancel(err: ApiError) -> Self {
        Self::from_api(err, JobError::Cancel)
    }

    pub fn delete(err: ApiError) -> Self {
        Self::from_api(err, JobError::Delete)
    }

    pub fn catalog(err: ApiError) -> Self {
        Self::from_api(err, JobError::Catalog)
    }

    fn from_api(err: ApiError, wrap: fn(String) -> JobError) -> Self {
        if err.is_unreachable() {
            JobError::Unreachable(err.to_string())
        } else {
            wrap(err.to_string())
        }
    }

    /// True for errors that leave the remote job possibly still running.
    pub fn is_timeout(&self) -> bool {
        matches!(self, JobError::Timeout { .. })
    }
}

impl From<serde_json::Error> for JobError {
    fn from(err: serde_json::Error) -> Self {
        JobError::Config(err.to_string())
    }
}
