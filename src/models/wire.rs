// Request and response bodies of the jobs API.

use serde::{Deserialize, Serialize};

use crate::api::ApiError;
use crate::models::job::{
    ExecutionId, JobKind, JobResult, JobStatus, Observation, ProgressMeta, RecordId,
};

/// Success/failure envelope wrapping every response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope<T> {
    #[serde(rename = "isSuccess")]
    pub is_success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> Envelope<T> {
    pub fn ok(data: T) -> Self {
        Self {
            is_success: true,
            message: None,
            data: Some(data),
        }
    }

    pub fn failure(message: &str) -> Self {
        Self {
            is_success: false,
            message: Some(message.to_string()),
            data: None,
        }
    }

    pub fn into_result(self) -> Result<T, ApiError> {
        if !self.is_success {
            return Err(ApiError::Rejected(
                self.message
                    .unwrap_or_else(|| "request was not successful".to_string()),
            ));
        }
        self.data
            .ok_or_else(|| ApiError::Decode("successful response carried no data".to_string()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FileEmbeddingRequest {
    pub file_id: String,
    pub model_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TextEmbeddingRequest {
    pub text: String,
    pub model_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SubmitResponse {
    pub job_id: ExecutionId,
    #[serde(default)]
    pub metadata: Option<ProgressMeta>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatusResponse {
    pub job_id: ExecutionId,
    pub status: JobStatus,
    #[serde(default)]
    pub ready: bool,
    #[serde(default)]
    pub successful: bool,
    #[serde(default)]
    pub failed: bool,
    #[serde(default)]
    pub result: Option<JobResult>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub meta: Option<ProgressMeta>,
    #[serde(default)]
    pub task_type: Option<String>,
}

impl StatusResponse {
    /// The derived flags always follow `status`; the wire booleans are
    /// informational only.
    pub fn into_observation(self, seq: u64) -> Observation {
        let status = self.status;
        let mut obs = Observation {
            job_id: self.job_id,
            seq,
            status,
            kind: self.task_type.as_deref().and_then(JobKind::from_task_type),
            result: if status.is_successful() {
                self.result
            } else {
                None
            },
            error: None,
            progress_meta: self.meta,
        };
        if status.is_failed() {
            obs.error = Some(self.error.unwrap_or_else(|| obs.failure_reason()));
        }
        obs
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CancelResponse {
    pub job_id: ExecutionId,
    pub status: JobStatus,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeleteResponse {
    pub task_id: RecordId,
    pub deleted: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClearResponse {
    pub deleted_count: u64,
}
