use std::sync::Arc;

use crate::api::JobsApi;
use crate::errors::JobError;
use crate::models::job::{ExecutionId, JobKind, ProgressMeta};
use crate::models::wire::{FileEmbeddingRequest, TextEmbeddingRequest};

/// What to embed. The variant decides the job kind.
#[derive(Debug, Clone, PartialEq)]
pub enum SubmitPayload {
    File {
        file_id: String,
        model_id: String,
        store_id: Option<String>,
    },
    Text {
        text: String,
        model_id: String,
        store_id: Option<String>,
    },
}

impl SubmitPayload {
    pub fn kind(&self) -> JobKind {
        match self {
            SubmitPayload::File { .. } => JobKind::File,
            SubmitPayload::Text { .. } => JobKind::Text,
        }
    }

    pub fn validate(&self) -> Result<(), JobError> {
        let (subject, value, model_id, store_id) = match self {
            SubmitPayload::File {
                file_id,
                model_id,
                store_id,
            } => ("file id", file_id, model_id, store_id),
            SubmitPayload::Text {
                text,
                model_id,
                store_id,
            } => ("text", text, model_id, store_id),
        };
        if value.trim().is_empty() {
            return Err(JobError::Validation(format!("{} is required", subject)));
        }
        if model_id.trim().is_empty() {
            return Err(JobError::Validation("model id is required".to_string()));
        }
        if store_id.as_deref().is_some_and(|s| s.trim().is_empty()) {
            return Err(JobError::Validation(
                "store id must not be blank when given".to_string(),
            ));
        }
        Ok(())
    }
}

/// A job the backend accepted.
#[derive(Debug, Clone, PartialEq)]
pub struct Submission {
    pub job_id: ExecutionId,
    pub kind: JobKind,
    pub metadata: Option<ProgressMeta>,
}

pub struct SubmissionClient {
    api: Arc<dyn JobsApi>,
}

impl SubmissionClient {
    pub fn new(api: Arc<dyn JobsApi>) -> Self {
        Self { api }
    }

    /// Validate and send one submission. On error no job exists remotely or
    /// locally.
    pub async fn submit(&self, payload: &SubmitPayload) -> Result<Submission, JobError> {
        payload.validate()?;

        let resp = match payload {
            SubmitPayload::File {
                file_id,
                model_id,
                store_id,
            } => {
                self.api
                    .submit_file(&FileEmbeddingRequest {
                        file_id: file_id.trim().to_string(),
                        model_id: model_id.trim().to_string(),
                        store_id: store_id.clone(),
                    })
                    .await
            }
            SubmitPayload::Text {
                text,
                model_id,
                store_id,
            } => {
                self.api
                    .submit_text(&TextEmbeddingRequest {
                        text: text.clone(),
                        model_id: model_id.trim().to_string(),
                        store_id: store_id.clone(),
                    })
                    .await
            }
        }
        .map_err(JobError::submission)?;

        if resp.job_id.as_str().trim().is_empty() {
            return Err(JobError::Submission(
                "backend accepted the job but returned no job id".to_string(),
            ));
        }

        Ok(Submission {
            job_id: resp.job_id,
            kind: payload.kind(),
            metadata: resp.metadata,
        })
    }
}
