//! Boundary to the remote jobs API.
//!
//! [`JobsApi`] is the only way the orchestration core talks to the backend.
//! [`HttpJobsApi`] speaks the JSON/REST protocol; [`MockJobsApi`] is a
//! scripted in-memory double for tests.

pub mod http;
pub mod mock;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::catalog::{CatalogPage, CatalogQuery, ClearCategory};
use crate::models::job::{ExecutionId, RecordId};
use crate::models::wire::{
    CancelResponse, ClearResponse, DeleteResponse, FileEmbeddingRequest, StatusResponse,
    SubmitResponse, TextEmbeddingRequest,
};

pub use http::HttpJobsApi;
pub use mock::MockJobsApi;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("HTTP request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Status { status: u16, message: String },

    #[error("Request rejected: {0}")]
    Rejected(String),

    #[error("Invalid response: {0}")]
    Decode(String),

    #[error("Invalid API URL: {0}")]
    InvalidUrl(String),
}

impl ApiError {
    /// True when the backend could not be reached at all.
    pub fn is_unreachable(&self) -> bool {
        matches!(self, ApiError::Transport(e) if e.is_connect() || e.is_timeout())
    }
}

#[async_trait]
pub trait JobsApi: Send + Sync {
    async fn submit_file(&self, req: &FileEmbeddingRequest) -> Result<SubmitResponse, ApiError>;
    async fn submit_text(&self, req: &TextEmbeddingRequest) -> Result<SubmitResponse, ApiError>;
    async fn job_status(&self, job_id: &ExecutionId) -> Result<StatusResponse, ApiError>;
    async fn cancel_job(&self, job_id: &ExecutionId) -> Result<CancelResponse, ApiError>;
    async fn list_tasks(&self, query: &CatalogQuery) -> Result<CatalogPage, ApiError>;
    async fn delete_task(&self, record_id: &RecordId) -> Result<DeleteResponse, ApiError>;
    async fn clear_tasks(&self, category: ClearCategory) -> Result<ClearResponse, ApiError>;
}
