use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, Url};
use serde::de::DeserializeOwned;

use super::{ApiError, JobsApi};
use crate::models::catalog::{CatalogPage, CatalogQuery, ClearCategory};
use crate::models::config::ClientConfig;
use crate::models::job::{ExecutionId, RecordId};
use crate::models::wire::{
    CancelResponse, ClearResponse, DeleteResponse, Envelope, FileEmbeddingRequest,
    StatusResponse, SubmitResponse, TextEmbeddingRequest,
};

const USER_AGENT: &str = concat!("embedding-jobs/", env!("CARGO_PKG_VERSION"));

/// Jobs API client over HTTPS with JSON bodies.
#[derive(Clone)]
pub struct HttpJobsApi {
    client: Client,
    base_url: Url,
    api_key: Option<String>,
}

impl HttpJobsApi {
    pub fn new(config: &ClientConfig) -> Result<Self, ApiError> {
        let base_url = Url::parse(config.api_url.trim_end_matches('/'))
            .map_err(|e| ApiError::InvalidUrl(format!("'{}': {}", config.api_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(ApiError::InvalidUrl(config.api_url.clone()));
        }

        let client = Client::builder()
            .timeout(config.request_timeout())
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            client,
            base_url,
            api_key: config.api_key.clone(),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Append path segments to the base URL, percent-encoding each one.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ApiError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn authorize(&self, req: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => req.bearer_auth(key),
            None => req,
        }
    }

    async fn send<T: DeserializeOwned>(&self, req: RequestBuilder) -> Result<T, ApiError> {
        let response = self.authorize(req).send().await?;
        read_envelope(response).await
    }
}

/// Decode the envelope. A non-2xx response whose body is not an envelope
/// becomes a status error carrying the raw body.
async fn read_envelope<T: DeserializeOwned>(response: Response) -> Result<T, ApiError> {
    let status = response.status();
    let bytes = response.bytes().await?;

    match serde_json::from_slice::<Envelope<T>>(&bytes) {
        Ok(envelope) => envelope.into_result(),
        Err(e) if status.is_success() => Err(ApiError::Decode(e.to_string())),
        Err(_) => {
            let body = String::from_utf8_lossy(&bytes).trim().to_string();
            let message = if body.is_empty() {
                status
                    .canonical_reason()
                    .unwrap_or("Unknown error")
                    .to_string()
            } else {
                body
            };
            Err(ApiError::Status {
                status: status.as_u16(),
                message,
            })
        }
    }
}

#[async_trait]
impl JobsApi for HttpJobsApi {
    async fn submit_file(&self, req: &FileEmbeddingRequest) -> Result<SubmitResponse, ApiError> {
        let url = self.endpoint(&["embeddings", "file"])?;
        self.send(self.client.post(url).json(req)).await
    }

    async fn submit_text(&self, req: &TextEmbeddingRequest) -> Result<SubmitResponse, ApiError> {
        let url = self.endpoint(&["embeddings", "text"])?;
        self.send(self.client.post(url).json(req)).await
    }

    async fn job_status(&self, job_id: &ExecutionId) -> Result<StatusResponse, ApiError> {
        let url = self.endpoint(&["embeddings", "status", job_id.as_str()])?;
        self.send(self.client.get(url)).await
    }

    async fn cancel_job(&self, job_id: &ExecutionId) -> Result<CancelResponse, ApiError> {
        let url = self.endpoint(&["embeddings", "cancel", job_id.as_str()])?;
        self.send(self.client.delete(url)).await
    }

    async fn list_tasks(&self, query: &CatalogQuery) -> Result<CatalogPage, ApiError> {
        let url = self.endpoint(&["tasks"])?;
        self.send(self.client.get(url).query(&query.to_query_pairs()))
            .await
    }

    async fn delete_task(&self, record_id: &RecordId) -> Result<DeleteResponse, ApiError> {
        let url = self.endpoint(&["tasks", record_id.as_str()])?;
        self.send(self.client.delete(url)).await
    }

    async fn clear_tasks(&self, category: ClearCategory) -> Result<ClearResponse, ApiError> {
        let url = self.endpoint(&["tasks", "clear", category.as_str()])?;
        self.send(self.client.delete(url)).await
    }
}
