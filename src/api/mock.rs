// Scripted in-memory jobs API for testing.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Semaphore;

use super::{ApiError, JobsApi};
use crate::models::catalog::{CatalogEntry, CatalogPage, CatalogQuery, ClearCategory};
use crate::models::job::{
    EmbeddingResult, ExecutionId, JobKind, JobResult, JobStatus, ProgressMeta, RecordId,
};
use crate::models::wire::{
    CancelResponse, ClearResponse, DeleteResponse, FileEmbeddingRequest, StatusResponse,
    SubmitResponse, TextEmbeddingRequest,
};

/// Call counters, one per endpoint.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MockCalls {
    pub submit: usize,
    pub status: usize,
    pub cancel: usize,
    pub list: usize,
    pub delete: usize,
    pub clear: usize,
}

#[derive(Default)]
struct MockState {
    next_job: u64,
    scripts: HashMap<ExecutionId, VecDeque<Result<StatusResponse, String>>>,
    last_status: HashMap<ExecutionId, StatusResponse>,
    catalog: Vec<CatalogEntry>,
    submit_error: Option<String>,
    cancel_error: Option<String>,
    delete_error: Option<String>,
    list_error: Option<String>,
    calls: MockCalls,
    cancelled: Vec<ExecutionId>,
    deleted: Vec<RecordId>,
    cleared: Vec<ClearCategory>,
}

/// Mock jobs API. Status responses are served from a per-job script; once a
/// script runs dry the last response repeats (PENDING if none was scripted).
pub struct MockJobsApi {
    state: Mutex<MockState>,
    status_gate: Option<Arc<Semaphore>>,
}

impl Default for MockJobsApi {
    fn default() -> Self {
        Self::new()
    }
}

impl MockJobsApi {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState::default()),
            status_gate: None,
        }
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// A mock whose status calls block until [`release_status`] hands out
    /// permits, one permit per response.
    ///
    /// [`release_status`]: MockJobsApi::release_status
    pub fn gated() -> Self {
        Self {
            state: Mutex::new(MockState::default()),
            status_gate: Some(Arc::new(Semaphore::new(0))),
        }
    }

    pub fn release_status(&self, permits: usize) {
        if let Some(gate) = &self.status_gate {
            gate.add_permits(permits);
        }
    }

    pub fn push_status(&self, job_id: &str, status: JobStatus) {
        self.push_response(job_id, status_response(job_id, status));
    }

    pub fn push_progress(&self, job_id: &str, percent: f64) {
        let mut resp = status_response(job_id, JobStatus::Progress);
        resp.meta = Some(ProgressMeta {
            percent: Some(percent),
            ..Default::default()
        });
        self.push_response(job_id, resp);
    }

    pub fn push_success(&self, job_id: &str, total_chunks: u64, successful_chunks: u64) {
        let mut resp = status_response(job_id, JobStatus::Success);
        resp.result = Some(JobResult::Embedding(EmbeddingResult {
            total_chunks,
            successful_chunks,
            failed_chunks: total_chunks.saturating_sub(successful_chunks),
            store_id: None,
            model_id: None,
            provider: None,
        }));
        self.push_response(job_id, resp);
    }

    pub fn push_failure(&self, job_id: &str, error: &str) {
        let mut resp = status_response(job_id, JobStatus::Failure);
        resp.error = Some(error.to_string());
        self.push_response(job_id, resp);
    }

    pub fn push_response(&self, job_id: &str, resp: StatusResponse) {
        let mut state = self.lock();
        state
            .scripts
            .entry(ExecutionId::from(job_id))
            .or_default()
            .push_back(Ok(resp));
    }

    /// Script a transport-level failure for the next status call.
    pub fn push_status_error(&self, job_id: &str, message: &str) {
        let mut state = self.lock();
        state
            .scripts
            .entry(ExecutionId::from(job_id))
            .or_default()
            .push_back(Err(message.to_string()));
    }

    pub fn fail_submissions(&self, message: &str) {
        self.lock().submit_error = Some(message.to_string());
    }

    pub fn fail_cancels(&self, message: &str) {
        self.lock().cancel_error = Some(message.to_string());
    }

    pub fn fail_deletes(&self, message: &str) {
        self.lock().delete_error = Some(message.to_string());
    }

    pub fn fail_lists(&self, message: Option<&str>) {
        self.lock().list_error = message.map(str::to_string);
    }

    pub fn insert_catalog(&self, entry: CatalogEntry) {
        let mut state = self.lock();
        state.catalog.retain(|e| e.id != entry.id);
        state.catalog.push(entry);
    }

    pub fn catalog_len(&self) -> usize {
        self.lock().catalog.len()
    }

    pub fn calls(&self) -> MockCalls {
        self.lock().calls.clone()
    }

    pub fn cancelled(&self) -> Vec<ExecutionId> {
        self.lock().cancelled.clone()
    }

    pub fn deleted(&self) -> Vec<RecordId> {
        self.lock().deleted.clone()
    }

    pub fn cleared(&self) -> Vec<ClearCategory> {
        self.lock().cleared.clone()
    }

    fn submit(&self) -> Result<SubmitResponse, ApiError> {
        let mut state = self.lock();
        state.calls.submit += 1;
        if let Some(message) = &state.submit_error {
            return Err(ApiError::Rejected(message.clone()));
        }
        state.next_job += 1;
        Ok(SubmitResponse {
            job_id: ExecutionId(format!("job-{}", state.next_job)),
            metadata: None,
        })
    }
}

/// A bare status response with no meta, result or error.
pub fn status_response(job_id: &str, status: JobStatus) -> StatusResponse {
    StatusResponse {
        job_id: ExecutionId::from(job_id),
        status,
        ready: status.is_ready(),
        successful: status.is_successful(),
        failed: status.is_failed(),
        result: None,
        error: None,
        meta: None,
        task_type: None,
    }
}

/// A catalog record for `job_id`, with record id `rec-<job_id>`.
pub fn catalog_entry(
    job_id: &str,
    status: JobStatus,
    kind: JobKind,
    created_at: DateTime<Utc>,
) -> CatalogEntry {
    CatalogEntry {
        id: RecordId(format!("rec-{}", job_id)),
        task_id: ExecutionId::from(job_id),
        status,
        task_type: Some(kind.task_type().to_string()),
        result: None,
        error: if status.is_failed() {
            Some("failed".to_string())
        } else {
            None
        },
        meta: None,
        created_at,
        updated_at: None,
    }
}

#[async_trait]
impl JobsApi for MockJobsApi {
    async fn submit_file(&self, _req: &FileEmbeddingRequest) -> Result<SubmitResponse, ApiError> {
        self.submit()
    }

    async fn submit_text(&self, _req: &TextEmbeddingRequest) -> Result<SubmitResponse, ApiError> {
        self.submit()
    }

    async fn job_status(&self, job_id: &ExecutionId) -> Result<StatusResponse, ApiError> {
        self.lock().calls.status += 1;

        if let Some(gate) = &self.status_gate {
            gate.acquire()
                .await
                .map_err(|_| ApiError::Rejected("status gate closed".to_string()))?
                .forget();
        }

        let mut state = self.lock();
        let next = state.scripts.get_mut(job_id).and_then(|s| s.pop_front());
        match next {
            Some(Ok(resp)) => {
                state.last_status.insert(job_id.clone(), resp.clone());
                Ok(resp)
            }
            Some(Err(message)) => Err(ApiError::Status {
                status: 502,
                message,
            }),
            None => Ok(state
                .last_status
                .get(job_id)
                .cloned()
                .unwrap_or_else(|| status_response(job_id.as_str(), JobStatus::Pending))),
        }
    }

    async fn cancel_job(&self, job_id: &ExecutionId) -> Result<CancelResponse, ApiError> {
        let mut state = self.lock();
        state.calls.cancel += 1;
        if let Some(message) = &state.cancel_error {
            return Err(ApiError::Rejected(message.clone()));
        }
        state.cancelled.push(job_id.clone());
        state.last_status.insert(
            job_id.clone(),
            status_response(job_id.as_str(), JobStatus::Revoked),
        );
        for entry in state.catalog.iter_mut().filter(|e| &e.task_id == job_id) {
            entry.status = JobStatus::Revoked;
        }
        Ok(CancelResponse {
            job_id: job_id.clone(),
            status: JobStatus::Revoked,
            message: Some("Job cancelled".to_string()),
        })
    }

    async fn list_tasks(&self, query: &CatalogQuery) -> Result<CatalogPage, ApiError> {
        let mut state = self.lock();
        state.calls.list += 1;
        if let Some(message) = &state.list_error {
            return Err(ApiError::Rejected(message.clone()));
        }
        let mut matching: Vec<CatalogEntry> = state
            .catalog
            .iter()
            .filter(|e| query.status.map_or(true, |s| s == e.status))
            .filter(|e| {
                query.kind.map_or(true, |k| {
                    e.task_type.as_deref().and_then(JobKind::from_task_type) == Some(k)
                })
            })
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let total = matching.len();
        let tasks = matching
            .into_iter()
            .skip(query.skip)
            .take(query.limit)
            .collect();
        Ok(CatalogPage { tasks, total })
    }

    async fn delete_task(&self, record_id: &RecordId) -> Result<DeleteResponse, ApiError> {
        let mut state = self.lock();
        state.calls.delete += 1;
        if let Some(message) = &state.delete_error {
            return Err(ApiError::Rejected(message.clone()));
        }
        let before = state.catalog.len();
        state.catalog.retain(|e| &e.id != record_id);
        let deleted = state.catalog.len() < before;
        if deleted {
            state.deleted.push(record_id.clone());
        }
        Ok(DeleteResponse {
            task_id: record_id.clone(),
            deleted,
        })
    }

    async fn clear_tasks(&self, category: ClearCategory) -> Result<ClearResponse, ApiError> {
        let mut state = self.lock();
        state.calls.clear += 1;
        if let Some(message) = &state.delete_error {
            return Err(ApiError::Rejected(message.clone()));
        }
        let (removed, kept): (Vec<CatalogEntry>, Vec<CatalogEntry>) = state
            .catalog
            .drain(..)
            .partition(|e| category.matches(e.status));
        state.catalog = kept;
        state.cleared.push(category);
        let ids: Vec<RecordId> = removed.iter().map(|e| e.id.clone()).collect();
        state.deleted.extend(ids);
        Ok(ClearResponse {
            deleted_count: removed.len() as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_script_then_repeat_last() {
        let api = MockJobsApi::new();
        api.push_progress("job-1", 40.0);
        api.push_status("job-1", JobStatus::Success);

        let id = ExecutionId::from("job-1");
        assert_eq!(api.job_status(&id).await.unwrap().status, JobStatus::Progress);
        assert_eq!(api.job_status(&id).await.unwrap().status, JobStatus::Success);
        assert_eq!(api.job_status(&id).await.unwrap().status, JobStatus::Success);
        assert_eq!(api.calls().status, 3);
    }

    #[tokio::test]
    async fn test_unscripted_job_is_pending() {
        let api = MockJobsApi::new();
        let resp = api.job_status(&ExecutionId::from("ghost")).await.unwrap();
        assert_eq!(resp.status, JobStatus::Pending);
    }

    #[tokio::test]
    async fn test_scripted_error() {
        let api = MockJobsApi::new();
        api.push_status_error("job-1", "connection reset");
        let result = api.job_status(&ExecutionId::from("job-1")).await;
        assert!(matches!(result, Err(ApiError::Status { status: 502, .. })));
    }

    #[tokio::test]
    async fn test_submissions_get_sequential_ids() {
        let api = MockJobsApi::new();
        let req = TextEmbeddingRequest {
            text: "hello".to_string(),
            model_id: "m".to_string(),
            store_id: None,
        };
        assert_eq!(api.submit_text(&req).await.unwrap().job_id.as_str(), "job-1");
        assert_eq!(api.submit_text(&req).await.unwrap().job_id.as_str(), "job-2");
    }

    #[tokio::test]
    async fn test_list_filters_and_pages() {
        let api = MockJobsApi::new();
        let now = Utc::now();
        for i in 0..5 {
            let status = if i % 2 == 0 {
                JobStatus::Success
            } else {
                JobStatus::Failure
            };
            api.insert_catalog(catalog_entry(
                &format!("j{}", i),
                status,
                JobKind::File,
                now + chrono::Duration::seconds(i),
            ));
        }
        let page = api
            .list_tasks(&CatalogQuery {
                status: Some(JobStatus::Success),
                kind: None,
                skip: 1,
                limit: 10,
            })
            .await
            .unwrap();
        assert_eq!(page.total, 3);
        assert_eq!(page.tasks.len(), 2);
        assert_eq!(page.tasks[0].task_id.as_str(), "j2");
    }

    #[tokio::test]
    async fn test_clear_removes_matching_category() {
        let api = MockJobsApi::new();
        let now = Utc::now();
        api.insert_catalog(catalog_entry("a", JobStatus::Failure, JobKind::File, now));
        api.insert_catalog(catalog_entry("b", JobStatus::Success, JobKind::File, now));
        let resp = api.clear_tasks(ClearCategory::Failed).await.unwrap();
        assert_eq!(resp.deleted_count, 1);
        assert_eq!(api.catalog_len(), 1);
    }

    #[tokio::test]
    async fn test_gated_status_waits_for_permit() {
        let api = Arc::new(MockJobsApi::gated());
        let api2 = Arc::clone(&api);
        let handle =
            tokio::spawn(async move { api2.job_status(&ExecutionId::from("job-1")).await });
        tokio::task::yield_now().await;
        assert!(!handle.is_finished());
        api.release_status(1);
        let resp = handle.await.unwrap().unwrap();
        assert_eq!(resp.status, JobStatus::Pending);
    }
}
