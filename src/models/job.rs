use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::JobError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum JobStatus {
    Pending,
    Started,
    Progress,
    Success,
    Failure,
    /// Treated like `Started`/`Progress`: non-terminal, polling continues.
    Retry,
    Revoked,
}

impl JobStatus {
    pub fn is_ready(self) -> bool {
        matches!(
            self,
            JobStatus::Success | JobStatus::Failure | JobStatus::Revoked
        )
    }

    pub fn is_successful(self) -> bool {
        self == JobStatus::Success
    }

    pub fn is_failed(self) -> bool {
        matches!(self, JobStatus::Failure | JobStatus::Revoked)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "PENDING",
            JobStatus::Started => "STARTED",
            JobStatus::Progress => "PROGRESS",
            JobStatus::Success => "SUCCESS",
            JobStatus::Failure => "FAILURE",
            JobStatus::Retry => "RETRY",
            JobStatus::Revoked => "REVOKED",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = JobError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PENDING" => Ok(JobStatus::Pending),
            "STARTED" => Ok(JobStatus::Started),
            "PROGRESS" => Ok(JobStatus::Progress),
            "SUCCESS" => Ok(JobStatus::Success),
            "FAILURE" => Ok(JobStatus::Failure),
            "RETRY" => Ok(JobStatus::Retry),
            "REVOKED" => Ok(JobStatus::Revoked),
            other => Err(JobError::Validation(format!(
                "Unknown job status '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    File,
    Text,
}

impl JobKind {
    /// Infer the kind from a backend task type such as `file_embedding`.
    pub fn from_task_type(task_type: &str) -> Option<Self> {
        let lower = task_type.to_ascii_lowercase();
        if lower.contains("file") {
            Some(JobKind::File)
        } else if lower.contains("text") {
            Some(JobKind::Text)
        } else {
            None
        }
    }

    /// The task type string the catalog endpoint filters on.
    pub fn task_type(self) -> &'static str {
        match self {
            JobKind::File => "file_embedding",
            JobKind::Text => "text_embedding",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobKind::File => "file",
            JobKind::Text => "text",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobKind {
    type Err = JobError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "file" => Ok(JobKind::File),
            "text" => Ok(JobKind::Text),
            other => Err(JobError::Validation(format!("Unknown job kind '{}'", other))),
        }
    }
}

/// The execution engine's task id. Cancel and status calls take this one.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct ExecutionId(pub String);

/// The backend's durable record id. Catalog deletes take this one.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct RecordId(pub String);

impl ExecutionId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl RecordId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ExecutionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ExecutionId {
    fn from(s: &str) -> Self {
        ExecutionId(s.to_string())
    }
}

impl From<&str> for RecordId {
    fn from(s: &str) -> Self {
        RecordId(s.to_string())
    }
}

/// Both identities of one logical job. `record_id` is unknown until the
/// catalog has a durable record for the job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JobIds {
    pub execution_id: ExecutionId,
    #[serde(default)]
    pub record_id: Option<RecordId>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ProgressMeta {
    #[serde(default, alias = "progress", skip_serializing_if = "Option::is_none")]
    pub percent: Option<f64>,
    #[serde(default, alias = "current", skip_serializing_if = "Option::is_none")]
    pub current_chunk: Option<u64>,
    #[serde(default, alias = "total", skip_serializing_if = "Option::is_none")]
    pub total_chunks: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(default, alias = "model", skip_serializing_if = "Option::is_none")]
    pub model_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmbeddingResult {
    pub total_chunks: u64,
    pub successful_chunks: u64,
    #[serde(default)]
    pub failed_chunks: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchHit {
    pub id: String,
    pub score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchResult {
    #[serde(default)]
    pub query: Option<String>,
    pub results: Vec<SearchHit>,
}

/// Payload of a successful job: an embedding summary or search hits, never both.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum JobResult {
    Embedding(EmbeddingResult),
    Search(SearchResult),
}

/// Where the presented record currently comes from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum JobSource {
    Active,
    Catalog,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Job {
    pub ids: JobIds,
    pub status: JobStatus,
    pub kind: JobKind,
    /// False while `kind` is the optimistic guess made at submission.
    #[serde(default)]
    pub kind_confirmed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<JobResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress_meta: Option<ProgressMeta>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Sequence number of the newest observation applied to this record.
    #[serde(default)]
    pub seq: u64,
    pub source: JobSource,
}

impl Job {
    /// The record inserted the instant a submission succeeds.
    pub fn optimistic(
        execution_id: ExecutionId,
        kind: JobKind,
        created_at: DateTime<Utc>,
        progress_meta: Option<ProgressMeta>,
    ) -> Self {
        Self {
            ids: JobIds {
                execution_id,
                record_id: None,
            },
            status: JobStatus::Pending,
            kind,
            kind_confirmed: false,
            result: None,
            error: None,
            progress_meta,
            created_at,
            updated_at: created_at,
            seq: 0,
            source: JobSource::Active,
        }
    }

    pub fn job_id(&self) -> &str {
        self.ids.execution_id.as_str()
    }

    pub fn ready(&self) -> bool {
        self.status.is_ready()
    }

    pub fn successful(&self) -> bool {
        self.status.is_successful()
    }

    pub fn failed(&self) -> bool {
        self.status.is_failed()
    }

    /// Resolve the id a catalog delete needs. Without a known record id the
    /// execution id is only used when the caller explicitly allows it.
    pub fn deletion_id(&self, allow_execution_fallback: bool) -> Option<RecordId> {
        match &self.ids.record_id {
            Some(record_id) => Some(record_id.clone()),
            None if allow_execution_fallback => {
                Some(RecordId(self.ids.execution_id.as_str().to_string()))
            }
            None => None,
        }
    }

    pub fn provider(&self) -> Option<&str> {
        self.progress_meta
            .as_ref()
            .and_then(|m| m.provider.as_deref())
            .or(match &self.result {
                Some(JobResult::Embedding(r)) => r.provider.as_deref(),
                _ => None,
            })
    }

    pub fn model_id(&self) -> Option<&str> {
        self.progress_meta
            .as_ref()
            .and_then(|m| m.model_id.as_deref())
            .or(match &self.result {
                Some(JobResult::Embedding(r)) => r.model_id.as_deref(),
                _ => None,
            })
    }

    /// The record's current state expressed as an observation.
    pub fn to_observation(&self) -> Observation {
        Observation {
            job_id: self.ids.execution_id.clone(),
            seq: self.seq,
            status: self.status,
            kind: self.kind_confirmed.then_some(self.kind),
            result: self.result.clone(),
            error: self.error.clone(),
            progress_meta: self.progress_meta.clone(),
        }
    }

    /// Fold a poll observation into this record.
    pub fn apply(&mut self, obs: &Observation, now: DateTime<Utc>) {
        self.status = obs.status;
        self.seq = obs.seq;
        self.updated_at = now;
        if let Some(kind) = obs.kind {
            self.kind = kind;
            self.kind_confirmed = true;
        }
        if obs.progress_meta.is_some() {
            self.progress_meta = obs.progress_meta.clone();
        }
        self.result = if obs.status.is_successful() {
            obs.result.clone()
        } else {
            None
        };
        self.error = if obs.status.is_failed() {
            obs.error.clone()
        } else {
            None
        };
    }
}

/// One freshly observed status of a job, stamped with the sequence ticket
/// drawn before the observation was requested.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub job_id: ExecutionId,
    pub seq: u64,
    pub status: JobStatus,
    pub kind: Option<JobKind>,
    pub result: Option<JobResult>,
    pub error: Option<String>,
    pub progress_meta: Option<ProgressMeta>,
}

impl Observation {
    pub fn ready(&self) -> bool {
        self.status.is_ready()
    }

    pub fn successful(&self) -> bool {
        self.status.is_successful()
    }

    pub fn failed(&self) -> bool {
        self.status.is_failed()
    }

    /// Human-readable failure reason, with a fallback for bare statuses.
    pub fn failure_reason(&self) -> String {
        match (&self.error, self.status) {
            (Some(e), _) => e.clone(),
            (None, JobStatus::Revoked) => "Job was cancelled".to_string(),
            (None, _) => "Job failed".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [JobStatus; 7] = [
        JobStatus::Pending,
        JobStatus::Started,
        JobStatus::Progress,
        JobStatus::Success,
        JobStatus::Failure,
        JobStatus::Retry,
        JobStatus::Revoked,
    ];

    fn make_observation(status: JobStatus) -> Observation {
        Observation {
            job_id: ExecutionId::from("exec-1"),
            seq: 5,
            status,
            kind: None,
            result: Some(JobResult::Embedding(EmbeddingResult {
                total_chunks: 10,
                successful_chunks: 10,
                failed_chunks: 0,
                store_id: None,
                model_id: None,
                provider: None,
            })),
            error: Some("boom".to_string()),
            progress_meta: None,
        }
    }

    #[test]
    fn test_terminal_status_has_exactly_one_outcome() {
        for status in ALL {
            if status.is_ready() {
                assert!(
                    status.is_successful() ^ status.is_failed(),
                    "{} must be exactly one of successful/failed",
                    status
                );
            } else {
                assert!(!status.is_successful());
                assert!(!status.is_failed());
            }
        }
    }

    #[test]
    fn test_retry_is_not_terminal() {
        assert!(!JobStatus::Retry.is_ready());
    }

    #[test]
    fn test_status_serde_uppercase() {
        let json = serde_json::to_string(&JobStatus::Revoked).expect("serialize");
        assert_eq!(json, "\"REVOKED\"");
        let parsed: JobStatus = serde_json::from_str("\"PROGRESS\"").expect("deserialize");
        assert_eq!(parsed, JobStatus::Progress);
    }

    #[test]
    fn test_status_from_str_case_insensitive() {
        assert_eq!("success".parse::<JobStatus>().unwrap(), JobStatus::Success);
        assert!("finished".parse::<JobStatus>().is_err());
    }

    #[test]
    fn test_kind_from_task_type() {
        assert_eq!(JobKind::from_task_type("file_embedding"), Some(JobKind::File));
        assert_eq!(JobKind::from_task_type("EMBED_TEXT"), Some(JobKind::Text));
        assert_eq!(JobKind::from_task_type("search"), None);
    }

    #[test]
    fn test_result_untagged_embedding_shape() {
        let json = r#"{"total_chunks":10,"successful_chunks":9,"failed_chunks":1}"#;
        let result: JobResult = serde_json::from_str(json).expect("deserialize");
        match result {
            JobResult::Embedding(r) => {
                assert_eq!(r.total_chunks, 10);
                assert_eq!(r.failed_chunks, 1);
            }
            other => panic!("Expected Embedding, got: {:?}", other),
        }
    }

    #[test]
    fn test_result_untagged_search_shape() {
        let json = r#"{"query":"cats","results":[{"id":"d1","score":0.9}]}"#;
        let result: JobResult = serde_json::from_str(json).expect("deserialize");
        match result {
            JobResult::Search(r) => {
                assert_eq!(r.results.len(), 1);
                assert_eq!(r.query.as_deref(), Some("cats"));
            }
            other => panic!("Expected Search, got: {:?}", other),
        }
    }

    #[test]
    fn test_progress_meta_aliases() {
        let json = r#"{"progress":40.0,"current":4,"total":10,"model":"m1"}"#;
        let meta: ProgressMeta = serde_json::from_str(json).expect("deserialize");
        assert_eq!(meta.percent, Some(40.0));
        assert_eq!(meta.current_chunk, Some(4));
        assert_eq!(meta.total_chunks, Some(10));
        assert_eq!(meta.model_id.as_deref(), Some("m1"));
    }

    #[test]
    fn test_apply_success_keeps_result_drops_error() {
        let mut job = Job::optimistic(ExecutionId::from("exec-1"), JobKind::Text, Utc::now(), None);
        job.apply(&make_observation(JobStatus::Success), Utc::now());
        assert!(job.ready() && job.successful());
        assert!(job.result.is_some());
        assert!(job.error.is_none());
        assert_eq!(job.seq, 5);
    }

    #[test]
    fn test_apply_failure_keeps_error_drops_result() {
        let mut job = Job::optimistic(ExecutionId::from("exec-1"), JobKind::Text, Utc::now(), None);
        job.apply(&make_observation(JobStatus::Failure), Utc::now());
        assert!(job.failed());
        assert!(job.result.is_none());
        assert_eq!(job.error.as_deref(), Some("boom"));
    }

    #[test]
    fn test_apply_confirms_kind_and_keeps_meta_when_absent() {
        let meta = ProgressMeta {
            percent: Some(10.0),
            ..Default::default()
        };
        let mut job = Job::optimistic(
            ExecutionId::from("exec-1"),
            JobKind::Text,
            Utc::now(),
            Some(meta.clone()),
        );
        let mut obs = make_observation(JobStatus::Progress);
        obs.kind = Some(JobKind::File);
        job.apply(&obs, Utc::now());
        assert_eq!(job.kind, JobKind::File);
        assert!(job.kind_confirmed);
        assert_eq!(job.progress_meta, Some(meta));
    }

    #[test]
    fn test_deletion_id_resolution() {
        let mut job = Job::optimistic(ExecutionId::from("exec-1"), JobKind::File, Utc::now(), None);
        assert_eq!(job.deletion_id(false), None);
        assert_eq!(job.deletion_id(true), Some(RecordId::from("exec-1")));

        job.ids.record_id = Some(RecordId::from("rec-9"));
        assert_eq!(job.deletion_id(false), Some(RecordId::from("rec-9")));
        assert_eq!(job.deletion_id(true), Some(RecordId::from("rec-9")));
    }

    #[test]
    fn test_failure_reason_fallbacks() {
        let mut obs = make_observation(JobStatus::Revoked);
        obs.error = None;
        assert_eq!(obs.failure_reason(), "Job was cancelled");
        obs.status = JobStatus::Failure;
        assert_eq!(obs.failure_reason(), "Job failed");
    }

    #[test]
    fn test_job_serde_roundtrip() {
        let job = Job::optimistic(ExecutionId::from("exec-1"), JobKind::File, Utc::now(), None);
        let json = serde_json::to_string(&job).expect("serialize");
        let deserialized: Job = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(job, deserialized);
    }
}
