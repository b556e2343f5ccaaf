use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::JobError;
use crate::models::job::{
    ExecutionId, Job, JobIds, JobKind, JobResult, JobSource, JobStatus, ProgressMeta, RecordId,
};

/// The authoritative server record for a job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CatalogEntry {
    /// Durable record id.
    pub id: RecordId,
    /// Execution engine task id; matches the `job_id` returned at submission.
    pub task_id: ExecutionId,
    pub status: JobStatus,
    #[serde(default)]
    pub task_type: Option<String>,
    #[serde(default)]
    pub result: Option<JobResult>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub meta: Option<ProgressMeta>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl CatalogEntry {
    pub fn into_job(self) -> Job {
        let inferred = self.task_type.as_deref().and_then(JobKind::from_task_type);
        let result = if self.status.is_successful() {
            self.result
        } else {
            None
        };
        let error = if self.status.is_failed() {
            self.error
        } else {
            None
        };
        Job {
            ids: JobIds {
                execution_id: self.task_id,
                record_id: Some(self.id),
            },
            status: self.status,
            kind: inferred.unwrap_or(JobKind::File),
            kind_confirmed: inferred.is_some(),
            result,
            error,
            progress_meta: self.meta,
            created_at: self.created_at,
            updated_at: self.updated_at.unwrap_or(self.created_at),
            seq: 0,
            source: JobSource::Catalog,
        }
    }
}

/// Server-side filter and page window for `GET /tasks`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CatalogQuery {
    pub status: Option<JobStatus>,
    pub kind: Option<JobKind>,
    pub skip: usize,
    pub limit: usize,
}

impl CatalogQuery {
    pub fn first_page(limit: usize) -> Self {
        Self {
            status: None,
            kind: None,
            skip: 0,
            limit,
        }
    }

    pub fn to_query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::with_capacity(4);
        if let Some(status) = self.status {
            pairs.push(("status", status.as_str().to_string()));
        }
        if let Some(kind) = self.kind {
            pairs.push(("task_type", kind.task_type().to_string()));
        }
        pairs.push(("skip", self.skip.to_string()));
        pairs.push(("limit", self.limit.to_string()));
        pairs
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CatalogPage {
    pub tasks: Vec<CatalogEntry>,
    pub total: usize,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ClearCategory {
    All,
    Success,
    Failed,
    /// Success and failed together.
    Completed,
}

impl ClearCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            ClearCategory::All => "all",
            ClearCategory::Success => "success",
            ClearCategory::Failed => "failed",
            ClearCategory::Completed => "completed",
        }
    }

    pub fn matches(self, status: JobStatus) -> bool {
        match self {
            ClearCategory::All => true,
            ClearCategory::Success => status.is_successful(),
            ClearCategory::Failed => status.is_failed(),
            ClearCategory::Completed => status.is_ready(),
        }
    }
}

impl fmt::Display for ClearCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ClearCategory {
    type Err = JobError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(ClearCategory::All),
            "success" => Ok(ClearCategory::Success),
            "failed" => Ok(ClearCategory::Failed),
            "completed" => Ok(ClearCategory::Completed),
            other => Err(JobError::Validation(format!(
                "Unknown clear category '{}' (expected all, success, failed or completed)",
                other
            ))),
        }
    }
}
