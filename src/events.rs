use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::job::{ExecutionId, JobKind, JobStatus};

/// Registry change notifications, fanned out over a broadcast channel.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data")]
pub enum RegistryEvent {
    JobAdded {
        job_id: ExecutionId,
        kind: JobKind,
        timestamp: DateTime<Utc>,
    },
    JobUpdated {
        job_id: ExecutionId,
        status: JobStatus,
        ready: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        percent: Option<f64>,
        timestamp: DateTime<Utc>,
    },
    CatalogRefreshed {
        total: usize,
        displayed: usize,
        timestamp: DateTime<Utc>,
    },
    RecordsRemoved {
        count: u64,
        timestamp: DateTime<Utc>,
    },
    Reset {
        timestamp: DateTime<Utc>,
    },
}

impl RegistryEvent {
    /// The job this event is about, if it concerns a single job.
    pub fn job_id(&self) -> Option<&ExecutionId> {
        match self {
            RegistryEvent::JobAdded { job_id, .. } | RegistryEvent::JobUpdated { job_id, .. } => {
                Some(job_id)
            }
            _ => None,
        }
    }
}
