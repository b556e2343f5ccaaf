use serde::{Deserialize, Serialize};

use super::merge::sort_jobs;
use crate::models::catalog::CatalogQuery;
use crate::models::job::{Job, JobKind, JobStatus};

/// Client-side view filter over the display list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobFilter {
    pub status: Option<JobStatus>,
    pub kind: Option<JobKind>,
    /// Case-insensitive substring over ids, provider and model.
    pub text: Option<String>,
}

impl JobFilter {
    pub fn matches(&self, job: &Job) -> bool {
        if self.status.is_some_and(|s| s != job.status) {
            return false;
        }
        if self.kind.is_some_and(|k| k != job.kind) {
            return false;
        }
        match self.text.as_deref().map(str::trim) {
            None | Some("") => true,
            Some(needle) => {
                let needle = needle.to_lowercase();
                let haystacks = [
                    Some(job.ids.execution_id.as_str()),
                    job.ids.record_id.as_ref().map(|r| r.as_str()),
                    job.provider(),
                    job.model_id(),
                ];
                haystacks
                    .into_iter()
                    .flatten()
                    .any(|h| h.to_lowercase().contains(&needle))
            }
        }
    }

    /// Matching jobs in display order.
    pub fn apply(&self, jobs: &[Job]) -> Vec<Job> {
        let mut out: Vec<Job> = jobs.iter().filter(|j| self.matches(j)).cloned().collect();
        sort_jobs(&mut out);
        out
    }

    /// The part of this filter the catalog endpoint can evaluate.
    pub fn to_query(&self, skip: usize, limit: usize) -> CatalogQuery {
        CatalogQuery {
            status: self.status,
            kind: self.kind,
            skip,
            limit,
        }
    }
}
