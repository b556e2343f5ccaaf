//! Reconciliation of locally tracked jobs with a catalog page.
//!
//! Pure functions over snapshots; the registry owns the locking.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use crate::models::job::{ExecutionId, Job, JobSource};

/// Newest first; ties broken by execution id so the order is total.
pub fn display_order(a: &Job, b: &Job) -> Ordering {
    b.created_at
        .cmp(&a.created_at)
        .then_with(|| a.ids.execution_id.cmp(&b.ids.execution_id))
}

pub fn sort_jobs(jobs: &mut [Job]) {
    jobs.sort_by(display_order);
}

/// Combine a local record with the catalog record for the same job.
///
/// A ready catalog record is definitive. Otherwise the local record keeps
/// its status, outcome and progress while the catalog supplies the record
/// id, the submission time and (when it knows it) the kind.
pub fn reconcile(local: &Job, record: &Job) -> Job {
    if record.ready() {
        let mut job = record.clone();
        if !record.kind_confirmed && local.kind_confirmed {
            job.kind = local.kind;
            job.kind_confirmed = true;
        }
        return job;
    }

    let mut job = record.clone();
    if !record.kind_confirmed {
        job.kind = local.kind;
        job.kind_confirmed = local.kind_confirmed;
    }
    job.status = local.status;
    job.result = local.result.clone();
    job.error = local.error.clone();
    job.progress_meta = local
        .progress_meta
        .clone()
        .or_else(|| record.progress_meta.clone());
    job.seq = local.seq;
    job.updated_at = local.updated_at.max(record.updated_at);
    job.source = JobSource::Active;
    job
}

/// Build the display list from the catalog page plus local records.
///
/// Active jobs missing from the page are kept; retired jobs only appear
/// through their catalog record. Duplicate catalog rows collapse to the
/// first occurrence.
pub fn merge(
    active: &HashMap<ExecutionId, Job>,
    retired: &HashMap<ExecutionId, Job>,
    catalog: &[Job],
) -> Vec<Job> {
    let mut seen: HashSet<&ExecutionId> = HashSet::with_capacity(catalog.len());
    let mut merged = Vec::with_capacity(catalog.len() + active.len());

    for record in catalog {
        let id = &record.ids.execution_id;
        if !seen.insert(id) {
            continue;
        }
        let job = match active.get(id).or_else(|| retired.get(id)) {
            Some(local) => reconcile(local, record),
            None => record.clone(),
        };
        merged.push(job);
    }

    for (id, job) in active {
        if !seen.contains(id) {
            merged.push(job.clone());
        }
    }

    sort_jobs(&mut merged);
    merged
}
