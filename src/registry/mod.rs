//! The shared job registry.
//!
//! Holds the active set (jobs submitted this session that have not been
//! settled by the catalog), the retirement memo (local terminal records the
//! catalog has not confirmed yet) and the latest catalog page, and derives the display
//! list from them. Every mutation goes through one write lock that is never
//! held across a remote call.

pub mod filter;
pub mod merge;

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{broadcast, RwLock};

use crate::api::JobsApi;
use crate::clock::Clock;
use crate::coalesce::{CoalescingFetcher, Fetched};
use crate::errors::JobError;
use crate::events::RegistryEvent;
use crate::models::catalog::{CatalogEntry, CatalogPage, CatalogQuery, ClearCategory};
use crate::models::config::ClientConfig;
use crate::models::job::{ExecutionId, Job, JobResult, JobStatus, Observation, RecordId};
use crate::notify::{NotificationManager, Notifier, TerminalOutcome};
use crate::poller::{ObservationSequence, PollControl};

pub use filter::JobFilter;

/// What became of a poll observation.
#[derive(Debug, Clone, PartialEq)]
pub enum ObservationOutcome {
    Applied(Job),
    /// An observation with a newer ticket was already applied.
    Stale,
    /// The job had already settled; the stored record is returned.
    AlreadyTerminal(Job),
    /// The job is not tracked (never recorded, or dropped by a reset).
    Unknown,
}

impl ObservationOutcome {
    pub fn poll_control(self) -> PollControl {
        match self {
            ObservationOutcome::Applied(_) | ObservationOutcome::Stale => PollControl::Continue,
            ObservationOutcome::AlreadyTerminal(job) => PollControl::Settled(job),
            ObservationOutcome::Unknown => PollControl::Untracked,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RefreshOutcome {
    Refreshed {
        total: usize,
        displayed: usize,
        cached: bool,
    },
    /// A newer refresh or a reset overtook this one; nothing was applied.
    Superseded,
}

struct RegistryState {
    active: HashMap<ExecutionId, Job>,
    retired: HashMap<ExecutionId, Job>,
    catalog: Vec<Job>,
    catalog_total: usize,
    display: Vec<Job>,
    query: CatalogQuery,
    generation: u64,
}

impl RegistryState {
    fn new(page_size: usize) -> Self {
        Self {
            active: HashMap::new(),
            retired: HashMap::new(),
            catalog: Vec::new(),
            catalog_total: 0,
            display: Vec::new(),
            query: CatalogQuery::first_page(page_size),
            generation: 0,
        }
    }

    fn shown(&self, job_id: &ExecutionId) -> Option<&Job> {
        self.display.iter().find(|j| &j.ids.execution_id == job_id)
    }

    fn shown_mut(&mut self, job_id: &ExecutionId) -> Option<&mut Job> {
        self.display.iter_mut().find(|j| &j.ids.execution_id == job_id)
    }

    fn lookup(&self, job_id: &ExecutionId) -> Option<&Job> {
        self.shown(job_id)
            .or_else(|| self.active.get(job_id))
            .or_else(|| self.retired.get(job_id))
    }
}

pub struct JobRegistry {
    api: Arc<dyn JobsApi>,
    clock: Arc<dyn Clock>,
    config: Arc<ClientConfig>,
    sequence: Arc<ObservationSequence>,
    notifications: NotificationManager,
    catalog_fetcher: CoalescingFetcher<CatalogQuery, CatalogPage>,
    state: RwLock<RegistryState>,
    event_tx: broadcast::Sender<RegistryEvent>,
}

impl JobRegistry {
    pub fn new(
        api: Arc<dyn JobsApi>,
        clock: Arc<dyn Clock>,
        notifier: Arc<dyn Notifier>,
        config: Arc<ClientConfig>,
        sequence: Arc<ObservationSequence>,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(config.event_capacity.max(1));
        let catalog_fetcher = CoalescingFetcher::new(
            Arc::clone(&clock),
            config.catalog_freshness(),
            config.search_debounce(),
        );
        Self {
            api,
            clock,
            sequence,
            notifications: NotificationManager::new(notifier),
            catalog_fetcher,
            state: RwLock::new(RegistryState::new(config.page_size)),
            event_tx,
            config,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RegistryEvent> {
        self.event_tx.subscribe()
    }

    pub fn notifications(&self) -> &NotificationManager {
        &self.notifications
    }

    pub fn sequence(&self) -> &Arc<ObservationSequence> {
        &self.sequence
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Track a freshly submitted job: it goes to the top of the display list
    /// and gets its first notification.
    pub async fn record_submission(&self, job: Job) {
        let job_id = job.ids.execution_id.clone();
        let kind = job.kind;
        {
            let mut state = self.state.write().await;
            state.retired.remove(&job_id);
            state.active.insert(job_id.clone(), job.clone());
            state.display.retain(|j| j.ids.execution_id != job_id);
            state.display.insert(0, job);
            merge::sort_jobs(&mut state.display);
        }
        self.notifications
            .open(job_id.as_str(), &format!("Embedding {} job submitted", kind));
        tracing::info!(job_id = %job_id, kind = %kind, "Job submitted");
        self.emit(RegistryEvent::JobAdded {
            job_id,
            kind,
            timestamp: self.clock.now(),
        });
    }

    /// Apply one poll observation. Observations for settled jobs and
    /// observations older than the stored one are ignored.
    pub async fn apply_poll_observation(self: &Arc<Self>, obs: Observation) -> ObservationOutcome {
        let now = self.clock.now();
        let job_id = obs.job_id.clone();

        let (updated, generation) = {
            let mut state = self.state.write().await;
            let active = state.active.get(&job_id).cloned();
            let Some(current) = state.lookup(&job_id).cloned() else {
                return ObservationOutcome::Unknown;
            };

            if current.ready()
                || active.as_ref().is_some_and(Job::ready)
                || state.retired.contains_key(&job_id)
            {
                let settled = state.retired.get(&job_id).cloned().unwrap_or(current);
                tracing::debug!(
                    job_id = %job_id,
                    status = %obs.status,
                    "Ignoring observation for settled job"
                );
                return ObservationOutcome::AlreadyTerminal(settled);
            }

            let stored_seq = current.seq.max(active.as_ref().map_or(0, |j| j.seq));
            if obs.seq <= stored_seq {
                tracing::debug!(
                    job_id = %job_id,
                    seq = obs.seq,
                    stored = stored_seq,
                    "Dropping stale observation"
                );
                return ObservationOutcome::Stale;
            }

            let mut updated = current.clone();
            updated.apply(&obs, now);
            if let Some(job) = state.active.get_mut(&job_id) {
                job.apply(&obs, now);
            }
            if let Some(shown) = state.shown_mut(&job_id) {
                shown.apply(&obs, now);
            }

            if updated.ready() {
                // Jobs shown only from the catalog are memoized too, so a
                // lagging page cannot downgrade them.
                if updated.failed() || !state.active.contains_key(&job_id) {
                    let job = state
                        .active
                        .remove(&job_id)
                        .unwrap_or_else(|| updated.clone());
                    state.retired.insert(job_id.clone(), job);
                }
                self.notifications
                    .finish(job_id.as_str(), terminal_outcome(&updated));
            } else if progressed(&current, &updated) {
                self.notifications
                    .update(job_id.as_str(), &progress_message(&updated));
            }
            (updated, state.generation)
        };

        self.emit(job_updated(&updated, now));
        if updated.successful() {
            self.schedule_settle_refresh(generation);
        }
        ObservationOutcome::Applied(updated)
    }

    /// Refresh the catalog, replacing the stored query when one is given.
    /// An identical query answered within the freshness window is served
    /// from cache.
    pub async fn refresh_catalog(
        &self,
        query: Option<CatalogQuery>,
    ) -> Result<RefreshOutcome, JobError> {
        self.refresh(query, false).await
    }

    /// Refetch the stored query, bypassing the cache.
    pub async fn reload_catalog(&self) -> Result<RefreshOutcome, JobError> {
        self.refresh(None, true).await
    }

    async fn refresh(
        &self,
        query: Option<CatalogQuery>,
        force: bool,
    ) -> Result<RefreshOutcome, JobError> {
        let (query, generation) = {
            let state = self.state.read().await;
            (query.unwrap_or_else(|| state.query.clone()), state.generation)
        };
        if force {
            self.catalog_fetcher.invalidate();
        }

        let api = Arc::clone(&self.api);
        let request = query.clone();
        let fetched = self
            .catalog_fetcher
            .fetch(query.clone(), || async move { api.list_tasks(&request).await })
            .await
            .map_err(JobError::catalog)?;

        let (page, cached) = match fetched {
            Fetched::Fresh(page) => (page, false),
            Fetched::Cached(page) => (page, true),
            Fetched::Superseded => {
                tracing::debug!("Discarding superseded catalog response");
                return Ok(RefreshOutcome::Superseded);
            }
        };

        let (total, displayed) = {
            let mut state = self.state.write().await;
            if state.generation != generation {
                return Ok(RefreshOutcome::Superseded);
            }
            self.apply_page(&mut state, page);
            state.query = query;
            (state.catalog_total, state.display.len())
        };

        self.emit(RegistryEvent::CatalogRefreshed {
            total,
            displayed,
            timestamp: self.clock.now(),
        });
        Ok(RefreshOutcome::Refreshed {
            total,
            displayed,
            cached,
        })
    }

    fn apply_page(&self, state: &mut RegistryState, page: CatalogPage) {
        let catalog: Vec<Job> = page.tasks.into_iter().map(CatalogEntry::into_job).collect();

        for record in catalog.iter().filter(|r| r.ready()) {
            let id = &record.ids.execution_id;
            if let Some(local) = state.active.remove(id) {
                if !local.ready() {
                    self.notifications
                        .finish(id.as_str(), terminal_outcome(record));
                }
            }
            state.retired.remove(id);
        }

        state.display = merge::merge(&state.active, &state.retired, &catalog);
        state.catalog = catalog;
        state.catalog_total = page.total;
    }

    fn schedule_settle_refresh(self: &Arc<Self>, generation: u64) {
        let registry = Arc::clone(self);
        let delay = self.config.settle_delay();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if registry.state.read().await.generation != generation {
                return;
            }
            if let Err(e) = registry.reload_catalog().await {
                tracing::warn!(error = %e, "Catalog refresh after job completion failed");
            }
        });
    }

    /// Cancel a job remotely, then mark it revoked locally. A job that has
    /// already settled is refused without a remote call; on remote failure
    /// local state is left untouched.
    pub async fn cancel(&self, job_id: &ExecutionId) -> Result<Option<Job>, JobError> {
        {
            let state = self.state.read().await;
            if let Some(job) = state.lookup(job_id) {
                if job.ready() {
                    return Err(JobError::Cancel(format!(
                        "job {} already finished with status {}",
                        job_id, job.status
                    )));
                }
            }
        }

        let resp = self.api.cancel_job(job_id).await.map_err(JobError::cancel)?;
        let seq = self.sequence.next();
        let now = self.clock.now();
        let message = resp
            .message
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| "Job was cancelled".to_string());
        let obs = Observation {
            job_id: job_id.clone(),
            seq,
            status: JobStatus::Revoked,
            kind: None,
            result: None,
            error: Some(message.clone()),
            progress_meta: None,
        };

        let (job, transitioned) = {
            let mut state = self.state.write().await;
            let mut transitioned = false;
            if let Some(mut job) = state.active.remove(job_id) {
                if job.ready() {
                    state.active.insert(job_id.clone(), job);
                } else {
                    job.apply(&obs, now);
                    state.retired.insert(job_id.clone(), job);
                    transitioned = true;
                }
            }
            let shown = match state.shown_mut(job_id) {
                Some(shown) if !shown.ready() => {
                    shown.apply(&obs, now);
                    Some(shown.clone())
                }
                _ => None,
            };
            if let Some(shown) = shown {
                state.retired.entry(job_id.clone()).or_insert(shown);
                transitioned = true;
            }
            if transitioned {
                self.notifications
                    .finish(job_id.as_str(), TerminalOutcome::Cancelled(message));
            }
            (state.lookup(job_id).cloned(), transitioned)
        };

        tracing::info!(job_id = %job_id, "Job cancelled");
        if let (Some(job), true) = (&job, transitioned) {
            self.emit(job_updated(job, now));
        }
        Ok(job)
    }

    /// Resolve the record id a delete needs for a job in the listing.
    pub async fn resolve_record_id(&self, job_id: &ExecutionId) -> Result<RecordId, JobError> {
        let state = self.state.read().await;
        let job = state
            .lookup(job_id)
            .ok_or_else(|| JobError::Delete(format!("job {} is not in the listing", job_id)))?;
        job.deletion_id(self.config.delete_falls_back_to_execution_id)
            .ok_or_else(|| {
                JobError::Delete(format!("job {} has no durable record yet", job_id))
            })
    }

    /// Delete one catalog record. Records of in-flight jobs are refused.
    pub async fn delete_one(&self, record_id: &RecordId) -> Result<(), JobError> {
        {
            let state = self.state.read().await;
            let running = state.active.values().find(|j| {
                !j.ready()
                    && (j.ids.record_id.as_ref() == Some(record_id)
                        || j.ids.execution_id.as_str() == record_id.as_str())
            });
            if let Some(job) = running {
                return Err(JobError::Delete(format!(
                    "job {} is still running; cancel it first",
                    job.job_id()
                )));
            }
        }

        let resp = self
            .api
            .delete_task(record_id)
            .await
            .map_err(JobError::delete)?;
        if !resp.deleted {
            return Err(JobError::Delete(format!("record {} was not found", record_id)));
        }
        tracing::info!(record_id = %record_id, "Job record deleted");
        self.emit(RegistryEvent::RecordsRemoved {
            count: 1,
            timestamp: self.clock.now(),
        });

        self.reload_catalog().await?;
        Ok(())
    }

    /// Delete every catalog record in `category` with one server call.
    pub async fn clear_by_category(&self, category: ClearCategory) -> Result<u64, JobError> {
        let resp = self
            .api
            .clear_tasks(category)
            .await
            .map_err(JobError::delete)?;
        tracing::info!(
            category = %category,
            count = resp.deleted_count,
            "Job records cleared"
        );
        self.emit(RegistryEvent::RecordsRemoved {
            count: resp.deleted_count,
            timestamp: self.clock.now(),
        });

        self.reload_catalog().await?;
        Ok(resp.deleted_count)
    }

    /// Drop all tracked state. Pollers still running see their job as
    /// untracked on their next observation.
    pub async fn reset(&self) {
        {
            let mut state = self.state.write().await;
            let generation = state.generation + 1;
            *state = RegistryState::new(self.config.page_size);
            state.generation = generation;
        }
        self.notifications.retire_all();
        self.catalog_fetcher.invalidate();
        tracing::debug!("Registry reset");
        self.emit(RegistryEvent::Reset {
            timestamp: self.clock.now(),
        });
    }

    /// The display list, newest first.
    pub async fn jobs(&self) -> Vec<Job> {
        self.state.read().await.display.clone()
    }

    pub async fn filtered(&self, filter: &JobFilter) -> Vec<Job> {
        filter.apply(&self.state.read().await.display)
    }

    pub async fn get(&self, job_id: &ExecutionId) -> Option<Job> {
        self.state.read().await.lookup(job_id).cloned()
    }

    pub async fn active_ids(&self) -> Vec<ExecutionId> {
        let state = self.state.read().await;
        let mut ids: Vec<ExecutionId> = state.active.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub async fn catalog_total(&self) -> usize {
        self.state.read().await.catalog_total
    }

    pub async fn query(&self) -> CatalogQuery {
        self.state.read().await.query.clone()
    }

    fn emit(&self, event: RegistryEvent) {
        // No subscribers is fine.
        let _ = self.event_tx.send(event);
    }
}

fn job_updated(job: &Job, timestamp: DateTime<Utc>) -> RegistryEvent {
    RegistryEvent::JobUpdated {
        job_id: job.ids.execution_id.clone(),
        status: job.status,
        ready: job.ready(),
        percent: job.progress_meta.as_ref().and_then(|m| m.percent),
        timestamp,
    }
}

fn progressed(before: &Job, after: &Job) -> bool {
    let percent = |j: &Job| j.progress_meta.as_ref().and_then(|m| m.percent);
    before.status != after.status || percent(before) != percent(after)
}

fn progress_message(job: &Job) -> String {
    let meta = job.progress_meta.as_ref();
    match (
        meta.and_then(|m| m.percent),
        meta.and_then(|m| m.current_chunk),
        meta.and_then(|m| m.total_chunks),
    ) {
        (_, Some(current), Some(total)) => {
            format!("Embedding {}: chunk {}/{}", job.kind, current, total)
        }
        (Some(percent), _, _) => format!("Embedding {}: {:.0}%", job.kind, percent),
        _ => format!("Embedding {}: {}", job.kind, job.status),
    }
}

fn terminal_outcome(job: &Job) -> TerminalOutcome {
    let reason = || job.to_observation().failure_reason();
    match job.status {
        JobStatus::Success => TerminalOutcome::Succeeded(match &job.result {
            Some(JobResult::Embedding(r)) => format!(
                "Embedded {}/{} chunks",
                r.successful_chunks, r.total_chunks
            ),
            Some(JobResult::Search(r)) => format!("Search returned {} results", r.results.len()),
            None => "Embedding job completed".to_string(),
        }),
        JobStatus::Revoked => TerminalOutcome::Cancelled(reason()),
        _ => TerminalOutcome::Failed(reason()),
    }
}
