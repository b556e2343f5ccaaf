use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::api::{ApiError, JobsApi};
use crate::errors::JobError;
use crate::models::config::ClientConfig;
use crate::models::job::{ExecutionId, Job, Observation};

/// Process-wide observation ticket dispenser. A ticket is drawn before the
/// request it stamps, so a response that was requested earlier always
/// carries a smaller number than one requested later.
#[derive(Debug, Default)]
pub struct ObservationSequence(AtomicU64);

impl ObservationSequence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&self) -> u64 {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollOptions {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl PollOptions {
    pub fn from_config(config: &ClientConfig) -> Self {
        Self {
            interval: config.poll_interval(),
            max_attempts: config.max_poll_attempts,
        }
    }
}

/// What the observer wants the poller to do after an observation.
#[derive(Debug, Clone, PartialEq)]
pub enum PollControl {
    Continue,
    /// The job already reached a terminal state by another path (cancel,
    /// catalog reconciliation). Polling ends with that outcome.
    Settled(Job),
    /// The job is no longer tracked, e.g. after a reset.
    Untracked,
}

pub struct StatusPoller {
    api: Arc<dyn JobsApi>,
    sequence: Arc<ObservationSequence>,
    options: PollOptions,
}

impl StatusPoller {
    pub fn new(
        api: Arc<dyn JobsApi>,
        sequence: Arc<ObservationSequence>,
        options: PollOptions,
    ) -> Self {
        Self {
            api,
            sequence,
            options,
        }
    }

    pub fn options(&self) -> PollOptions {
        self.options
    }

    /// Poll until the job is ready or the attempt budget runs out.
    ///
    /// Every received observation is handed to `on_progress` before the
    /// readiness check. Request errors are retried; if no attempt ever got a
    /// response the last request error is returned, otherwise exhaustion is a
    /// timeout.
    pub async fn poll<F, Fut>(
        &self,
        job_id: &ExecutionId,
        mut on_progress: F,
    ) -> Result<Observation, JobError>
    where
        F: FnMut(Observation) -> Fut + Send,
        Fut: Future<Output = PollControl> + Send,
    {
        let max_attempts = self.options.max_attempts;
        let mut last_error: Option<ApiError> = None;
        let mut observed = false;

        for attempt in 1..=max_attempts {
            let seq = self.sequence.next();
            match self.api.job_status(job_id).await {
                Ok(resp) => {
                    observed = true;
                    let mut obs = resp.into_observation(seq);
                    obs.job_id = job_id.clone();

                    match on_progress(obs.clone()).await {
                        PollControl::Continue => {}
                        PollControl::Settled(job) => return settle(job_id, job.to_observation()),
                        PollControl::Untracked => {
                            return Err(JobError::Untracked(job_id.to_string()))
                        }
                    }

                    if obs.ready() {
                        return settle(job_id, obs);
                    }
                }
                Err(e) => {
                    tracing::debug!(
                        job_id = %job_id,
                        attempt,
                        error = %e,
                        "Status poll failed, will retry"
                    );
                    last_error = Some(e);
                }
            }

            if attempt < max_attempts {
                tokio::time::sleep(self.options.interval).await;
            }
        }

        match last_error {
            Some(e) if !observed => Err(JobError::poll(e)),
            _ => {
                tracing::warn!(
                    job_id = %job_id,
                    attempts = max_attempts,
                    "Job not ready before polling budget ran out"
                );
                Err(JobError::Timeout {
                    job_id: job_id.to_string(),
                    attempts: max_attempts,
                })
            }
        }
    }
}

fn settle(job_id: &ExecutionId, obs: Observation) -> Result<Observation, JobError> {
    if obs.successful() {
        Ok(obs)
    } else {
        Err(JobError::RemoteJobFailure {
            job_id: job_id.to_string(),
            error: obs.failure_reason(),
        })
    }
}
