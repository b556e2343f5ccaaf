use std::sync::Arc;

use futures_util::future::join_all;
use tokio::task::JoinHandle;

use crate::api::JobsApi;
use crate::clock::Clock;
use crate::errors::JobError;
use crate::models::config::ClientConfig;
use crate::models::job::{ExecutionId, Job, Observation};
use crate::notify::Notifier;
use crate::poller::{ObservationSequence, PollOptions, StatusPoller};
use crate::registry::JobRegistry;
use crate::submit::{SubmissionClient, SubmitPayload};

/// A submitted job and the poller task following it.
pub struct TrackedJob {
    pub job_id: ExecutionId,
    handle: JoinHandle<Result<Observation, JobError>>,
}

impl TrackedJob {
    /// Wait for the poller to finish.
    pub async fn wait(self) -> Result<Observation, JobError> {
        match self.handle.await {
            Ok(result) => result,
            Err(e) => Err(JobError::Poll(format!("poller task ended abnormally: {}", e))),
        }
    }

    pub fn abort(&self) {
        self.handle.abort();
    }
}

/// Submission, registry and pollers wired together.
pub struct JobService {
    submitter: SubmissionClient,
    registry: Arc<JobRegistry>,
    poller: Arc<StatusPoller>,
}

impl JobService {
    pub fn new(
        api: Arc<dyn JobsApi>,
        clock: Arc<dyn Clock>,
        notifier: Arc<dyn Notifier>,
        config: Arc<ClientConfig>,
    ) -> Self {
        let sequence = Arc::new(ObservationSequence::new());
        let poller = Arc::new(StatusPoller::new(
            Arc::clone(&api),
            Arc::clone(&sequence),
            PollOptions::from_config(&config),
        ));
        let registry = Arc::new(JobRegistry::new(
            Arc::clone(&api),
            clock,
            notifier,
            config,
            sequence,
        ));
        Self {
            submitter: SubmissionClient::new(api),
            registry,
            poller,
        }
    }

    pub fn registry(&self) -> &Arc<JobRegistry> {
        &self.registry
    }

    /// Submit a job, record it optimistically and start its poller.
    /// Nothing is recorded when the submission fails.
    pub async fn submit(&self, payload: SubmitPayload) -> Result<TrackedJob, JobError> {
        let submission = self.submitter.submit(&payload).await?;
        let job = Job::optimistic(
            submission.job_id.clone(),
            submission.kind,
            self.registry.now(),
            submission.metadata,
        );
        self.registry.record_submission(job).await;

        let handle = self.track(submission.job_id.clone());
        Ok(TrackedJob {
            job_id: submission.job_id,
            handle,
        })
    }

    /// Start a poller for a job already in the registry.
    pub fn track(&self, job_id: ExecutionId) -> JoinHandle<Result<Observation, JobError>> {
        let registry = Arc::clone(&self.registry);
        let poller = Arc::clone(&self.poller);
        tokio::spawn(async move {
            let result = poller
                .poll(&job_id, |obs| {
                    let registry = Arc::clone(&registry);
                    async move { registry.apply_poll_observation(obs).await.poll_control() }
                })
                .await;
            match &result {
                Ok(_) => tracing::info!(job_id = %job_id, "Job completed"),
                Err(e) if e.is_timeout() => {
                    tracing::warn!(job_id = %job_id, error = %e, "Job still running, stopped polling")
                }
                Err(e) => tracing::info!(job_id = %job_id, error = %e, "Job did not complete"),
            }
            result
        })
    }

    /// Wait for several tracked jobs concurrently; results keep input order.
    pub async fn wait_all(jobs: Vec<TrackedJob>) -> Vec<Result<Observation, JobError>> {
        join_all(jobs.into_iter().map(TrackedJob::wait)).await
    }
}
