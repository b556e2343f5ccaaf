//! End-to-end registry tests.
//!
//! These drive the full submit / poll / reconcile pipeline through
//! `JobService` against the scripted in-memory jobs API.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use embedding_jobs::api::mock::catalog_entry;
use embedding_jobs::api::MockJobsApi;
use embedding_jobs::clock::{Clock, FakeClock};
use embedding_jobs::errors::JobError;
use embedding_jobs::events::RegistryEvent;
use embedding_jobs::models::{
    ClearCategory, ClientConfig, ExecutionId, JobKind, JobResult, JobSource, JobStatus,
    Observation, RecordId,
};
use embedding_jobs::notify::{NotificationLevel, RecordingNotifier};
use embedding_jobs::registry::ObservationOutcome;
use embedding_jobs::service::JobService;
use embedding_jobs::submit::SubmitPayload;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

struct TestEnv {
    service: JobService,
    api: Arc<MockJobsApi>,
    notifier: Arc<RecordingNotifier>,
    clock: FakeClock,
}

fn setup(api: MockJobsApi, config: ClientConfig) -> TestEnv {
    let api = Arc::new(api);
    let notifier = Arc::new(RecordingNotifier::new());
    let clock = FakeClock::new(Utc::now());
    let service = JobService::new(
        api.clone(),
        Arc::new(clock.clone()),
        notifier.clone(),
        Arc::new(config),
    );
    TestEnv {
        service,
        api,
        notifier,
        clock,
    }
}

fn text_payload(text: &str) -> SubmitPayload {
    SubmitPayload::Text {
        text: text.to_string(),
        model_id: "text-embedding-3-small".to_string(),
        store_id: None,
    }
}

fn file_payload(file_id: &str) -> SubmitPayload {
    SubmitPayload::File {
        file_id: file_id.to_string(),
        model_id: "text-embedding-3-small".to_string(),
        store_id: Some("vs-1".to_string()),
    }
}

async fn wait_for_status_calls(api: &MockJobsApi, calls: usize) {
    while api.calls().status < calls {
        tokio::task::yield_now().await;
    }
}

// ---------------------------------------------------------------------------
// Submit, progress, success
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_text_job_progress_then_success() {
    let env = setup(MockJobsApi::new(), ClientConfig::default());
    env.api.push_progress("job-1", 40.0);
    env.api.push_success("job-1", 10, 10);
    let mut events = env.service.registry().subscribe();

    let tracked = env.service.submit(text_payload("hello")).await.unwrap();

    // Optimistic record at the top before any poll lands
    let jobs = env.service.registry().jobs().await;
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].job_id(), "job-1");
    assert_eq!(jobs[0].status, JobStatus::Pending);
    assert!(!jobs[0].ready());
    assert_eq!(jobs[0].kind, JobKind::Text);

    let obs = tracked.wait().await.unwrap();
    assert_eq!(obs.status, JobStatus::Success);

    let jobs = env.service.registry().jobs().await;
    assert_eq!(jobs.len(), 1, "progress updates in place");
    let job = &jobs[0];
    assert!(job.successful());
    match &job.result {
        Some(JobResult::Embedding(r)) => {
            assert_eq!(r.total_chunks, 10);
            assert_eq!(r.successful_chunks, 10);
        }
        other => panic!("Expected embedding result, got {:?}", other),
    }

    let shown = env.notifier.shown_for("job-1");
    assert!(shown.iter().any(|n| n.message.contains("40%")));
    assert_eq!(env.notifier.terminal_count("job-1"), 1);
    assert_eq!(
        shown.last().map(|n| n.level),
        Some(NotificationLevel::Success)
    );
    assert!(env.notifier.max_live("job-1") <= 1);

    let mut percents = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let RegistryEvent::JobUpdated { percent, .. } = event {
            percents.push(percent);
        }
    }
    assert!(percents.contains(&Some(40.0)));
}

#[tokio::test(start_paused = true)]
async fn test_success_schedules_catalog_refresh_and_dedupes() {
    let env = setup(MockJobsApi::new(), ClientConfig::default());
    env.api.push_success("job-1", 4, 4);

    let tracked = env.service.submit(text_payload("hello")).await.unwrap();
    tracked.wait().await.unwrap();
    assert_eq!(env.api.calls().list, 0, "refresh waits for the settle delay");

    // The backend has persisted the record by the time the refresh runs
    env.api.insert_catalog(catalog_entry(
        "job-1",
        JobStatus::Success,
        JobKind::Text,
        env.clock.now(),
    ));
    tokio::time::sleep(Duration::from_secs(2)).await;

    assert_eq!(env.api.calls().list, 1);
    let jobs = env.service.registry().jobs().await;
    assert_eq!(jobs.len(), 1, "one entry per execution id");
    assert_eq!(jobs[0].source, JobSource::Catalog);
    assert_eq!(jobs[0].ids.record_id, Some(RecordId::from("rec-job-1")));
    assert!(env.service.registry().active_ids().await.is_empty());
    assert_eq!(env.notifier.terminal_count("job-1"), 1);
}

// ---------------------------------------------------------------------------
// Cancel racing an in-flight poll
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_cancel_before_first_poll_resolves() {
    let env = setup(MockJobsApi::gated(), ClientConfig::default());
    env.api.push_status("job-1", JobStatus::Pending);

    let tracked = env.service.submit(file_payload("file-1")).await.unwrap();
    wait_for_status_calls(&env.api, 1).await;

    let registry = env.service.registry();
    let job = registry
        .cancel(&ExecutionId::from("job-1"))
        .await
        .unwrap()
        .expect("job is tracked");
    assert_eq!(job.status, JobStatus::Revoked);
    assert!(job.ready());
    assert!(job.failed());

    // Let the stale PENDING response through
    env.api.release_status(1);
    let result = tracked.wait().await;
    assert!(
        matches!(result, Err(JobError::RemoteJobFailure { .. })),
        "got {:?}",
        result
    );

    let job = registry.get(&ExecutionId::from("job-1")).await.unwrap();
    assert_eq!(job.status, JobStatus::Revoked);
    assert_eq!(env.api.cancelled(), vec![ExecutionId::from("job-1")]);
    assert_eq!(env.notifier.terminal_count("job-1"), 1);
    assert_eq!(
        env.notifier.shown_for("job-1").last().map(|n| n.level),
        Some(NotificationLevel::Failure)
    );
}

#[tokio::test]
async fn test_cancelled_job_dropped_from_page_still_fails_its_poller() {
    let env = setup(MockJobsApi::gated(), ClientConfig::default());
    env.api.push_status("job-1", JobStatus::Pending);

    let tracked = env.service.submit(text_payload("hello")).await.unwrap();
    wait_for_status_calls(&env.api, 1).await;

    let registry = env.service.registry();
    registry.cancel(&tracked.job_id).await.unwrap();
    // The backend has not persisted the job yet, so the page is empty
    registry.reload_catalog().await.unwrap();
    assert!(registry.jobs().await.is_empty());

    env.api.release_status(1);
    match tracked.wait().await {
        Err(JobError::RemoteJobFailure { job_id, error }) => {
            assert_eq!(job_id, "job-1");
            assert!(error.contains("cancelled"), "got {}", error);
        }
        other => panic!("Expected RemoteJobFailure, got {:?}", other),
    }
    let job = registry.get(&ExecutionId::from("job-1")).await.unwrap();
    assert_eq!(job.status, JobStatus::Revoked);
    assert_eq!(env.notifier.terminal_count("job-1"), 1);
}

#[tokio::test]
async fn test_cancel_rejected_remotely_leaves_job_running() {
    let env = setup(MockJobsApi::gated(), ClientConfig::default());
    env.api.fail_cancels("worker unreachable");

    let tracked = env.service.submit(text_payload("hello")).await.unwrap();
    let err = env
        .service
        .registry()
        .cancel(&tracked.job_id)
        .await
        .unwrap_err();
    assert!(matches!(err, JobError::Cancel(_)));

    let job = env.service.registry().get(&tracked.job_id).await.unwrap();
    assert_eq!(job.status, JobStatus::Pending);
    assert_eq!(env.notifier.terminal_count("job-1"), 0);
    tracked.abort();
}

#[tokio::test]
async fn test_reset_stops_running_poller() {
    let env = setup(MockJobsApi::gated(), ClientConfig::default());
    env.api.push_status("job-1", JobStatus::Started);

    let tracked = env.service.submit(text_payload("hello")).await.unwrap();
    wait_for_status_calls(&env.api, 1).await;

    env.service.registry().reset().await;
    env.api.release_status(1);

    let result = tracked.wait().await;
    assert!(matches!(result, Err(JobError::Untracked(_))), "got {:?}", result);
    assert!(env.service.registry().jobs().await.is_empty());
}

// ---------------------------------------------------------------------------
// Clear by category
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_clear_failed_keeps_succeeded_and_active() {
    let env = setup(MockJobsApi::gated(), ClientConfig::default());
    let now = env.clock.now();
    for i in 0..3 {
        env.api.insert_catalog(catalog_entry(
            &format!("failed-{}", i),
            JobStatus::Failure,
            JobKind::File,
            now - chrono::Duration::minutes(10 + i),
        ));
    }
    for i in 0..2 {
        env.api.insert_catalog(catalog_entry(
            &format!("done-{}", i),
            JobStatus::Success,
            JobKind::Text,
            now - chrono::Duration::minutes(20 + i),
        ));
    }

    let tracked = env.service.submit(text_payload("still running")).await.unwrap();
    let registry = env.service.registry();
    registry.reload_catalog().await.unwrap();
    assert_eq!(registry.jobs().await.len(), 6);

    let count = registry.clear_by_category(ClearCategory::Failed).await.unwrap();
    assert_eq!(count, 3);
    assert_eq!(env.api.deleted().len(), 3);
    assert_eq!(env.api.calls().clear, 1);

    let jobs = registry.jobs().await;
    let ids: Vec<&str> = jobs.iter().map(|j| j.job_id()).collect();
    assert_eq!(ids, vec!["job-1", "done-0", "done-1"]);
    assert!(jobs.iter().all(|j| j.status != JobStatus::Failure));
    tracked.abort();
}

#[tokio::test]
async fn test_delete_refuses_in_flight_job() {
    let env = setup(MockJobsApi::gated(), ClientConfig::default());
    let tracked = env.service.submit(text_payload("hello")).await.unwrap();

    let err = env
        .service
        .registry()
        .delete_one(&RecordId::from("job-1"))
        .await
        .unwrap_err();
    assert!(matches!(err, JobError::Delete(_)));
    assert_eq!(env.api.calls().delete, 0);
    tracked.abort();
}

// ---------------------------------------------------------------------------
// Poll exhaustion
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_poll_exhaustion_times_out_and_keeps_job() {
    let config = ClientConfig {
        max_poll_attempts: 150,
        poll_interval_ms: 2000,
        ..Default::default()
    };
    let env = setup(MockJobsApi::new(), config);
    env.api.push_status("job-1", JobStatus::Progress);

    let started = tokio::time::Instant::now();
    let tracked = env.service.submit(text_payload("slow")).await.unwrap();
    let result = tracked.wait().await;

    match result {
        Err(JobError::Timeout { job_id, attempts }) => {
            assert_eq!(job_id, "job-1");
            assert_eq!(attempts, 150);
        }
        other => panic!("Expected timeout, got {:?}", other),
    }
    assert_eq!(env.api.calls().status, 150);
    assert!(started.elapsed() >= Duration::from_secs(298));

    let job = env
        .service
        .registry()
        .get(&ExecutionId::from("job-1"))
        .await
        .expect("job stays listed");
    assert_eq!(job.status, JobStatus::Progress);
    assert!(!job.ready());
    assert_eq!(env.notifier.terminal_count("job-1"), 0);
}

// ---------------------------------------------------------------------------
// Registry invariants
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_terminal_status_is_never_downgraded() {
    let env = setup(MockJobsApi::new(), ClientConfig::default());
    env.api.push_failure("job-1", "model not found");

    let tracked = env.service.submit(text_payload("hello")).await.unwrap();
    let err = tracked.wait().await.unwrap_err();
    assert_eq!(err.to_string(), "Job job-1 failed: model not found");

    let registry = env.service.registry();
    let late = Observation {
        job_id: ExecutionId::from("job-1"),
        seq: registry.sequence().next(),
        status: JobStatus::Progress,
        kind: None,
        result: None,
        error: None,
        progress_meta: None,
    };
    let outcome = registry.apply_poll_observation(late).await;
    assert!(matches!(outcome, ObservationOutcome::AlreadyTerminal(_)));

    let job = registry.get(&ExecutionId::from("job-1")).await.unwrap();
    assert_eq!(job.status, JobStatus::Failure);
    assert_eq!(job.error.as_deref(), Some("model not found"));
    assert_eq!(env.notifier.terminal_count("job-1"), 1);
}

#[tokio::test]
async fn test_reload_is_idempotent() {
    let env = setup(MockJobsApi::gated(), ClientConfig::default());
    let now = env.clock.now();
    env.api.insert_catalog(catalog_entry(
        "old-1",
        JobStatus::Success,
        JobKind::File,
        now - chrono::Duration::hours(1),
    ));
    let tracked = env.service.submit(text_payload("hello")).await.unwrap();

    let registry = env.service.registry();
    registry.reload_catalog().await.unwrap();
    let first = registry.jobs().await;
    registry.reload_catalog().await.unwrap();
    let second = registry.jobs().await;

    assert_eq!(first, second);
    assert_eq!(first.len(), 2);
    assert_eq!(env.api.calls().list, 2);
    tracked.abort();
}

#[tokio::test]
async fn test_concurrent_jobs_stay_independent() {
    let config = ClientConfig {
        poll_interval_ms: 5,
        settle_delay_ms: 5,
        ..Default::default()
    };
    let env = setup(MockJobsApi::new(), config);
    env.api.push_success("job-1", 2, 2);
    env.api.push_failure("job-2", "unsupported file type");
    env.api.push_success("job-3", 5, 4);

    let mut tracked = Vec::new();
    for text in ["a", "b", "c"] {
        tracked.push(env.service.submit(text_payload(text)).await.unwrap());
    }
    let results = JobService::wait_all(tracked).await;

    assert!(results[0].is_ok());
    assert!(matches!(results[1], Err(JobError::RemoteJobFailure { .. })));
    assert!(results[2].is_ok());
    for id in ["job-1", "job-2", "job-3"] {
        assert_eq!(env.notifier.terminal_count(id), 1, "{}", id);
        assert!(env.notifier.max_live(id) <= 1, "{}", id);
    }
    let registry = env.service.registry();
    assert!(registry.get(&ExecutionId::from("job-1")).await.unwrap().successful());
    assert!(registry.get(&ExecutionId::from("job-2")).await.unwrap().failed());
    assert!(registry.get(&ExecutionId::from("job-3")).await.unwrap().successful());
}
