// CLI job commands: embed-file, embed-text, status, list, cancel, delete, clear

use std::io::{self, BufRead, Write};
use std::sync::Arc;

use anyhow::Context;
use chrono::{DateTime, Utc};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

use super::connection_error_message;
use crate::api::{ApiError, HttpJobsApi, JobsApi};
use crate::clock::SystemClock;
use crate::errors::JobError;
use crate::events::RegistryEvent;
use crate::models::catalog::ClearCategory;
use crate::models::config::ClientConfig;
use crate::models::job::{ExecutionId, Job, JobResult, JobStatus, RecordId};
use crate::notify::LogNotifier;
use crate::registry::JobFilter;
use crate::service::JobService;
use crate::submit::SubmitPayload;

fn build_api(config: &ClientConfig) -> anyhow::Result<Arc<HttpJobsApi>> {
    let api = HttpJobsApi::new(config).context("Failed to create API client")?;
    Ok(Arc::new(api))
}

fn build_service(config: ClientConfig) -> anyhow::Result<JobService> {
    let api = build_api(&config)?;
    Ok(JobService::new(
        api,
        Arc::new(SystemClock),
        Arc::new(LogNotifier),
        Arc::new(config),
    ))
}

/// Turn an API error into a user-facing one.
fn api_error(err: ApiError, api_url: &str) -> anyhow::Error {
    if err.is_unreachable() {
        anyhow::anyhow!("{}", connection_error_message(api_url))
    } else {
        anyhow::anyhow!("{}", err)
    }
}

fn job_error(err: JobError, api_url: &str) -> anyhow::Error {
    match err {
        JobError::Unreachable(_) => anyhow::anyhow!("{}", connection_error_message(api_url)),
        other => other.into(),
    }
}

fn confirm(prompt: &str) -> io::Result<bool> {
    print!("{} [y/N] ", prompt);
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    let answer = line.trim().to_lowercase();
    Ok(answer == "y" || answer == "yes")
}

/// Format an age string like "2 minutes ago".
fn format_age(dt: &DateTime<Utc>, now: DateTime<Utc>) -> String {
    let secs = now.signed_duration_since(*dt).num_seconds().max(0);
    if secs < 60 {
        format!("{} seconds ago", secs)
    } else if secs < 3600 {
        format!("{} minutes ago", secs / 60)
    } else if secs < 86400 {
        format!("{} hours ago", secs / 3600)
    } else {
        format!("{} days ago", secs / 86400)
    }
}

fn progress_cell(job: &Job) -> String {
    if let Some(JobResult::Embedding(r)) = &job.result {
        return format!("{}/{}", r.successful_chunks, r.total_chunks);
    }
    let meta = job.progress_meta.as_ref();
    match (
        meta.and_then(|m| m.current_chunk),
        meta.and_then(|m| m.total_chunks),
        meta.and_then(|m| m.percent),
    ) {
        (Some(current), Some(total), _) => format!("{}/{}", current, total),
        (_, _, Some(percent)) => format!("{:.0}%", percent),
        _ => "-".to_string(),
    }
}

fn truncate(value: &str, width: usize) -> String {
    if value.chars().count() > width {
        let kept: String = value.chars().take(width.saturating_sub(3)).collect();
        format!("{}...", kept)
    } else {
        value.to_string()
    }
}

fn describe_result(result: &JobResult) -> String {
    match result {
        JobResult::Embedding(r) => {
            let mut line = format!(
                "{} of {} chunks embedded",
                r.successful_chunks, r.total_chunks
            );
            if r.failed_chunks > 0 {
                line.push_str(&format!(", {} failed", r.failed_chunks));
            }
            if let Some(store) = &r.store_id {
                line.push_str(&format!(" into store {}", store));
            }
            line
        }
        JobResult::Search(r) => format!("{} search results", r.results.len()),
    }
}

fn print_progress(job_id: &ExecutionId, status: JobStatus, percent: Option<f64>) {
    match percent {
        Some(p) => println!("  {} {} ({:.0}%)", job_id, status, p),
        None => println!("  {} {}", job_id, status),
    }
}

/// ejobs embed-file / embed-text
pub async fn cmd_embed(
    config: ClientConfig,
    payload: SubmitPayload,
    no_wait: bool,
) -> anyhow::Result<()> {
    let api_url = config.api_url.clone();
    let service = build_service(config)?;
    let mut events = BroadcastStream::new(service.registry().subscribe());

    let tracked = service
        .submit(payload)
        .await
        .map_err(|e| job_error(e, &api_url))?;
    let job_id = tracked.job_id.clone();
    println!("Submitted job {}", job_id);

    if no_wait {
        tracked.abort();
        println!("Check progress with: ejobs status {}", job_id);
        return Ok(());
    }

    let wait = tracked.wait();
    tokio::pin!(wait);
    let outcome = loop {
        tokio::select! {
            result = &mut wait => break result,
            Some(event) = events.next() => {
                if let Ok(RegistryEvent::JobUpdated { job_id: id, status, percent, .. }) = event {
                    if id == job_id {
                        print_progress(&id, status, percent);
                    }
                }
            }
        }
    };

    let obs = outcome.map_err(|e| job_error(e, &api_url))?;
    println!("Job {} finished: {}", job_id, obs.status);
    if let Some(result) = &obs.result {
        println!("  {}", describe_result(result));
    }
    Ok(())
}

/// ejobs status
pub async fn cmd_status(config: ClientConfig, job_id: &str, json: bool) -> anyhow::Result<()> {
    let api = build_api(&config)?;
    let resp = api
        .job_status(&ExecutionId::from(job_id))
        .await
        .map_err(|e| api_error(e, &config.api_url))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&resp)?);
        return Ok(());
    }

    println!("Job:      {}", resp.job_id);
    println!("Status:   {}", resp.status);
    if let Some(task_type) = &resp.task_type {
        println!("Type:     {}", task_type);
    }
    if let Some(meta) = &resp.meta {
        if let Some(percent) = meta.percent {
            println!("Progress: {:.0}%", percent);
        }
        if let Some(model) = &meta.model_id {
            println!("Model:    {}", model);
        }
    }
    if let Some(result) = &resp.result {
        println!("Result:   {}", describe_result(result));
    }
    if let Some(error) = &resp.error {
        println!("Error:    {}", error);
    }
    Ok(())
}

/// ejobs list
pub async fn cmd_list(
    config: ClientConfig,
    filter: JobFilter,
    skip: usize,
    limit: Option<usize>,
    json: bool,
) -> anyhow::Result<()> {
    let limit = limit.unwrap_or(config.page_size);
    let api_url = config.api_url.clone();
    let service = build_service(config)?;
    let registry = service.registry();

    registry
        .refresh_catalog(Some(filter.to_query(skip, limit)))
        .await
        .map_err(|e| job_error(e, &api_url))?;
    let jobs = registry.filtered(&filter).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&jobs)?);
        return Ok(());
    }

    if jobs.is_empty() {
        println!("No jobs found.");
        return Ok(());
    }

    println!(
        "{:<38}{:<10}{:<6}{:<10}{:<26}{:<16}",
        "JOB ID", "STATUS", "KIND", "PROGRESS", "MODEL", "CREATED"
    );
    let now = Utc::now();
    for job in &jobs {
        println!(
            "{:<38}{:<10}{:<6}{:<10}{:<26}{:<16}",
            truncate(job.job_id(), 37),
            job.status.as_str(),
            job.kind.as_str(),
            progress_cell(job),
            truncate(job.model_id().unwrap_or("-"), 25),
            format_age(&job.created_at, now)
        );
    }
    println!(
        "\nShowing {} of {} jobs",
        jobs.len(),
        registry.catalog_total().await
    );
    Ok(())
}

/// ejobs cancel
pub async fn cmd_cancel(config: ClientConfig, job_id: &str) -> anyhow::Result<()> {
    let api_url = config.api_url.clone();
    let service = build_service(config)?;
    let job_id = ExecutionId::from(job_id);
    let cancelled = service
        .registry()
        .cancel(&job_id)
        .await
        .map_err(|e| job_error(e, &api_url))?;
    match cancelled {
        Some(job) => println!("Job {} is now {}.", job_id, job.status),
        None => println!("Cancel requested for job {}.", job_id),
    }
    Ok(())
}

/// ejobs delete
pub async fn cmd_delete(
    config: ClientConfig,
    id: &str,
    by_execution_id: bool,
    yes: bool,
) -> anyhow::Result<()> {
    if !yes && !confirm(&format!("Are you sure you want to delete job record '{}'?", id))? {
        println!("Cancelled.");
        return Ok(());
    }

    let api_url = config.api_url.clone();
    let service = build_service(config)?;
    let registry = service.registry();
    let record_id = if by_execution_id {
        registry
            .reload_catalog()
            .await
            .map_err(|e| job_error(e, &api_url))?;
        registry.resolve_record_id(&ExecutionId::from(id)).await?
    } else {
        RecordId::from(id)
    };

    registry
        .delete_one(&record_id)
        .await
        .map_err(|e| job_error(e, &api_url))?;
    println!("Job record '{}' deleted.", record_id);
    Ok(())
}

/// ejobs clear
pub async fn cmd_clear(
    config: ClientConfig,
    category: ClearCategory,
    yes: bool,
) -> anyhow::Result<()> {
    if !yes
        && !confirm(&format!(
            "Are you sure you want to delete all '{}' job records?",
            category
        ))?
    {
        println!("Cancelled.");
        return Ok(());
    }

    let api_url = config.api_url.clone();
    let service = build_service(config)?;
    let count = service
        .registry()
        .clear_by_category(category)
        .await
        .map_err(|e| job_error(e, &api_url))?;
    println!("Deleted {} job records ({}).", count, category);
    Ok(())
}
