//! The polled scheduler: an external driver hits the cron endpoint on a
//! one-minute-or-slower cadence; each tick drains one batch of due jobs.
//!
//! Multiple drivers may overlap. The CAS lease (`pending -> in_progress`)
//! makes that safe: a job is owned by exactly one worker at a time, and the
//! loser of a lease race just skips. Per-job errors are recorded on the job
//! and never abort the batch.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tracing::instrument;
use utoipa::ToSchema;

use dialplane_types::{
    CallDirection, CallStatus, ProviderEvent, ProviderEventKind, ScheduledCall,
    ScheduledCallStatus,
};

use crate::{
    app::App,
    ingress::select_variant,
    keys,
    providers::{InitiateRequest, ProviderError},
    store::StoreError,
};

/// Soft deadline for one job's dispatch, inside the driver's budget.
pub const DISPATCH_TIMEOUT: Duration = Duration::from_secs(25);

/// Jobs picked up later than this past their instant get a warning.
const LATE_WARNING_SECS: i64 = 300;

#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("store: {0}")]
    Store(#[from] StoreError),
}

/// Counts returned to the cron driver for one tick.
#[derive(Debug, Default, Clone, Serialize, Deserialize, ToSchema)]
pub struct TickSummary {
    pub due: usize,
    pub completed: usize,
    pub retried: usize,
    pub failed: usize,
    pub rescheduled: usize,
    /// Lease lost to a concurrent driver, or job gone by lease time.
    pub skipped: usize,
}

#[instrument(skip(app), fields(subsys = "Scheduler"))]
pub async fn tick(app: &App) -> Result<TickSummary, SchedulerError> {
    let now = app.clock.now();
    let due = app
        .store
        .due_scheduled_calls(now, app.config.scheduler_batch_size)?;

    let mut summary = TickSummary {
        due: due.len(),
        ..Default::default()
    };

    for job in due {
        if !app.store.lease_scheduled_call(&job.id)? {
            summary.skipped += 1;
            continue;
        }

        let started = std::time::Instant::now();
        match process_leased_job(app, &job, now).await {
            Ok(JobOutcome::Completed) => summary.completed += 1,
            Ok(JobOutcome::Retried) => summary.retried += 1,
            Ok(JobOutcome::Failed) => summary.failed += 1,
            Ok(JobOutcome::Rescheduled) => summary.rescheduled += 1,
            Err(err) => {
                // bookkeeping failed, not the dispatch; put the error on the
                // job and keep draining the batch
                app.metrics.scheduler.increment_total_errors();
                tracing::error!(job_id = %job.id, error = %err, "scheduler job bookkeeping failed");
                let _ = app
                    .store
                    .fail_scheduled_call_attempt(&job.id, &err.to_string());
                summary.failed += 1;
            }
        }
        app.metrics
            .scheduler
            .record_dispatch_seconds(started.elapsed().as_secs_f64());
    }

    tracing::info!(
        due = summary.due,
        completed = summary.completed,
        retried = summary.retried,
        failed = summary.failed,
        rescheduled = summary.rescheduled,
        skipped = summary.skipped,
        "scheduler tick finished"
    );

    Ok(summary)
}

enum JobOutcome {
    Completed,
    Retried,
    Failed,
    Rescheduled,
}

async fn process_leased_job(
    app: &App,
    job: &ScheduledCall,
    now: DateTime<Utc>,
) -> Result<JobOutcome, SchedulerError> {
    let lateness = now.timestamp() - job.scheduled_at.as_datetime().timestamp();
    if lateness > LATE_WARNING_SECS {
        tracing::warn!(
            job_id = %job.id,
            late_secs = lateness,
            "scheduled call dispatched more than 5 minutes late"
        );
    }

    // clocks move and windows get edited between scheduling and dispatch;
    // re-check with the job's own zone before dialing
    if let Some(zone) = job
        .lead_timezone
        .as_deref()
        .and_then(|name| name.parse::<chrono_tz::Tz>().ok())
    {
        if let Some(tenant) = app.store.tenant(&job.tenant_id)? {
            let window = &tenant.calling_window;
            if window.enabled && !app.oracle.within_window(now, zone, window) {
                match app.oracle.next_valid_instant(now, zone, window) {
                    Ok(next) => {
                        app.store.reschedule_scheduled_call(&job.id, next)?;
                        app.metrics.scheduler.increment_jobs("rescheduled");
                        tracing::info!(
                            job_id = %job.id,
                            next = %next,
                            "window closed at dispatch time, rescheduled"
                        );
                        return Ok(JobOutcome::Rescheduled);
                    }
                    Err(err) => {
                        return fail_attempt(app, job, &err.to_string());
                    }
                }
            }
        }
    }

    let agent = match app.store.agent(&job.agent_id)? {
        Some(agent) => agent,
        None => {
            return fail_attempt(app, job, "agent no longer exists");
        }
    };

    let resolved_key = match keys::resolve(
        &app.store,
        &job.tenant_id,
        job.client_id.as_ref(),
        agent.provider,
    ) {
        Ok(resolved) => resolved,
        Err(err) => return fail_attempt(app, job, &err.to_string()),
    };

    // stable basis: retries of this job select the same variant
    let basis = format!(
        "{}{}",
        job.phone.as_str(),
        job.original_scheduled_at.as_nanos()
    );
    let experiment = app.store.running_experiment(&agent.id)?;
    let selected = select_variant(experiment.as_ref(), &basis);

    let request = InitiateRequest {
        provider: agent.provider,
        key: resolved_key.key,
        agent_external_id: agent.external_id.clone(),
        to_number: job.phone.as_str().to_string(),
        from_number: None,
        prompt_override: selected.as_ref().and_then(|s| s.prompt_override.clone()),
        metadata: json!({
            "lead_timezone": job.lead_timezone,
            "trigger_source": job.trigger_source.as_str(),
            "contact_id": job.contact_id,
            "scheduled_call_id": job.id.as_ref(),
        }),
    };

    let initiated = match tokio::time::timeout(DISPATCH_TIMEOUT, app.provider_api.initiate(request))
        .await
    {
        Ok(Ok(initiated)) => initiated,
        Ok(Err(err)) => {
            return if err.is_retryable() {
                fail_attempt(app, job, &err.to_string())
            } else {
                fail_terminal(app, job, &err)
            };
        }
        Err(_) => {
            return fail_attempt(app, job, "dispatch timed out after 25s");
        }
    };

    app.store
        .complete_scheduled_call(&job.id, &initiated.external_id, now)?;

    // dispatch-side call record; the provider webhook completes it later
    let dispatch_event = ProviderEvent {
        kind: ProviderEventKind::Started,
        provider: agent.provider,
        external_id: initiated.external_id.clone(),
        agent_external_id: agent.external_id.clone(),
        status: CallStatus::Queued,
        direction: CallDirection::Outbound,
        from_number: None,
        to_number: Some(job.phone.as_str().to_string()),
        started_at: None,
        ended_at: None,
        duration_secs: 0,
        cost_cents: 0,
        transcript: None,
        summary: None,
        voicemail: false,
        provider_meta: serde_json::Value::Null,
    };
    let upsert = app.store.upsert_call_event(&agent, &dispatch_event, now)?;

    let mut metadata = job.metadata.clone();
    metadata.experiment_id = selected.as_ref().map(|s| s.experiment_id.clone());
    metadata.variant_id = selected.as_ref().map(|s| s.variant_id.clone());
    app.store.set_call_metadata(&upsert.call.id, metadata)?;

    app.metrics.scheduler.increment_jobs("completed");
    Ok(JobOutcome::Completed)
}

fn fail_attempt(
    app: &App,
    job: &ScheduledCall,
    error: &str,
) -> Result<JobOutcome, SchedulerError> {
    let status = app.store.fail_scheduled_call_attempt(&job.id, error)?;
    Ok(match status {
        ScheduledCallStatus::Pending => {
            app.metrics.scheduler.increment_jobs("retried");
            tracing::info!(job_id = %job.id, error, "dispatch failed, will retry");
            JobOutcome::Retried
        }
        _ => {
            app.metrics.scheduler.increment_jobs("failed");
            tracing::warn!(job_id = %job.id, error, "dispatch failed, retries exhausted");
            JobOutcome::Failed
        }
    })
}

/// Fatal provider responses are recorded and not retried.
fn fail_terminal(
    app: &App,
    job: &ScheduledCall,
    error: &ProviderError,
) -> Result<JobOutcome, SchedulerError> {
    app.store
        .fail_scheduled_call_terminal(&job.id, &error.to_string())?;
    app.metrics.scheduler.increment_jobs("failed");
    tracing::warn!(job_id = %job.id, error = %error, "dispatch rejected by provider, not retrying");
    Ok(JobOutcome::Failed)
}
