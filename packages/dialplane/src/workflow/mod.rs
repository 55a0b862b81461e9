//! Post-call workflow execution.
//!
//! Workflows for one call run concurrently and independently; actions
//! inside one workflow run strictly in configuration order. The executor
//! never throws: every action failure is recorded in the execution log and
//! the pipeline moves on, except for the few registry kinds allowed to
//! fatal-stop the remainder.

pub mod actions;
pub mod conditions;
pub mod integrations;
pub mod template;
pub mod url_guard;

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use serde_json::Value;
use tracing::instrument;

use dialplane_types::{
    aggregate_status, ActionOutcome, ActionResult, CallRecord, ExecutionLog, ExecutionLogId,
    ExecutionStatus, Timestamp, Workflow,
};

use crate::app::App;

use actions::{ActionError, ActionFailure};
use integrations::IntegrationContext;

/// Deadline for one external HTTP call made by an action.
pub const ACTION_TIMEOUT: Duration = Duration::from_secs(15);

/// Soft deadline for one workflow; actions that would start after it are
/// skipped and the workflow lands on partial_failure.
pub const WORKFLOW_TIMEOUT: Duration = Duration::from_secs(60);

/// Initial attempt plus up to two retries on retryable errors.
pub const MAX_ATTEMPTS: u32 = 3;

const BACKOFF_BASE: Duration = Duration::from_secs(1);

/// Run every workflow against the call, concurrently. Called from the
/// post-call task after the webhook ack; failures stay in the logs.
pub async fn execute_all(app: &Arc<App>, workflows: Vec<Workflow>, call: &CallRecord, payload: Value) {
    let context = IntegrationContext::resolve(app, &call.tenant_id).await;
    let context = Arc::new(context);

    let tasks: Vec<_> = workflows
        .into_iter()
        .map(|workflow| {
            let app = app.clone();
            let call = call.clone();
            let payload = payload.clone();
            let context = context.clone();
            tokio::spawn(async move {
                execute_one(&app, &workflow, &call, &payload, &context).await;
            })
        })
        .collect();

    for task in tasks {
        if let Err(err) = task.await {
            tracing::error!(error = %err, "workflow task panicked");
        }
    }
}

#[instrument(skip(app, workflow, call, payload, context), fields(subsys = "WorkflowExecutor", workflow_id = %workflow.id, call_id = %call.id))]
pub async fn execute_one(
    app: &Arc<App>,
    workflow: &Workflow,
    call: &CallRecord,
    payload: &Value,
    context: &IntegrationContext,
) {
    let started_wall = app.clock.now();
    let started = std::time::Instant::now();

    let status;
    let mut results: Vec<ActionResult> = Vec::with_capacity(workflow.actions.len());

    if !conditions::all_pass(&workflow.conditions, payload) {
        status = ExecutionStatus::Skipped;
    } else {
        let mut stop_error: Option<String> = None;

        for (index, action) in workflow.actions.iter().enumerate() {
            if let Some(reason) = &stop_error {
                results.push(skipped_result(app, index, action.kind, reason));
                continue;
            }
            if started.elapsed() >= WORKFLOW_TIMEOUT {
                results.push(skipped_result(app, index, action.kind, "workflow deadline exceeded"));
                continue;
            }

            let result = run_with_retry(app, index, action, payload, context).await;
            app.metrics.workflow.increment_actions(
                action.kind.as_str(),
                match result.status {
                    ActionOutcome::Success => "success",
                    ActionOutcome::Failed => "failed",
                    ActionOutcome::Skipped => "skipped",
                },
            );

            if result.status == ActionOutcome::Failed
                && action.kind.may_fatal_stop()
                && result.fatal_stop
            {
                stop_error = Some(format!(
                    "stopped after fatal failure of action {} ({})",
                    index,
                    action.kind.as_str()
                ));
            }
            results.push(result.into_action_result());
        }

        // a deadline-skipped tail forces partial_failure even if everything
        // that ran succeeded
        let timed_out = results
            .iter()
            .any(|r| r.status == ActionOutcome::Skipped);
        status = match aggregate_status(&results) {
            ExecutionStatus::Completed if timed_out => ExecutionStatus::PartialFailure,
            other => other,
        };
    }

    let completed_wall = app.clock.now();
    let log = ExecutionLog {
        id: ExecutionLogId::generate(),
        tenant_id: workflow.tenant_id.clone(),
        workflow_id: workflow.id.clone(),
        call_id: call.id.clone(),
        status,
        actions_succeeded: results
            .iter()
            .filter(|r| r.status == ActionOutcome::Success)
            .count() as u32,
        actions_failed: results
            .iter()
            .filter(|r| r.status == ActionOutcome::Failed)
            .count() as u32,
        actions: results,
        started_at: Timestamp::from(started_wall),
        completed_at: Timestamp::from(completed_wall),
    };

    app.metrics.workflow.increment_executions(match status {
        ExecutionStatus::Completed => "completed",
        ExecutionStatus::PartialFailure => "partial_failure",
        ExecutionStatus::Failed => "failed",
        ExecutionStatus::Skipped => "skipped",
    });
    app.metrics
        .workflow
        .record_execution_seconds(started.elapsed().as_secs_f64());

    if let Err(err) = app.store.put_execution_log(log) {
        tracing::error!(workflow_id = %workflow.id, error = %err, "failed to write execution log");
    }
}

struct AttemptResult {
    index: usize,
    kind: dialplane_types::ActionKind,
    status: ActionOutcome,
    started_at: Timestamp,
    completed_at: Timestamp,
    duration_ms: u64,
    attempts: u32,
    error: Option<String>,
    fatal_stop: bool,
}

impl AttemptResult {
    fn into_action_result(self) -> ActionResult {
        ActionResult {
            index: self.index,
            kind: self.kind,
            status: self.status,
            started_at: self.started_at,
            completed_at: self.completed_at,
            duration_ms: self.duration_ms,
            attempts: self.attempts,
            error: self.error,
        }
    }
}

fn skipped_result(
    app: &Arc<App>,
    index: usize,
    kind: dialplane_types::ActionKind,
    reason: &str,
) -> ActionResult {
    let now = Timestamp::from(app.clock.now());
    ActionResult {
        index,
        kind,
        status: ActionOutcome::Skipped,
        started_at: now,
        completed_at: now,
        duration_ms: 0,
        attempts: 0,
        error: Some(reason.to_string()),
    }
}

async fn run_with_retry(
    app: &Arc<App>,
    index: usize,
    action: &dialplane_types::ActionConfig,
    payload: &Value,
    context: &IntegrationContext,
) -> AttemptResult {
    let started_wall = app.clock.now();
    let started = std::time::Instant::now();
    let config = template::interpolate_value(&action.config, payload);

    let mut attempts = 0;
    let mut last_error: Option<ActionFailure> = None;

    while attempts < MAX_ATTEMPTS {
        attempts += 1;

        let outcome = tokio::time::timeout(
            ACTION_TIMEOUT,
            actions::run(app, action.kind, &config, payload, context),
        )
        .await;

        let failure = match outcome {
            Ok(Ok(())) => {
                return AttemptResult {
                    index,
                    kind: action.kind,
                    status: ActionOutcome::Success,
                    started_at: Timestamp::from(started_wall),
                    completed_at: Timestamp::from(app.clock.now()),
                    duration_ms: started.elapsed().as_millis() as u64,
                    attempts,
                    error: None,
                    fatal_stop: false,
                };
            }
            Ok(Err(failure)) => failure,
            Err(_) => ActionFailure {
                error: ActionError::Retryable("action timed out after 15s".into()),
                fatal_stop: false,
            },
        };

        let retryable = matches!(failure.error, ActionError::Retryable(_));
        last_error = Some(failure);

        if retryable && attempts < MAX_ATTEMPTS {
            tokio::time::sleep(backoff_delay(attempts)).await;
            continue;
        }
        break;
    }

    let failure = last_error.expect("loop ran at least once");
    AttemptResult {
        index,
        kind: action.kind,
        status: ActionOutcome::Failed,
        started_at: Timestamp::from(started_wall),
        completed_at: Timestamp::from(app.clock.now()),
        duration_ms: started.elapsed().as_millis() as u64,
        attempts,
        error: Some(failure.error.to_string()),
        fatal_stop: failure.fatal_stop,
    }
}

/// Exponential backoff: 1s base, doubling, +-20% jitter.
fn backoff_delay(completed_attempts: u32) -> Duration {
    let exponent = completed_attempts.saturating_sub(1).min(8);
    let base_ms = BACKOFF_BASE.as_millis() as u64 * (1u64 << exponent);
    let jitter = rand::rng().random_range(0.8..=1.2);
    Duration::from_millis((base_ms as f64 * jitter) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_and_jitters() {
        for attempt in 1..=3 {
            let expected_ms = 1000u64 << (attempt - 1);
            for _ in 0..20 {
                let delay = backoff_delay(attempt).as_millis() as u64;
                assert!(delay >= expected_ms * 8 / 10, "{} < {}", delay, expected_ms);
                assert!(delay <= expected_ms * 12 / 10 + 1, "{} > {}", delay, expected_ms);
            }
        }
    }
}
