//! Provider webhook ingress.
//!
//! Providers retry on non-2xx, so everything that is not a signature
//! failure acks 200: unknown agents, unparseable bodies, and duplicate
//! events are not the provider's problem. Post-call fan-out (broadcast,
//! usage, analysis, workflows) runs on spawned tasks after the ack and
//! exactly once per call, keyed off the terminal-transition bit the store
//! reports.

use std::sync::Arc;

use serde_json::{json, Value};
use thiserror::Error;
use tracing::instrument;

use dialplane_types::{
    Agent, BillingType, CallEvent, CallEventKind, CallRecord, CallStatus, Client, Provider,
    ProviderEvent, Timestamp, WorkflowTrigger,
};

use crate::{
    analysis,
    app::App,
    providers::{self, WebhookParseError},
    signature::{self, SignatureError},
    store::StoreError,
    workflow,
};

#[derive(Error, Debug)]
pub enum WebhookError {
    /// Collapses to 401 with no detail; the payload is not logged.
    #[error("webhook signature verification failed")]
    Unauthorized(#[from] SignatureError),

    #[error("store: {0}")]
    Store(#[from] StoreError),
}

/// Every non-error path acks; `Processed` means a call record was updated.
#[derive(Debug, PartialEq, Eq)]
pub enum WebhookOutcome {
    Processed,
    /// Acked without processing: unknown agent, unparseable body,
    /// or an event kind we do not consume.
    Acked,
}

/// Full ingress for one provider callback: verify, normalize, upsert,
/// fan out. `url_path` is the request path as the provider signed it.
#[instrument(skip(app, headers, body), fields(subsys = "WebhookIngress", provider = %provider))]
pub async fn handle_provider_webhook(
    app: &Arc<App>,
    provider: Provider,
    method: &str,
    url_path: &str,
    headers: &WebhookHeaders,
    body: &[u8],
) -> Result<WebhookOutcome, WebhookError> {
    let now = app.clock.now();

    // providers B and C sign with a provider-wide secret, checkable before
    // any parsing; provider A signs with the tenant key, which we only know
    // after resolving the agent out of the payload
    match provider {
        Provider::ProviderB => {
            let secret = match &app.config.provider_b_webhook_secret {
                Some(secret) => secret,
                None => return Err(SignatureError::MissingSignature.into()),
            };
            signature::verify_provider_b(body, headers.signature.as_deref(), secret)?;
        }
        Provider::ProviderC => {
            let secret = match &app.config.provider_c_webhook_secret {
                Some(secret) => secret,
                None => return Err(SignatureError::MissingSignature.into()),
            };
            signature::verify_provider_c(
                method,
                url_path,
                body,
                headers.signature.as_deref(),
                headers.timestamp.as_deref(),
                secret,
                now,
            )?;
        }
        Provider::ProviderA => {}
    }

    let event = match providers::parse_webhook(provider, body) {
        Ok(event) => event,
        Err(WebhookParseError::UnknownEventType { kind, .. }) => {
            tracing::debug!(kind, "ignoring provider event type");
            return Ok(WebhookOutcome::Acked);
        }
        Err(err) => {
            tracing::debug!(error = %err, "unparseable provider webhook");
            return Ok(WebhookOutcome::Acked);
        }
    };

    let agent = match app
        .store
        .agent_by_external(provider, &event.agent_external_id)?
    {
        Some(agent) => agent,
        // not our agent, not our concern; a retry storm helps nobody
        None => return Ok(WebhookOutcome::Acked),
    };

    if provider == Provider::ProviderA {
        let tenant = app.store.tenant(&agent.tenant_id)?;
        let key = tenant
            .as_ref()
            .and_then(|t| t.provider_keys.get(Provider::ProviderA))
            .ok_or(SignatureError::MissingSignature)?;
        signature::verify_provider_a(body, headers.signature.as_deref(), key)?;
    }

    process_event(app, &agent, event, now).await
}

/// Headers the verifier cares about, pre-extracted so this module does not
/// depend on the HTTP framework.
#[derive(Debug, Default, Clone)]
pub struct WebhookHeaders {
    pub signature: Option<String>,
    pub timestamp: Option<String>,
}

/// Upsert the call and, on its one terminal transition, kick off the
/// post-call pipeline in the background.
pub async fn process_event(
    app: &Arc<App>,
    agent: &Agent,
    event: ProviderEvent,
    now: chrono::DateTime<chrono::Utc>,
) -> Result<WebhookOutcome, WebhookError> {
    app.metrics
        .webhook
        .increment_events(event.provider.as_str(), &format!("{:?}", event.kind));

    let upsert = app.store.upsert_call_event(agent, &event, now)?;

    if upsert.created && !upsert.call.status.is_terminal() {
        emit_event(app, &upsert.call, CallEventKind::Started, now);
    }

    if upsert.newly_terminal {
        emit_event(app, &upsert.call, CallEventKind::Ended, now);
        spawn_post_call(app.clone(), agent.clone(), upsert.call);
    }

    Ok(WebhookOutcome::Processed)
}

fn emit_event(app: &Arc<App>, call: &CallRecord, kind: CallEventKind, now: chrono::DateTime<chrono::Utc>) {
    let event = CallEvent {
        kind,
        tenant_id: call.tenant_id.clone(),
        call_id: call.id.clone(),
        provider: call.provider,
        external_id: call.external_id.clone(),
        agent_id: call.agent_id.clone(),
        status: call.status,
        direction: call.direction,
        duration_secs: call.duration_secs,
        occurred_at: Timestamp::from(now),
    };
    let sink = app.event_sink.clone();
    tokio::spawn(async move {
        sink.emit(event).await;
    });
}

/// Fire-and-forget post-call work. Runs after the webhook has been acked;
/// each piece logs its own failures and cannot affect the response.
fn spawn_post_call(app: Arc<App>, agent: Agent, call: CallRecord) {
    tokio::spawn(async move {
        let client = match call
            .client_id
            .as_ref()
            .map(|id| app.store.client(id))
            .transpose()
        {
            Ok(client) => client.flatten(),
            Err(err) => {
                tracing::error!(call_id = %call.id, error = %err, "client lookup failed in post-call");
                None
            }
        };

        accrue_usage(&app, &call, client.as_ref());

        if analysis::should_analyze(&app, &call, client.as_ref()) {
            analysis::spawn(app.clone(), call.clone());
        }

        run_workflows(&app, &agent, &call).await;
    });
}

fn accrue_usage(app: &Arc<App>, call: &CallRecord, client: Option<&Client>) {
    if call.status != CallStatus::Completed || call.duration_secs == 0 {
        return;
    }
    let Some(client) = client else { return };
    let BillingType::PerMinute { rate_cents } = client.billing else {
        return;
    };

    let minutes = call.duration_secs.div_ceil(60) as i64;
    let cents = minutes * rate_cents as i64;
    match app
        .store
        .add_usage_cents(&call.tenant_id, &client.id, cents)
    {
        Ok(total) => {
            tracing::debug!(
                call_id = %call.id,
                client_id = %client.id,
                cents,
                total,
                "usage accrued"
            );
        }
        Err(err) => {
            app.metrics.webhook.increment_total_errors();
            tracing::error!(call_id = %call.id, error = %err, "usage accrual failed");
        }
    }
}

async fn run_workflows(app: &Arc<App>, agent: &Agent, call: &CallRecord) {
    let mut triggers = vec![WorkflowTrigger::CallEnded];
    if call.direction == dialplane_types::CallDirection::Inbound {
        triggers.push(WorkflowTrigger::InboundCallEnded);
    }

    let workflows = match app
        .store
        .workflows_for_call(&call.tenant_id, &call.agent_id, &triggers)
    {
        Ok(workflows) => workflows,
        Err(err) => {
            tracing::error!(call_id = %call.id, error = %err, "workflow lookup failed");
            return;
        }
    };
    if workflows.is_empty() {
        return;
    }

    let payload = enriched_payload(call, agent);
    workflow::execute_all(app, workflows, call, payload).await;
}

/// The flattened payload conditions and templates operate on.
pub fn enriched_payload(call: &CallRecord, agent: &Agent) -> Value {
    json!({
        "id": call.id.as_ref(),
        "provider": call.provider.as_str(),
        "external_id": call.external_id,
        "status": call.status,
        "direction": call.direction,
        "from_number": call.from_number,
        "to_number": call.to_number,
        "duration_secs": call.duration_secs,
        "duration_minutes": call.duration_secs as f64 / 60.0,
        "cost_cents": call.cost_cents,
        "transcript": call.transcript,
        "voicemail": call.voicemail,
        "summary": call.analysis.summary,
        "sentiment": call.analysis.sentiment,
        "topics": call.analysis.topics,
        "score": call.analysis.score,
        "started_at": call.started_at.map(|t| t.as_datetime().to_rfc3339()),
        "ended_at": call.ended_at.map(|t| t.as_datetime().to_rfc3339()),
        "metadata": call.metadata,
        "agent": {
            "id": agent.id.as_ref(),
            "name": agent.name,
            "provider": agent.provider.as_str(),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usage_minutes_round_up() {
        // 61 seconds bills as 2 minutes
        assert_eq!(61u32.div_ceil(60), 2);
        assert_eq!(60u32.div_ceil(60), 1);
        assert_eq!(1u32.div_ceil(60), 1);
        assert_eq!(120u32.div_ceil(60), 2);
    }
}
