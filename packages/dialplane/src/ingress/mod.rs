//! Trigger ingress: the shared pipeline behind the CRM webhooks, the
//! partner API, and the dashboard's direct schedule action.
//!
//! By the time [`handle_trigger`] runs, the HTTP layer has parsed the body,
//! resolved the tenant, and verified the source's signature. This module
//! owns the rest: agent resolution, the schedule-or-dispatch decision,
//! variant selection, and the audit row.

mod resolve;

use serde_json::{json, Value};
use thiserror::Error;
use tracing::instrument;

use dialplane_types::{
    Agent, CallMetadata, Experiment, Phone, PhoneError, ProviderEvent, ProviderEventKind,
    ScheduledCall, ScheduledCallId, ScheduledCallStatus, Tenant, Timestamp, TriggerLog,
    TriggerLogId, TriggerRequest, TriggerSource, TriggerStatus, CallStatus, CallDirection,
    DEFAULT_MAX_RETRIES,
};

use crate::{
    app::App,
    keys::{self, KeyError},
    providers::{InitiateRequest, ProviderError},
    store::StoreError,
    timezone::TimezoneError,
};

pub use resolve::resolve_agent;

#[derive(Error, Debug)]
pub enum IngressError {
    #[error("invalid phone number: {0}")]
    Phone(#[from] PhoneError),

    #[error("no agent configured for this trigger")]
    NoAgentConfigured,

    #[error("agent does not belong to this tenant")]
    ForeignAgent,

    #[error("client is not permitted to place outbound calls")]
    OutboundNotAllowed,

    #[error(transparent)]
    Key(#[from] KeyError),

    #[error(transparent)]
    Timezone(#[from] TimezoneError),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("store: {0}")]
    Store(#[from] StoreError),
}

/// What the caller gets back: either the external call id of an initiated
/// call or the id of the scheduled job.
#[derive(Debug, Clone)]
pub struct TriggerOutcome {
    pub status: TriggerStatus,
    pub call_id: Option<String>,
    pub scheduled_call_id: Option<ScheduledCallId>,
    pub lead_timezone: Option<String>,
    pub agent_id: dialplane_types::AgentId,
    pub agent_name: String,
}

/// Variant selection result stamped into call metadata.
pub(crate) struct SelectedVariant {
    pub experiment_id: dialplane_types::ExperimentId,
    pub variant_id: dialplane_types::VariantId,
    pub prompt_override: Option<String>,
}

/// Apply the running experiment for the agent, if any. The basis is
/// identity-free and stable for one logical call, so retries land on the
/// same arm.
pub(crate) fn select_variant(
    experiment: Option<&Experiment>,
    basis: &str,
) -> Option<SelectedVariant> {
    let experiment = experiment?;
    let variant = experiment.pick_variant(basis);
    Some(SelectedVariant {
        experiment_id: experiment.id.clone(),
        variant_id: variant.id.clone(),
        prompt_override: variant.prompt_override.clone(),
    })
}

/// Mask anything secret-shaped before the payload lands in an audit row.
pub fn redact_payload(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut out = serde_json::Map::with_capacity(map.len());
            for (key, value) in map {
                let lowered = key.to_ascii_lowercase();
                let sensitive = ["secret", "token", "password", "authorization", "api_key"]
                    .iter()
                    .any(|needle| lowered.contains(needle));
                if sensitive {
                    out.insert(key.clone(), Value::String("***".into()));
                } else {
                    out.insert(key.clone(), redact_payload(value));
                }
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(redact_payload).collect()),
        other => other.clone(),
    }
}

#[instrument(skip(app, tenant, request), fields(subsys = "Ingress", tenant_id = %tenant.id, source = source.as_str()))]
pub async fn handle_trigger(
    app: &App,
    tenant: &Tenant,
    source: TriggerSource,
    request: &TriggerRequest,
) -> Result<TriggerOutcome, IngressError> {
    let result = run_pipeline(app, tenant, source, request).await;

    // every outcome leaves an audit row; failures record the error string
    let (status, agent_id, lead_timezone, error) = match &result {
        Ok(outcome) => (
            outcome.status,
            Some(outcome.agent_id.clone()),
            outcome.lead_timezone.clone(),
            None,
        ),
        Err(err) => (
            TriggerStatus::Failed,
            request.agent_id.clone(),
            None,
            Some(err.to_string()),
        ),
    };

    let log = TriggerLog {
        id: TriggerLogId::generate(),
        tenant_id: tenant.id.clone(),
        source,
        status,
        agent_id,
        lead_timezone,
        payload: redact_payload(&serde_json::to_value(request).unwrap_or(Value::Null)),
        error,
        created_at: Timestamp::from(app.clock.now()),
    };
    if let Err(err) = app.store.put_trigger_log(log) {
        tracing::error!(error = %err, "failed to write trigger log");
    }

    app.metrics.ingress.increment_triggers(
        source.as_str(),
        match &result {
            Ok(outcome) => match outcome.status {
                TriggerStatus::Initiated => "initiated",
                TriggerStatus::Scheduled => "scheduled",
                TriggerStatus::Failed => "failed",
            },
            Err(_) => "failed",
        },
    );

    result
}

async fn run_pipeline(
    app: &App,
    tenant: &Tenant,
    source: TriggerSource,
    request: &TriggerRequest,
) -> Result<TriggerOutcome, IngressError> {
    let now = app.clock.now();
    let phone = Phone::normalize(&request.phone_number)?;
    let from_number = match &request.from_number {
        Some(raw) => Some(Phone::normalize(raw)?),
        None => None,
    };

    let agent = resolve_agent(app, tenant, source, request, from_number.as_ref())?;

    if let Some(client_id) = &agent.client_id {
        if let Some(client) = app.store.client(client_id)? {
            if !client.permissions.allow_outbound {
                return Err(IngressError::OutboundNotAllowed);
            }
        }
    }

    // fail before scheduling if the key is missing, not at dispatch time
    let resolved_key = keys::resolve(
        &app.store,
        &tenant.id,
        agent.client_id.as_ref(),
        agent.provider,
    )?;

    let zone = app.oracle.zone_of(&phone);
    let lead_timezone = zone.map(|tz| tz.name().to_string());

    let requested_at = request.scheduled_at;
    let explicit_future = requested_at.filter(|at| *at > now);

    // 1. caller picked an instant in the future
    if let Some(at) = explicit_future {
        let job = build_job(
            app, tenant, source, request, &agent, phone, at, at, false, &lead_timezone,
        );
        let id = job.id.clone();
        app.store.put_scheduled_call(job)?;
        return Ok(TriggerOutcome {
            status: TriggerStatus::Scheduled,
            call_id: None,
            scheduled_call_id: Some(id),
            lead_timezone,
            agent_id: agent.id.clone(),
            agent_name: agent.name.clone(),
        });
    }

    // 2. the tenant's window is closed in the lead's zone; a number with no
    //    zone skips the check entirely
    if let Some(zone) = zone {
        if tenant.calling_window.enabled
            && !app.oracle.within_window(now, zone, &tenant.calling_window)
        {
            let next = app
                .oracle
                .next_valid_instant(now, zone, &tenant.calling_window)?;
            let job = build_job(
                app, tenant, source, request, &agent, phone, next, now, true, &lead_timezone,
            );
            let id = job.id.clone();
            app.store.put_scheduled_call(job)?;
            return Ok(TriggerOutcome {
                status: TriggerStatus::Scheduled,
                call_id: None,
                scheduled_call_id: Some(id),
                lead_timezone,
                agent_id: agent.id.clone(),
                agent_name: agent.name.clone(),
            });
        }
    }

    // 3. dispatch right now
    let basis = format!("{}{}", phone.as_str(), now.to_rfc3339());
    let experiment = app.store.running_experiment(&agent.id)?;
    let selected = select_variant(experiment.as_ref(), &basis);

    let metadata = call_metadata(source, request, &lead_timezone, selected.as_ref());

    let initiated = app
        .provider_api
        .initiate(InitiateRequest {
            provider: agent.provider,
            key: resolved_key.key,
            agent_external_id: agent.external_id.clone(),
            to_number: phone.as_str().to_string(),
            from_number: from_number.as_ref().map(|p| p.as_str().to_string()),
            prompt_override: selected.as_ref().and_then(|s| s.prompt_override.clone()),
            metadata: json!({
                "lead_timezone": lead_timezone,
                "trigger_source": source.as_str(),
                "contact_id": request.contact_id,
            }),
        })
        .await?;

    // the dispatch side of the upsert; the provider's webhook will complete it
    let dispatch_event = ProviderEvent {
        kind: ProviderEventKind::Started,
        provider: agent.provider,
        external_id: initiated.external_id.clone(),
        agent_external_id: agent.external_id.clone(),
        status: CallStatus::Queued,
        direction: CallDirection::Outbound,
        from_number: from_number.as_ref().map(|p| p.as_str().to_string()),
        to_number: Some(phone.as_str().to_string()),
        started_at: None,
        ended_at: None,
        duration_secs: 0,
        cost_cents: 0,
        transcript: None,
        summary: None,
        voicemail: false,
        provider_meta: Value::Null,
    };
    let upsert = app.store.upsert_call_event(&agent, &dispatch_event, now)?;
    app.store.set_call_metadata(&upsert.call.id, metadata)?;

    Ok(TriggerOutcome {
        status: TriggerStatus::Initiated,
        call_id: Some(initiated.external_id),
        scheduled_call_id: None,
        lead_timezone,
        agent_id: agent.id.clone(),
        agent_name: agent.name.clone(),
    })
}

fn call_metadata(
    source: TriggerSource,
    request: &TriggerRequest,
    lead_timezone: &Option<String>,
    selected: Option<&SelectedVariant>,
) -> CallMetadata {
    CallMetadata {
        lead_timezone: lead_timezone.clone(),
        trigger_source: Some(source),
        contact_id: request.contact_id.clone(),
        experiment_id: selected.map(|s| s.experiment_id.clone()),
        variant_id: selected.map(|s| s.variant_id.clone()),
        extra: request.metadata.clone(),
    }
}

#[allow(clippy::too_many_arguments)]
fn build_job(
    app: &App,
    tenant: &Tenant,
    source: TriggerSource,
    request: &TriggerRequest,
    agent: &Agent,
    phone: Phone,
    scheduled_at: chrono::DateTime<chrono::Utc>,
    original_at: chrono::DateTime<chrono::Utc>,
    timezone_delayed: bool,
    lead_timezone: &Option<String>,
) -> ScheduledCall {
    ScheduledCall {
        id: ScheduledCallId::generate(),
        tenant_id: tenant.id.clone(),
        client_id: agent.client_id.clone(),
        agent_id: agent.id.clone(),
        phone,
        status: ScheduledCallStatus::Pending,
        scheduled_at: Timestamp::from(scheduled_at),
        original_scheduled_at: Timestamp::from(original_at),
        lead_timezone: lead_timezone.clone(),
        timezone_delayed,
        retry_count: 0,
        max_retries: DEFAULT_MAX_RETRIES,
        trigger_source: source,
        contact_id: request.contact_id.clone(),
        metadata: call_metadata(source, request, lead_timezone, None),
        external_call_id: None,
        error_message: None,
        completed_at: None,
        created_at: Timestamp::from(app.clock.now()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redaction_masks_secret_shaped_keys() {
        let payload = json!({
            "phone_number": "+14155551234",
            "api_key": "pdy_sk_deadbeef",
            "metadata": {
                "refresh_token": "tok_123",
                "note": "call after lunch"
            }
        });
        let redacted = redact_payload(&payload);
        assert_eq!(redacted["phone_number"], "+14155551234");
        assert_eq!(redacted["api_key"], "***");
        assert_eq!(redacted["metadata"]["refresh_token"], "***");
        assert_eq!(redacted["metadata"]["note"], "call after lunch");
    }
}
