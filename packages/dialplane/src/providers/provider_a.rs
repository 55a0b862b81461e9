//! Provider A wire format.
//!
//! REST over `{base}/calls`, bearer auth, RFC3339 timestamps, dollar costs.
//! Webhooks wrap the full call object under an event `type`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use dialplane_types::{
    CallDirection, CallSnapshot, CallStatus, Credential, Provider, ProviderEvent,
    ProviderEventKind, Timestamp,
};

use super::{
    check_status, transport_error, InitiateRequest, InitiatedCall, ProviderError,
    WebSession, WebhookParseError,
};

const PROVIDER: Provider = Provider::ProviderA;

#[derive(Serialize)]
struct CreateCallRequest<'a> {
    assistant_id: &'a str,
    customer: CustomerRef<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    phone_number: Option<PhoneRef<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    assistant_overrides: Option<AssistantOverrides<'a>>,
    metadata: &'a Value,
}

#[derive(Serialize)]
struct CustomerRef<'a> {
    number: &'a str,
}

#[derive(Serialize)]
struct PhoneRef<'a> {
    number: &'a str,
}

#[derive(Serialize)]
struct AssistantOverrides<'a> {
    system_prompt: &'a str,
}

#[derive(Deserialize)]
struct CreateCallResponse {
    id: String,
}

#[derive(Deserialize)]
struct WireCall {
    id: String,
    assistant_id: String,
    status: String,
    #[serde(default)]
    direction: Option<String>,
    #[serde(default)]
    customer: Option<WireCustomer>,
    #[serde(default)]
    from_number: Option<String>,
    #[serde(default)]
    started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    ended_at: Option<DateTime<Utc>>,
    #[serde(default)]
    duration_seconds: Option<f64>,
    /// dollars
    #[serde(default)]
    cost: Option<f64>,
    #[serde(default)]
    transcript: Option<String>,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    ended_reason: Option<String>,
    #[serde(default)]
    analysis: Option<WireAnalysis>,
}

#[derive(Deserialize)]
struct WireCustomer {
    number: Option<String>,
}

#[derive(Deserialize)]
struct WireAnalysis {
    #[serde(default)]
    voicemail: Option<bool>,
}

#[derive(Deserialize)]
struct ListCallsResponse {
    calls: Vec<WireCall>,
}

#[derive(Deserialize)]
struct WebSessionResponse {
    token: String,
    expires_at: DateTime<Utc>,
}

#[derive(Deserialize)]
struct WebhookEnvelope {
    #[serde(rename = "type")]
    kind: String,
    call: Value,
}

fn map_status(raw: &str) -> CallStatus {
    match raw {
        "queued" | "ringing" => CallStatus::Queued,
        "in-progress" | "forwarding" => CallStatus::InProgress,
        "ended" => CallStatus::Completed,
        _ => CallStatus::Failed,
    }
}

fn map_direction(raw: Option<&str>) -> CallDirection {
    match raw {
        Some("inbound") => CallDirection::Inbound,
        _ => CallDirection::Outbound,
    }
}

fn dollars_to_cents(dollars: Option<f64>) -> u64 {
    dollars.map(|d| (d * 100.0).round().max(0.0) as u64).unwrap_or(0)
}

fn snapshot(call: &WireCall) -> CallSnapshot {
    CallSnapshot {
        provider: PROVIDER,
        external_id: call.id.clone(),
        agent_external_id: call.assistant_id.clone(),
        status: map_status(&call.status),
        direction: map_direction(call.direction.as_deref()),
        from_number: call.from_number.clone(),
        to_number: call.customer.as_ref().and_then(|c| c.number.clone()),
        started_at: call.started_at.map(Timestamp::from),
        ended_at: call.ended_at.map(Timestamp::from),
        duration_secs: call.duration_seconds.unwrap_or(0.0).round().max(0.0) as u32,
    }
}

pub async fn initiate(
    client: &reqwest::Client,
    base: &str,
    request: InitiateRequest,
) -> Result<InitiatedCall, ProviderError> {
    let body = CreateCallRequest {
        assistant_id: &request.agent_external_id,
        customer: CustomerRef {
            number: &request.to_number,
        },
        phone_number: request
            .from_number
            .as_deref()
            .map(|number| PhoneRef { number }),
        assistant_overrides: request
            .prompt_override
            .as_deref()
            .map(|system_prompt| AssistantOverrides { system_prompt }),
        metadata: &request.metadata,
    };

    let response = client
        .post(format!("{}/calls", base))
        .bearer_auth(request.key.as_str())
        .json(&body)
        .send()
        .await
        .map_err(|e| transport_error(PROVIDER, e))?;
    let response = check_status(PROVIDER, response).await?;

    let created: CreateCallResponse = response
        .json()
        .await
        .map_err(|e| ProviderError::Decode {
            provider: PROVIDER,
            detail: e.to_string(),
        })?;

    Ok(InitiatedCall {
        external_id: created.id,
    })
}

pub async fn end_call(
    client: &reqwest::Client,
    base: &str,
    key: &Credential,
    external_id: &str,
) -> Result<(), ProviderError> {
    let response = client
        .post(format!("{}/calls/{}/end", base, external_id))
        .bearer_auth(key.as_str())
        .send()
        .await
        .map_err(|e| transport_error(PROVIDER, e))?;
    check_status(PROVIDER, response).await?;
    Ok(())
}

pub async fn fetch_call(
    client: &reqwest::Client,
    base: &str,
    key: &Credential,
    external_id: &str,
) -> Result<Option<CallSnapshot>, ProviderError> {
    let response = client
        .get(format!("{}/calls/{}", base, external_id))
        .bearer_auth(key.as_str())
        .send()
        .await
        .map_err(|e| transport_error(PROVIDER, e))?;

    if response.status().as_u16() == 404 {
        return Ok(None);
    }
    let response = check_status(PROVIDER, response).await?;

    let call: WireCall = response.json().await.map_err(|e| ProviderError::Decode {
        provider: PROVIDER,
        detail: e.to_string(),
    })?;
    Ok(Some(snapshot(&call)))
}

pub async fn list_active(
    client: &reqwest::Client,
    base: &str,
    key: &Credential,
    agent_external_ids: &[String],
) -> Result<Vec<CallSnapshot>, ProviderError> {
    // provider A filters by status server-side
    let response = client
        .get(format!("{}/calls?status=in-progress&limit=100", base))
        .bearer_auth(key.as_str())
        .send()
        .await
        .map_err(|e| transport_error(PROVIDER, e))?;
    let response = check_status(PROVIDER, response).await?;

    let list: ListCallsResponse = response.json().await.map_err(|e| ProviderError::Decode {
        provider: PROVIDER,
        detail: e.to_string(),
    })?;

    Ok(list
        .calls
        .iter()
        .filter(|call| agent_external_ids.iter().any(|id| id == &call.assistant_id))
        .map(snapshot)
        .collect())
}

pub async fn create_web_session(
    client: &reqwest::Client,
    base: &str,
    key: &Credential,
    agent_external_id: &str,
) -> Result<WebSession, ProviderError> {
    let response = client
        .post(format!("{}/assistants/{}/web-sessions", base, agent_external_id))
        .bearer_auth(key.as_str())
        .send()
        .await
        .map_err(|e| transport_error(PROVIDER, e))?;
    let response = check_status(PROVIDER, response).await?;

    let session: WebSessionResponse =
        response.json().await.map_err(|e| ProviderError::Decode {
            provider: PROVIDER,
            detail: e.to_string(),
        })?;
    Ok(WebSession {
        token: Credential::new(session.token),
        expires_at: Timestamp::from(session.expires_at),
    })
}

pub fn parse_webhook(body: &[u8]) -> Result<ProviderEvent, WebhookParseError> {
    let envelope: WebhookEnvelope =
        serde_json::from_slice(body).map_err(|source| WebhookParseError::Json {
            provider: PROVIDER,
            source,
        })?;

    let kind = match envelope.kind.as_str() {
        "call.started" => ProviderEventKind::Started,
        "call.updated" => ProviderEventKind::Updated,
        "call.ended" => ProviderEventKind::Ended,
        "transcript.updated" => ProviderEventKind::Transcript,
        other => {
            return Err(WebhookParseError::UnknownEventType {
                provider: PROVIDER,
                kind: other.to_string(),
            })
        }
    };

    let call: WireCall = serde_json::from_value(envelope.call.clone()).map_err(|source| {
        WebhookParseError::Json {
            provider: PROVIDER,
            source,
        }
    })?;

    if call.id.is_empty() {
        return Err(WebhookParseError::MissingField {
            provider: PROVIDER,
            field: "call.id",
        });
    }

    let voicemail = call
        .analysis
        .as_ref()
        .and_then(|a| a.voicemail)
        .unwrap_or(false)
        || call.ended_reason.as_deref() == Some("voicemail");

    // an ended event for a call that never connected is a failure, not a
    // completion
    let status = if kind == ProviderEventKind::Ended {
        match call.ended_reason.as_deref() {
            Some("error") | Some("no-answer") | Some("busy") => CallStatus::Failed,
            _ => CallStatus::Completed,
        }
    } else {
        map_status(&call.status)
    };

    Ok(ProviderEvent {
        kind,
        provider: PROVIDER,
        external_id: call.id.clone(),
        agent_external_id: call.assistant_id.clone(),
        status,
        direction: map_direction(call.direction.as_deref()),
        from_number: call.from_number.clone(),
        to_number: call.customer.as_ref().and_then(|c| c.number.clone()),
        started_at: call.started_at.map(Timestamp::from),
        ended_at: call.ended_at.map(Timestamp::from),
        duration_secs: call.duration_seconds.unwrap_or(0.0).round().max(0.0) as u32,
        cost_cents: dollars_to_cents(call.cost),
        transcript: call.transcript.clone(),
        summary: call.summary.clone(),
        voicemail,
        provider_meta: envelope.call,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ended_webhook() {
        let body = serde_json::json!({
            "type": "call.ended",
            "call": {
                "id": "call-123",
                "assistant_id": "asst-9",
                "status": "ended",
                "direction": "outbound",
                "customer": {"number": "+14155551234"},
                "from_number": "+14155550000",
                "started_at": "2026-07-21T18:00:00Z",
                "ended_at": "2026-07-21T18:01:30Z",
                "duration_seconds": 90.2,
                "cost": 0.42,
                "transcript": "hi there",
                "summary": "caller asked about hours",
                "ended_reason": "customer-ended-call"
            }
        });

        let event = parse_webhook(serde_json::to_vec(&body).unwrap().as_slice()).unwrap();
        assert_eq!(event.kind, ProviderEventKind::Ended);
        assert_eq!(event.status, CallStatus::Completed);
        assert_eq!(event.external_id, "call-123");
        assert_eq!(event.agent_external_id, "asst-9");
        assert_eq!(event.duration_secs, 90);
        assert_eq!(event.cost_cents, 42);
        assert!(!event.voicemail);
    }

    #[test]
    fn voicemail_hint_from_analysis_or_reason() {
        for call in [
            serde_json::json!({
                "id": "c1", "assistant_id": "a", "status": "ended",
                "analysis": {"voicemail": true}
            }),
            serde_json::json!({
                "id": "c2", "assistant_id": "a", "status": "ended",
                "ended_reason": "voicemail"
            }),
        ] {
            let body = serde_json::json!({"type": "call.ended", "call": call});
            let event = parse_webhook(serde_json::to_vec(&body).unwrap().as_slice()).unwrap();
            assert!(event.voicemail);
        }
    }

    #[test]
    fn failed_end_reasons_map_to_failed() {
        let body = serde_json::json!({
            "type": "call.ended",
            "call": {"id": "c3", "assistant_id": "a", "status": "ended", "ended_reason": "no-answer"}
        });
        let event = parse_webhook(serde_json::to_vec(&body).unwrap().as_slice()).unwrap();
        assert_eq!(event.status, CallStatus::Failed);
    }

    #[test]
    fn unknown_event_type_is_rejected() {
        let body = serde_json::json!({"type": "assistant.updated", "call": {"id": "x", "assistant_id": "a", "status": "ended"}});
        assert!(matches!(
            parse_webhook(serde_json::to_vec(&body).unwrap().as_slice()),
            Err(WebhookParseError::UnknownEventType { .. })
        ));
    }
}
