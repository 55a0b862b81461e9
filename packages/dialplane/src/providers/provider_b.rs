//! Provider B wire format.
//!
//! RPC-style paths (`create-phone-call`, `get-call`), bearer auth, epoch
//! millisecond timestamps, costs already in cents. Webhooks carry an
//! `event` discriminator beside the call object.

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

const PROVIDER: Provider = Provider::ProviderB;

/// Provider B's listing endpoint cannot filter by status server-side; we
/// fetch this many recent calls and filter here. Known cap, revisit only if
/// tenants run more concurrent calls than this.
const LIST_FETCH_LIMIT: u32 = 100;

#[derive(Serialize)]
struct CreatePhoneCallRequest<'a> {
    agent_id: &'a str,
    to_number: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    from_number: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    override_prompt: Option<&'a str>,
    metadata: &'a Value,
}

#[derive(Deserialize)]
struct CreatePhoneCallResponse {
    call_id: String,
}

#[derive(Deserialize)]
struct WireCall {
    call_id: String,
    agent_id: String,
    call_status: String,
    #[serde(default)]
    direction: Option<String>,
    #[serde(default)]
    from_number: Option<String>,
    #[serde(default)]
    to_number: Option<String>,
    /// epoch millis
    #[serde(default)]
    start_timestamp: Option<u64>,
    #[serde(default)]
    end_timestamp: Option<u64>,
    #[serde(default)]
    duration_ms: Option<u64>,
    #[serde(default)]
    call_cost: Option<WireCost>,
    #[serde(default)]
    transcript: Option<String>,
    #[serde(default)]
    call_analysis: Option<WireAnalysis>,
    #[serde(default)]
    disconnection_reason: Option<String>,
}

#[derive(Deserialize)]
struct WireCost {
    #[serde(default)]
    combined_cost_cents: Option<u64>,
}

#[derive(Deserialize)]
struct WireAnalysis {
    #[serde(default)]
    call_summary: Option<String>,
    #[serde(default)]
    in_voicemail: Option<bool>,
}

#[derive(Serialize)]
struct ListCallsRequest {
    limit: u32,
}

#[derive(Deserialize)]
struct WebTokenResponse {
    access_token: String,
    /// epoch millis
    expires_at: u64,
}

#[derive(Deserialize)]
struct WebhookEnvelope {
    event: String,
    call: Value,
}

fn millis(ts: Option<u64>) -> Option<Timestamp> {
    ts.map(|ms| Timestamp::from_nanos(ms.saturating_mul(1_000_000)))
}

fn map_status(raw: &str, disconnection_reason: Option<&str>) -> CallStatus {
    match raw {
        "registered" => CallStatus::Queued,
        "ongoing" => CallStatus::InProgress,
        "ended" => match disconnection_reason {
            Some("dial_failed") | Some("dial_no_answer") | Some("dial_busy") | Some("error") => {
                CallStatus::Failed
            }
            _ => CallStatus::Completed,
        },
        _ => CallStatus::Failed,
    }
}

fn map_direction(raw: Option<&str>) -> CallDirection {
    match raw {
        Some("inbound") => CallDirection::Inbound,
        _ => CallDirection::Outbound,
    }
}

fn snapshot(call: &WireCall) -> CallSnapshot {
    CallSnapshot {
        provider: PROVIDER,
        external_id: call.call_id.clone(),
        agent_external_id: call.agent_id.clone(),
        status: map_status(&call.call_status, call.disconnection_reason.as_deref()),
        direction: map_direction(call.direction.as_deref()),
        from_number: call.from_number.clone(),
        to_number: call.to_number.clone(),
        started_at: millis(call.start_timestamp),
        ended_at: millis(call.end_timestamp),
        duration_secs: (call.duration_ms.unwrap_or(0) / 1000) as u32,
    }
}

pub async fn initiate(
    client: &reqwest::Client,
    base: &str,
    request: InitiateRequest,
) -> Result<InitiatedCall, ProviderError> {
    let body = CreatePhoneCallRequest {
        agent_id: &request.agent_external_id,
        to_number: &request.to_number,
        from_number: request.from_number.as_deref(),
        override_prompt: request.prompt_override.as_deref(),
        metadata: &request.metadata,
    };

    let response = client
        .post(format!("{}/create-phone-call", base))
        .bearer_auth(request.key.as_str())
        .json(&body)
        .send()
        .await
        .map_err(|e| transport_error(PROVIDER, e))?;
    let response = check_status(PROVIDER, response).await?;

    let created: CreatePhoneCallResponse =
        response.json().await.map_err(|e| ProviderError::Decode {
            provider: PROVIDER,
            detail: e.to_string(),
        })?;

    Ok(InitiatedCall {
        external_id: created.call_id,
    })
}

pub async fn end_call(
    client: &reqwest::Client,
    base: &str,
    key: &Credential,
    external_id: &str,
) -> Result<(), ProviderError> {
    let response = client
        .post(format!("{}/end-call/{}", base, external_id))
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
        .get(format!("{}/get-call/{}", base, external_id))
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
    let response = client
        .post(format!("{}/list-calls", base))
        .bearer_auth(key.as_str())
        .json(&ListCallsRequest {
            limit: LIST_FETCH_LIMIT,
        })
        .send()
        .await
        .map_err(|e| transport_error(PROVIDER, e))?;
    let response = check_status(PROVIDER, response).await?;

    let calls: Vec<WireCall> = response.json().await.map_err(|e| ProviderError::Decode {
        provider: PROVIDER,
        detail: e.to_string(),
    })?;

    Ok(calls
        .iter()
        .filter(|call| call.call_status == "ongoing")
        .filter(|call| agent_external_ids.iter().any(|id| id == &call.agent_id))
        .map(snapshot)
        .collect())
}

pub async fn create_web_session(
    client: &reqwest::Client,
    base: &str,
    key: &Credential,
    agent_external_id: &str,
) -> Result<WebSession, ProviderError> {
    #[derive(Serialize)]
    struct CreateWebCallRequest<'a> {
        agent_id: &'a str,
    }

    let response = client
        .post(format!("{}/create-web-call-token", base))
        .bearer_auth(key.as_str())
        .json(&CreateWebCallRequest {
            agent_id: agent_external_id,
        })
        .send()
        .await
        .map_err(|e| transport_error(PROVIDER, e))?;
    let response = check_status(PROVIDER, response).await?;

    let token: WebTokenResponse = response.json().await.map_err(|e| ProviderError::Decode {
        provider: PROVIDER,
        detail: e.to_string(),
    })?;
    Ok(WebSession {
        token: Credential::new(token.access_token),
        expires_at: millis(Some(token.expires_at)).unwrap_or(Timestamp::from_nanos(0)),
    })
}

pub fn parse_webhook(body: &[u8]) -> Result<ProviderEvent, WebhookParseError> {
    let envelope: WebhookEnvelope =
        serde_json::from_slice(body).map_err(|source| WebhookParseError::Json {
            provider: PROVIDER,
            source,
        })?;

    let kind = match envelope.event.as_str() {
        "call_started" => ProviderEventKind::Started,
        "call_ended" => ProviderEventKind::Ended,
        // analysis events re-deliver the call with summary fields filled in
        "call_analyzed" => ProviderEventKind::Updated,
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

    if call.call_id.is_empty() {
        return Err(WebhookParseError::MissingField {
            provider: PROVIDER,
            field: "call.call_id",
        });
    }

    let status = match kind {
        ProviderEventKind::Started => CallStatus::InProgress,
        _ => map_status(&call.call_status, call.disconnection_reason.as_deref()),
    };

    Ok(ProviderEvent {
        kind,
        provider: PROVIDER,
        external_id: call.call_id.clone(),
        agent_external_id: call.agent_id.clone(),
        status,
        direction: map_direction(call.direction.as_deref()),
        from_number: call.from_number.clone(),
        to_number: call.to_number.clone(),
        started_at: millis(call.start_timestamp),
        ended_at: millis(call.end_timestamp),
        duration_secs: (call.duration_ms.unwrap_or(0) / 1000) as u32,
        cost_cents: call
            .call_cost
            .as_ref()
            .and_then(|c| c.combined_cost_cents)
            .unwrap_or(0),
        transcript: call.transcript.clone(),
        summary: call
            .call_analysis
            .as_ref()
            .and_then(|a| a.call_summary.clone()),
        voicemail: call
            .call_analysis
            .as_ref()
            .and_then(|a| a.in_voicemail)
            .unwrap_or(false),
        provider_meta: envelope.call,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ended_webhook_with_millis() {
        let body = serde_json::json!({
            "event": "call_ended",
            "call": {
                "call_id": "b-call-1",
                "agent_id": "b-agent-1",
                "call_status": "ended",
                "direction": "inbound",
                "from_number": "+14155551234",
                "to_number": "+14155550000",
                "start_timestamp": 1753120800000u64,
                "end_timestamp": 1753120861000u64,
                "duration_ms": 61000,
                "call_cost": {"combined_cost_cents": 31},
                "transcript": "hello",
                "call_analysis": {"call_summary": "booked", "in_voicemail": false}
            }
        });

        let event = parse_webhook(serde_json::to_vec(&body).unwrap().as_slice()).unwrap();
        assert_eq!(event.kind, ProviderEventKind::Ended);
        assert_eq!(event.status, CallStatus::Completed);
        assert_eq!(event.direction, CallDirection::Inbound);
        assert_eq!(event.duration_secs, 61);
        assert_eq!(event.cost_cents, 31);
        assert_eq!(event.summary.as_deref(), Some("booked"));
        assert_eq!(
            event.started_at.unwrap().as_millis(),
            1753120800000
        );
    }

    #[test]
    fn dial_failures_map_to_failed() {
        let body = serde_json::json!({
            "event": "call_ended",
            "call": {
                "call_id": "b-call-2",
                "agent_id": "b-agent-1",
                "call_status": "ended",
                "disconnection_reason": "dial_no_answer"
            }
        });
        let event = parse_webhook(serde_json::to_vec(&body).unwrap().as_slice()).unwrap();
        assert_eq!(event.status, CallStatus::Failed);
    }

    #[test]
    fn voicemail_hint() {
        let body = serde_json::json!({
            "event": "call_ended",
            "call": {
                "call_id": "b-call-3",
                "agent_id": "b-agent-1",
                "call_status": "ended",
                "call_analysis": {"in_voicemail": true}
            }
        });
        let event = parse_webhook(serde_json::to_vec(&body).unwrap().as_slice()).unwrap();
        assert!(event.voicemail);
    }
}
