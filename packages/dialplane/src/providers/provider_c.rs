//! Provider C wire format.
//!
//! Flat JSON objects, api-key header auth (no bearer scheme), RFC3339
//! timestamps, dollar prices, `answered_by` voicemail detection. Webhooks
//! are the call object itself with an `event_type` field.

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

const PROVIDER: Provider = Provider::ProviderC;

#[derive(Serialize)]
struct SendCallRequest<'a> {
    agent_id: &'a str,
    phone_number: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    from: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    task: Option<&'a str>,
    metadata: &'a Value,
}

#[derive(Deserialize)]
struct SendCallResponse {
    call_id: String,
}

#[derive(Deserialize)]
struct WireCall {
    call_id: String,
    agent_id: String,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    inbound: Option<bool>,
    #[serde(default)]
    from: Option<String>,
    #[serde(default)]
    to: Option<String>,
    #[serde(default)]
    started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    end_at: Option<DateTime<Utc>>,
    /// seconds
    #[serde(default)]
    call_length: Option<f64>,
    /// dollars
    #[serde(default)]
    price: Option<f64>,
    #[serde(default)]
    concatenated_transcript: Option<String>,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    answered_by: Option<String>,
    #[serde(default)]
    completed: Option<bool>,
    #[serde(default)]
    error_message: Option<String>,
}

#[derive(Deserialize)]
struct WebhookWire {
    event_type: String,
    #[serde(flatten)]
    call: WireCall,
}

#[derive(Deserialize)]
struct SessionTokenResponse {
    token: String,
    expires_at: DateTime<Utc>,
}

fn map_status(call: &WireCall) -> CallStatus {
    match call.status.as_deref() {
        Some("queued") | Some("new") => CallStatus::Queued,
        Some("in_progress") | Some("started") => CallStatus::InProgress,
        Some("completed") => {
            if call.error_message.is_some() {
                CallStatus::Failed
            } else {
                CallStatus::Completed
            }
        }
        Some("failed") | Some("no_answer") | Some("busy") => CallStatus::Failed,
        _ => {
            // older payloads only carry `completed`
            match call.completed {
                Some(true) => CallStatus::Completed,
                _ => CallStatus::InProgress,
            }
        }
    }
}

fn map_direction(inbound: Option<bool>) -> CallDirection {
    if inbound == Some(true) {
        CallDirection::Inbound
    } else {
        CallDirection::Outbound
    }
}

fn dollars_to_cents(dollars: Option<f64>) -> u64 {
    dollars.map(|d| (d * 100.0).round().max(0.0) as u64).unwrap_or(0)
}

fn snapshot(call: &WireCall) -> CallSnapshot {
    CallSnapshot {
        provider: PROVIDER,
        external_id: call.call_id.clone(),
        agent_external_id: call.agent_id.clone(),
        status: map_status(call),
        direction: map_direction(call.inbound),
        from_number: call.from.clone(),
        to_number: call.to.clone(),
        started_at: call.started_at.map(Timestamp::from),
        ended_at: call.end_at.map(Timestamp::from),
        duration_secs: call.call_length.unwrap_or(0.0).round().max(0.0) as u32,
    }
}

pub async fn initiate(
    client: &reqwest::Client,
    base: &str,
    request: InitiateRequest,
) -> Result<InitiatedCall, ProviderError> {
    let body = SendCallRequest {
        agent_id: &request.agent_external_id,
        phone_number: &request.to_number,
        from: request.from_number.as_deref(),
        task: request.prompt_override.as_deref(),
        metadata: &request.metadata,
    };

    let response = client
        .post(format!("{}/calls", base))
        .header("authorization", request.key.as_str())
        .json(&body)
        .send()
        .await
        .map_err(|e| transport_error(PROVIDER, e))?;
    let response = check_status(PROVIDER, response).await?;

    let created: SendCallResponse = response.json().await.map_err(|e| ProviderError::Decode {
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
        .post(format!("{}/calls/{}/stop", base, external_id))
        .header("authorization", key.as_str())
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
        .header("authorization", key.as_str())
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
    #[derive(Deserialize)]
    struct ListResponse {
        calls: Vec<WireCall>,
    }

    let response = client
        .get(format!("{}/calls?status=in_progress&limit=100", base))
        .header("authorization", key.as_str())
        .send()
        .await
        .map_err(|e| transport_error(PROVIDER, e))?;
    let response = check_status(PROVIDER, response).await?;

    let list: ListResponse = response.json().await.map_err(|e| ProviderError::Decode {
        provider: PROVIDER,
        detail: e.to_string(),
    })?;

    Ok(list
        .calls
        .iter()
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
    let response = client
        .post(format!("{}/agents/{}/session-token", base, agent_external_id))
        .header("authorization", key.as_str())
        .send()
        .await
        .map_err(|e| transport_error(PROVIDER, e))?;
    let response = check_status(PROVIDER, response).await?;

    let token: SessionTokenResponse =
        response.json().await.map_err(|e| ProviderError::Decode {
            provider: PROVIDER,
            detail: e.to_string(),
        })?;
    Ok(WebSession {
        token: Credential::new(token.token),
        expires_at: Timestamp::from(token.expires_at),
    })
}

pub fn parse_webhook(body: &[u8]) -> Result<ProviderEvent, WebhookParseError> {
    let raw: Value = serde_json::from_slice(body).map_err(|source| WebhookParseError::Json {
        provider: PROVIDER,
        source,
    })?;
    let wire: WebhookWire =
        serde_json::from_value(raw.clone()).map_err(|source| WebhookParseError::Json {
            provider: PROVIDER,
            source,
        })?;

    let kind = match wire.event_type.as_str() {
        "call_start" => ProviderEventKind::Started,
        "call_update" => ProviderEventKind::Updated,
        "call_complete" => ProviderEventKind::Ended,
        "transcript_update" => ProviderEventKind::Transcript,
        other => {
            return Err(WebhookParseError::UnknownEventType {
                provider: PROVIDER,
                kind: other.to_string(),
            })
        }
    };

    if wire.call.call_id.is_empty() {
        return Err(WebhookParseError::MissingField {
            provider: PROVIDER,
            field: "call_id",
        });
    }

    let call = &wire.call;
    let status = match kind {
        ProviderEventKind::Started => CallStatus::InProgress,
        ProviderEventKind::Ended => {
            if call.error_message.is_some() || call.status.as_deref() == Some("failed") {
                CallStatus::Failed
            } else {
                CallStatus::Completed
            }
        }
        _ => map_status(call),
    };

    Ok(ProviderEvent {
        kind,
        provider: PROVIDER,
        external_id: call.call_id.clone(),
        agent_external_id: call.agent_id.clone(),
        status,
        direction: map_direction(call.inbound),
        from_number: call.from.clone(),
        to_number: call.to.clone(),
        started_at: call.started_at.map(Timestamp::from),
        ended_at: call.end_at.map(Timestamp::from),
        duration_secs: call.call_length.unwrap_or(0.0).round().max(0.0) as u32,
        cost_cents: dollars_to_cents(call.price),
        transcript: call.concatenated_transcript.clone(),
        summary: call.summary.clone(),
        voicemail: call.answered_by.as_deref() == Some("voicemail"),
        provider_meta: raw,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_flat_complete_webhook() {
        let body = serde_json::json!({
            "event_type": "call_complete",
            "call_id": "c-call-1",
            "agent_id": "c-agent-1",
            "status": "completed",
            "inbound": false,
            "from": "+14155550000",
            "to": "+14155551234",
            "started_at": "2026-07-21T18:00:00Z",
            "end_at": "2026-07-21T18:02:00Z",
            "call_length": 120.4,
            "price": 0.9,
            "concatenated_transcript": "hi",
            "summary": "left a message",
            "answered_by": "voicemail"
        });

        let event = parse_webhook(serde_json::to_vec(&body).unwrap().as_slice()).unwrap();
        assert_eq!(event.kind, ProviderEventKind::Ended);
        assert_eq!(event.status, CallStatus::Completed);
        assert_eq!(event.duration_secs, 120);
        assert_eq!(event.cost_cents, 90);
        assert!(event.voicemail);
    }

    #[test]
    fn error_message_means_failed() {
        let body = serde_json::json!({
            "event_type": "call_complete",
            "call_id": "c-call-2",
            "agent_id": "c-agent-1",
            "error_message": "carrier rejected"
        });
        let event = parse_webhook(serde_json::to_vec(&body).unwrap().as_slice()).unwrap();
        assert_eq!(event.status, CallStatus::Failed);
    }

    #[test]
    fn missing_call_id_rejected() {
        let body = serde_json::json!({
            "event_type": "call_complete",
            "call_id": "",
            "agent_id": "c-agent-1"
        });
        assert!(matches!(
            parse_webhook(serde_json::to_vec(&body).unwrap().as_slice()),
            Err(WebhookParseError::MissingField { .. })
        ));
    }
}
