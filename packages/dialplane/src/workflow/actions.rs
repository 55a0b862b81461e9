//! Action dispatch for the closed registry.
//!
//! Every action boils down to one external HTTP call built from the
//! interpolated config plus the resolved integration context. Outcomes are
//! classified the same way provider calls are: network trouble, 5xx and
//! 429 retry; other 4xx are final.

use std::sync::Arc;

use serde_json::{json, Value};
use thiserror::Error;

use dialplane_types::ActionKind;

use crate::app::App;

use super::integrations::IntegrationContext;
use super::url_guard::{self, UrlGuardError};

#[derive(Error, Debug)]
pub enum ActionError {
    #[error("retryable: {0}")]
    Retryable(String),

    #[error("{0}")]
    Fatal(String),

    #[error("integration {0} is not connected for this tenant")]
    NotConfigured(&'static str),

    #[error("bad action config: {0}")]
    BadConfig(String),
}

/// An action failure plus whether it may stop the remaining actions.
#[derive(Debug)]
pub struct ActionFailure {
    pub error: ActionError,
    pub fatal_stop: bool,
}

impl From<UrlGuardError> for ActionError {
    fn from(err: UrlGuardError) -> Self {
        ActionError::BadConfig(err.to_string())
    }
}

pub async fn run(
    app: &Arc<App>,
    kind: ActionKind,
    config: &Value,
    payload: &Value,
    context: &IntegrationContext,
) -> Result<(), ActionFailure> {
    dispatch(app, kind, config, payload, context)
        .await
        .map_err(|error| {
            let final_failure = !matches!(error, ActionError::Retryable(_));
            ActionFailure {
                fatal_stop: kind.may_fatal_stop() && final_failure,
                error,
            }
        })
}

async fn dispatch(
    app: &Arc<App>,
    kind: ActionKind,
    config: &Value,
    payload: &Value,
    context: &IntegrationContext,
) -> Result<(), ActionError> {
    let endpoints = &app.config.integration_endpoints;

    match kind {
        ActionKind::Webhook => {
            let url = cfg_str(config, "url")?;
            let url = url_guard::validate_webhook_url(url)?;
            let method = config
                .get("method")
                .and_then(Value::as_str)
                .unwrap_or("POST")
                .to_ascii_uppercase();
            let body = config.get("body").cloned().unwrap_or_else(|| payload.clone());

            let mut request = match method.as_str() {
                "POST" => app.http_client.post(url),
                "PUT" => app.http_client.put(url),
                "PATCH" => app.http_client.patch(url),
                "GET" => app.http_client.get(url),
                other => {
                    return Err(ActionError::BadConfig(format!(
                        "unsupported webhook method {}",
                        other
                    )))
                }
            };
            if method != "GET" {
                request = request.json(&body);
            }
            if let Some(headers) = config.get("headers").and_then(Value::as_object) {
                for (name, value) in headers {
                    if let Some(value) = value.as_str() {
                        request = request.header(name.as_str(), value);
                    }
                }
            }
            send(request).await
        }

        // --- CRM A: location-scoped, api-key auth ---
        kind @ (ActionKind::CrmALogCall
        | ActionKind::CrmAUpsertContact
        | ActionKind::CrmAAddTags
        | ActionKind::CrmARemoveTags
        | ActionKind::CrmAUpdatePipelineStage
        | ActionKind::CrmASetLeadScore
        | ActionKind::CrmABookAppointment
        | ActionKind::CrmACancelAppointment
        | ActionKind::CrmAAddCallNote
        | ActionKind::CrmATriggerWorkflow
        | ActionKind::CrmAUpdateField
        | ActionKind::SendSms
        | ActionKind::SendEmail) => {
            let crm = context
                .crm_a
                .as_ref()
                .ok_or(ActionError::NotConfigured("crm_a"))?;
            let base = &endpoints.crm_a_api;
            let auth = |req: reqwest::RequestBuilder| req.bearer_auth(crm.api_key.as_str());

            let request = match kind {
                ActionKind::CrmALogCall => auth(app.http_client.post(format!(
                    "{}/contacts/{}/activities",
                    base,
                    cfg_str(config, "contact_id")?
                )))
                .json(&json!({
                    "type": "call",
                    "location_id": crm.location_id,
                    "direction": payload.get("direction"),
                    "duration_secs": payload.get("duration_secs"),
                    "summary": config.get("summary").or(payload.get("summary")),
                })),

                ActionKind::CrmAUpsertContact => auth(
                    app.http_client.post(format!("{}/contacts/upsert", base)),
                )
                .json(&json!({
                    "location_id": crm.location_id,
                    "phone": config.get("phone").or(payload.get("to_number")),
                    "name": config.get("name"),
                    "custom_fields": config.get("custom_fields"),
                })),

                ActionKind::CrmAAddTags => auth(app.http_client.post(format!(
                    "{}/contacts/{}/tags",
                    base,
                    cfg_str(config, "contact_id")?
                )))
                .json(&json!({ "tags": cfg_array(config, "tags")? })),

                ActionKind::CrmARemoveTags => auth(app.http_client.delete(format!(
                    "{}/contacts/{}/tags",
                    base,
                    cfg_str(config, "contact_id")?
                )))
                .json(&json!({ "tags": cfg_array(config, "tags")? })),

                ActionKind::CrmAUpdatePipelineStage => auth(app.http_client.put(format!(
                    "{}/opportunities/{}",
                    base,
                    cfg_str(config, "opportunity_id")?
                )))
                .json(&json!({
                    "pipeline_id": config.get("pipeline_id"),
                    "stage_id": cfg_str(config, "stage_id")?,
                })),

                ActionKind::CrmASetLeadScore => auth(app.http_client.put(format!(
                    "{}/contacts/{}",
                    base,
                    cfg_str(config, "contact_id")?
                )))
                .json(&json!({
                    "custom_fields": { "lead_score": config.get("score").or(payload.get("score")) }
                })),

                ActionKind::CrmABookAppointment => auth(
                    app.http_client.post(format!("{}/appointments", base)),
                )
                .json(&json!({
                    "location_id": crm.location_id,
                    "calendar_id": cfg_str(config, "calendar_id")?,
                    "contact_id": cfg_str(config, "contact_id")?,
                    "start_time": cfg_str(config, "start_time")?,
                    "title": config.get("title"),
                })),

                ActionKind::CrmACancelAppointment => auth(app.http_client.delete(format!(
                    "{}/appointments/{}",
                    base,
                    cfg_str(config, "appointment_id")?
                ))),

                ActionKind::CrmAAddCallNote => auth(app.http_client.post(format!(
                    "{}/contacts/{}/notes",
                    base,
                    cfg_str(config, "contact_id")?
                )))
                .json(&json!({
                    "body": config.get("note").or(payload.get("summary")),
                })),

                ActionKind::CrmATriggerWorkflow => auth(app.http_client.post(format!(
                    "{}/workflows/{}/trigger",
                    base,
                    cfg_str(config, "workflow_id")?
                )))
                .json(&json!({ "contact_id": config.get("contact_id") })),

                ActionKind::CrmAUpdateField => auth(app.http_client.put(format!(
                    "{}/contacts/{}",
                    base,
                    cfg_str(config, "contact_id")?
                )))
                .json(&json!({
                    "custom_fields": { (cfg_str(config, "field")?): config.get("value") }
                })),

                ActionKind::SendSms => auth(app.http_client.post(format!(
                    "{}/conversations/messages",
                    base
                )))
                .json(&json!({
                    "type": "SMS",
                    "location_id": crm.location_id,
                    "contact_id": config.get("contact_id"),
                    "phone": config.get("phone").or(payload.get("to_number")),
                    "message": cfg_str(config, "message")?,
                })),

                ActionKind::SendEmail => auth(app.http_client.post(format!(
                    "{}/conversations/messages",
                    base
                )))
                .json(&json!({
                    "type": "Email",
                    "location_id": crm.location_id,
                    "contact_id": config.get("contact_id"),
                    "subject": cfg_str(config, "subject")?,
                    "message": cfg_str(config, "message")?,
                })),

                _ => unreachable!("crm_a arm covers only crm_a kinds"),
            };
            send(request).await
        }

        // --- CRM B: portal-scoped, oauth ---
        kind @ (ActionKind::CrmBLogCall
        | ActionKind::CrmBUpsertContact
        | ActionKind::CrmBAddTags
        | ActionKind::CrmBRemoveTags
        | ActionKind::CrmBUpdatePipelineStage
        | ActionKind::CrmBSetLeadScore
        | ActionKind::CrmBBookAppointment
        | ActionKind::CrmBCancelAppointment
        | ActionKind::CrmBAddCallNote
        | ActionKind::CrmBTriggerWorkflow
        | ActionKind::CrmBUpdateField) => {
            let crm = context
                .crm_b
                .as_ref()
                .ok_or(ActionError::NotConfigured("crm_b"))?;
            let base = &endpoints.crm_b_api;
            let auth = |req: reqwest::RequestBuilder| req.bearer_auth(crm.access_token.as_str());

            let request = match kind {
                ActionKind::CrmBLogCall => auth(
                    app.http_client
                        .post(format!("{}/crm/v3/objects/calls", base)),
                )
                .json(&json!({
                    "properties": {
                        "hs_call_direction": payload.get("direction"),
                        "hs_call_duration": payload.get("duration_secs"),
                        "hs_call_body": config.get("summary").or(payload.get("summary")),
                    },
                    "associations": [{ "to": { "id": config.get("contact_id") } }]
                })),

                ActionKind::CrmBUpsertContact => auth(
                    app.http_client
                        .post(format!("{}/crm/v3/objects/contacts/upsert", base)),
                )
                .json(&json!({
                    "id_property": "phone",
                    "properties": {
                        "phone": config.get("phone").or(payload.get("to_number")),
                        "firstname": config.get("first_name"),
                        "lastname": config.get("last_name"),
                    }
                })),

                ActionKind::CrmBAddTags | ActionKind::CrmBRemoveTags => {
                    let op = if kind == ActionKind::CrmBAddTags {
                        "add"
                    } else {
                        "remove"
                    };
                    auth(app.http_client.patch(format!(
                        "{}/crm/v3/objects/contacts/{}",
                        base,
                        cfg_str(config, "contact_id")?
                    )))
                    .json(&json!({
                        "properties": { "tags": { "op": op, "values": cfg_array(config, "tags")? } }
                    }))
                }

                ActionKind::CrmBUpdatePipelineStage => auth(app.http_client.patch(format!(
                    "{}/crm/v3/objects/deals/{}",
                    base,
                    cfg_str(config, "deal_id")?
                )))
                .json(&json!({
                    "properties": { "dealstage": cfg_str(config, "stage_id")? }
                })),

                ActionKind::CrmBSetLeadScore => auth(app.http_client.patch(format!(
                    "{}/crm/v3/objects/contacts/{}",
                    base,
                    cfg_str(config, "contact_id")?
                )))
                .json(&json!({
                    "properties": { "lead_score": config.get("score").or(payload.get("score")) }
                })),

                ActionKind::CrmBBookAppointment => auth(
                    app.http_client
                        .post(format!("{}/crm/v3/objects/meetings", base)),
                )
                .json(&json!({
                    "properties": {
                        "hs_meeting_start_time": cfg_str(config, "start_time")?,
                        "hs_meeting_title": config.get("title"),
                    },
                    "associations": [{ "to": { "id": cfg_str(config, "contact_id")? } }]
                })),

                ActionKind::CrmBCancelAppointment => auth(app.http_client.delete(format!(
                    "{}/crm/v3/objects/meetings/{}",
                    base,
                    cfg_str(config, "meeting_id")?
                ))),

                ActionKind::CrmBAddCallNote => auth(
                    app.http_client
                        .post(format!("{}/crm/v3/objects/notes", base)),
                )
                .json(&json!({
                    "properties": { "hs_note_body": config.get("note").or(payload.get("summary")) },
                    "associations": [{ "to": { "id": cfg_str(config, "contact_id")? } }]
                })),

                ActionKind::CrmBTriggerWorkflow => auth(app.http_client.post(format!(
                    "{}/automation/v4/flows/{}/enrollments",
                    base,
                    cfg_str(config, "flow_id")?
                )))
                .json(&json!({ "contact_id": cfg_str(config, "contact_id")? })),

                ActionKind::CrmBUpdateField => auth(app.http_client.patch(format!(
                    "{}/crm/v3/objects/contacts/{}",
                    base,
                    cfg_str(config, "contact_id")?
                )))
                .json(&json!({
                    "properties": { (cfg_str(config, "field")?): config.get("value") }
                })),

                _ => unreachable!("crm_b arm covers only crm_b kinds"),
            };
            send(request).await
        }

        // --- calendar vendor ---
        kind @ (ActionKind::CalendarBookEvent
        | ActionKind::CalendarCancelEvent
        | ActionKind::CalendarCheckAvailability) => {
            let calendar = context
                .calendar
                .as_ref()
                .ok_or(ActionError::NotConfigured("calendar"))?;
            let base = &endpoints.calendar_api;
            let auth =
                |req: reqwest::RequestBuilder| req.bearer_auth(calendar.access_token.as_str());

            let request = match kind {
                ActionKind::CalendarBookEvent => auth(app.http_client.post(format!(
                    "{}/calendars/{}/events",
                    base, calendar.scope_id
                )))
                .json(&json!({
                    "start": cfg_str(config, "start_time")?,
                    "end": config.get("end_time"),
                    "title": config.get("title"),
                    "invitee": config.get("invitee"),
                })),

                ActionKind::CalendarCancelEvent => auth(app.http_client.delete(format!(
                    "{}/calendars/{}/events/{}",
                    base,
                    calendar.scope_id,
                    cfg_str(config, "event_id")?
                ))),

                ActionKind::CalendarCheckAvailability => auth(app.http_client.get(format!(
                    "{}/calendars/{}/availability?start={}&end={}",
                    base,
                    calendar.scope_id,
                    cfg_str(config, "start_time")?,
                    cfg_str(config, "end_time")?
                ))),

                _ => unreachable!("calendar arm covers only calendar kinds"),
            };
            send(request).await
        }

        // --- scheduling vendor ---
        kind @ (ActionKind::BookingCheckAvailability
        | ActionKind::BookingCreateLink
        | ActionKind::BookingCancel) => {
            let booking = context
                .booking
                .as_ref()
                .ok_or(ActionError::NotConfigured("booking"))?;
            let base = &endpoints.booking_api;
            let auth =
                |req: reqwest::RequestBuilder| req.header("x-api-key", booking.api_key.as_str());

            let request = match kind {
                ActionKind::BookingCheckAvailability => auth(app.http_client.get(format!(
                    "{}/availability?event_type={}",
                    base,
                    cfg_str(config, "event_type")?
                ))),

                ActionKind::BookingCreateLink => auth(
                    app.http_client.post(format!("{}/booking-links", base)),
                )
                .json(&json!({
                    "event_type": cfg_str(config, "event_type")?,
                    "invitee_phone": config.get("phone").or(payload.get("to_number")),
                    "organization": booking.organization,
                })),

                ActionKind::BookingCancel => auth(app.http_client.post(format!(
                    "{}/bookings/{}/cancel",
                    base,
                    cfg_str(config, "booking_id")?
                )))
                .json(&json!({ "reason": config.get("reason") })),

                _ => unreachable!("booking arm covers only booking kinds"),
            };
            send(request).await
        }

        // --- chat notification ---
        ActionKind::ChatNotify => {
            let chat = context
                .chat_webhook
                .as_ref()
                .ok_or(ActionError::NotConfigured("chat_webhook"))?;
            let url = url_guard::validate_webhook_url(&chat.url)?;
            let request = app.http_client.post(url).json(&json!({
                "text": cfg_str(config, "message")?,
            }));
            send(request).await
        }
    }
}

async fn send(request: reqwest::RequestBuilder) -> Result<(), ActionError> {
    let response = request.send().await.map_err(|err| {
        if err.is_timeout() {
            ActionError::Retryable("request timed out".into())
        } else {
            ActionError::Retryable(err.to_string())
        }
    })?;

    let status = response.status();
    if status.is_success() {
        return Ok(());
    }

    let code = status.as_u16();
    let body = response.text().await.unwrap_or_default();
    let message = format!("upstream returned {}: {}", code, truncate(&body, 300));
    if code == 429 || code >= 500 {
        Err(ActionError::Retryable(message))
    } else {
        Err(ActionError::Fatal(message))
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

fn cfg_str<'a>(config: &'a Value, key: &str) -> Result<&'a str, ActionError> {
    config
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ActionError::BadConfig(format!("missing {}", key)))
}

fn cfg_array<'a>(config: &'a Value, key: &str) -> Result<&'a Vec<Value>, ActionError> {
    config
        .get(key)
        .and_then(Value::as_array)
        .ok_or_else(|| ActionError::BadConfig(format!("missing {}", key)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_extraction() {
        let config = json!({"url": "https://x.example", "tags": ["a"], "empty": ""});
        assert_eq!(cfg_str(&config, "url").unwrap(), "https://x.example");
        assert!(cfg_str(&config, "missing").is_err());
        assert!(cfg_str(&config, "empty").is_err());
        assert_eq!(cfg_array(&config, "tags").unwrap().len(), 1);
        assert!(cfg_array(&config, "url").is_err());
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("héllo", 2), "hé");
        assert_eq!(truncate("ok", 300), "ok");
    }
}
