//! Inbound trigger endpoints: the two CRM webhooks and the partner API.
//!
//! Pipeline order matters: parse just enough of the body to resolve the
//! tenant, verify the signature against the raw bytes, and only then
//! deserialize the full payload and hand off to ingress. A failed signature
//! leaves no trace of the payload anywhere.

use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    response::IntoResponse,
    Json,
};
use serde_json::Value;

use dialplane_types::{Tenant, TriggerRequest, TriggerSource};

use crate::{
    ingress,
    signature::{self, CRM_A_SIGNATURE_HEADER, CRM_B_SIGNATURE_HEADER, CRM_B_TIMESTAMP_HEADER},
};

use super::super::{
    error::ApiError,
    state::HttpState,
    types::{ApiResponse, TriggerResponse},
};

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

fn parse_request(body: &[u8]) -> Result<(Value, TriggerRequest), ApiError> {
    let raw: Value = serde_json::from_slice(body)
        .map_err(|err| ApiError::Validation(format!("invalid json body: {}", err)))?;
    let request: TriggerRequest = serde_json::from_value(raw.clone())
        .map_err(|err| ApiError::Validation(format!("invalid trigger payload: {}", err)))?;
    Ok((raw, request))
}

async fn respond(
    state: &HttpState,
    tenant: &Tenant,
    source: TriggerSource,
    request: &TriggerRequest,
) -> Result<Json<ApiResponse<TriggerResponse>>, ApiError> {
    let outcome = ingress::handle_trigger(&state.app, tenant, source, request).await?;
    Ok(Json(ApiResponse::data(outcome.into())))
}

/// CRM A workflow webhook.
#[utoipa::path(
    post,
    path = "/trigger/crm-a",
    request_body = TriggerRequest,
    responses(
        (status = 200, description = "Call initiated or scheduled", body = ApiResponse<TriggerResponse>),
        (status = 400, description = "Validation failure"),
        (status = 401, description = "Signature verification failed"),
    )
)]
#[axum::debug_handler]
pub async fn handle_trigger_crm_a(
    State(state): State<HttpState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    state.metrics.increment_requests("/trigger/crm-a");
    let (raw, request) = parse_request(&body)?;

    let location_id = raw
        .get("location_id")
        .and_then(Value::as_str)
        .ok_or_else(|| ApiError::Validation("location_id is required".into()))?;
    let tenant = state
        .app
        .store
        .tenant_by_location(location_id)?
        .ok_or(ApiError::Unauthorized)?;
    let crm_a = tenant
        .integrations
        .crm_a
        .as_ref()
        .ok_or(ApiError::Unauthorized)?;

    signature::verify_trigger(
        &body,
        header(&headers, CRM_A_SIGNATURE_HEADER),
        &crm_a.webhook_secret,
        None,
        state.app.clock.now(),
    )
    .map_err(|_| {
        state.metrics.increment_auth_failures();
        ApiError::Unauthorized
    })?;

    respond(&state, &tenant, TriggerSource::CrmA, &request).await
}

/// CRM B workflow webhook. Carries a signed timestamp with a replay window.
#[utoipa::path(
    post,
    path = "/trigger/crm-b",
    request_body = TriggerRequest,
    responses(
        (status = 200, description = "Call initiated or scheduled", body = ApiResponse<TriggerResponse>),
        (status = 400, description = "Validation failure"),
        (status = 401, description = "Signature verification failed"),
    )
)]
#[axum::debug_handler]
pub async fn handle_trigger_crm_b(
    State(state): State<HttpState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    state.metrics.increment_requests("/trigger/crm-b");
    let (raw, request) = parse_request(&body)?;

    let portal_id = raw
        .get("portal_id")
        .and_then(Value::as_str)
        .ok_or_else(|| ApiError::Validation("portal_id is required".into()))?;
    let tenant = state
        .app
        .store
        .tenant_by_portal(portal_id)?
        .ok_or(ApiError::Unauthorized)?;
    let crm_b = tenant
        .integrations
        .crm_b
        .as_ref()
        .ok_or(ApiError::Unauthorized)?;

    signature::verify_trigger(
        &body,
        header(&headers, CRM_B_SIGNATURE_HEADER),
        &crm_b.webhook_secret,
        header(&headers, CRM_B_TIMESTAMP_HEADER),
        state.app.clock.now(),
    )
    .map_err(|_| {
        state.metrics.increment_auth_failures();
        ApiError::Unauthorized
    })?;

    respond(&state, &tenant, TriggerSource::CrmB, &request).await
}

/// Generic partner trigger, authenticated with a `pdy_sk_` bearer key.
#[utoipa::path(
    post,
    path = "/trigger/api",
    request_body = TriggerRequest,
    responses(
        (status = 200, description = "Call initiated or scheduled", body = ApiResponse<TriggerResponse>),
        (status = 400, description = "Validation failure"),
        (status = 401, description = "Unknown or malformed API key"),
    ),
    security(("partner_api_key" = []))
)]
#[axum::debug_handler]
pub async fn handle_trigger_api(
    State(state): State<HttpState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    state.metrics.increment_requests("/trigger/api");
    let tenant = state.tenant_from_bearer(header(&headers, "authorization"))?;

    let (_, request) = parse_request(&body)?;
    respond(&state, &tenant, TriggerSource::Api, &request).await
}

/// Dashboard "schedule this call" action, same bearer auth as the partner
/// API but recorded under its own trigger source.
#[utoipa::path(
    post,
    path = "/trigger/schedule",
    request_body = TriggerRequest,
    responses(
        (status = 200, description = "Call initiated or scheduled", body = ApiResponse<TriggerResponse>),
        (status = 401, description = "Unknown or malformed API key"),
    ),
    security(("partner_api_key" = []))
)]
#[axum::debug_handler]
pub async fn handle_trigger_schedule(
    State(state): State<HttpState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    state.metrics.increment_requests("/trigger/schedule");
    let tenant = state.tenant_from_bearer(header(&headers, "authorization"))?;

    let (_, request) = parse_request(&body)?;
    respond(&state, &tenant, TriggerSource::Dashboard, &request).await
}
