//! Call read/control endpoints for authorized tenants.

use std::collections::HashMap;

use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;

use dialplane_types::{CallStatus, Provider, Tenant};

use crate::keys;

use super::super::{
    error::ApiError,
    state::HttpState,
    types::{ActiveCallsResponse, ApiResponse, EndCallResponse, LiveCallResponse, LiveCallSource},
};

fn bearer_tenant(state: &HttpState, headers: &HeaderMap) -> Result<Tenant, ApiError> {
    state.tenant_from_bearer(
        headers
            .get("authorization")
            .and_then(|value| value.to_str().ok()),
    )
}

#[derive(Deserialize)]
pub struct ProviderParam {
    pub provider: String,
}

/// Ongoing calls across the tenant's configured providers: everything the
/// store knows is live, plus whatever each provider reports for the
/// tenant's agents. Provider outages degrade to the stored view.
#[utoipa::path(
    get,
    path = "/calls/active",
    responses(
        (status = 200, description = "Ongoing calls", body = ApiResponse<ActiveCallsResponse>),
        (status = 401, description = "Bad bearer"),
    ),
    security(("partner_api_key" = []))
)]
#[axum::debug_handler]
pub async fn handle_active_calls(
    State(state): State<HttpState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    state.metrics.increment_requests("/calls/active");
    let tenant = bearer_tenant(&state, &headers)?;
    let app = &state.app;

    let mut calls = app.store.ongoing_calls(&tenant.id)?;
    let mut seen: HashMap<(Provider, String), ()> = calls
        .iter()
        .map(|call| ((call.provider, call.external_id.clone()), ()))
        .collect();

    // group the tenant's agents per provider, then ask each configured
    // provider what it sees
    let agents = app.store.agents_for_tenant(&tenant.id)?;
    for provider in Provider::ALL {
        let external_ids: Vec<String> = agents
            .iter()
            .filter(|agent| agent.provider == provider)
            .map(|agent| agent.external_id.clone())
            .collect();
        if external_ids.is_empty() {
            continue;
        }
        let Ok(resolved) = keys::resolve(&app.store, &tenant.id, None, provider) else {
            continue;
        };

        match app
            .provider_api
            .list_active(provider, &resolved.key, &external_ids)
            .await
        {
            Ok(snapshots) => {
                for snapshot in snapshots {
                    let key = (snapshot.provider, snapshot.external_id.clone());
                    if seen.contains_key(&key) {
                        continue;
                    }
                    seen.insert(key, ());
                    // a live call the store hasn't seen a webhook for yet
                    if let Some(agent) =
                        app.store.agent_by_external(provider, &snapshot.agent_external_id)?
                    {
                        let event = snapshot_event(&snapshot);
                        let upsert =
                            app.store.upsert_call_event(&agent, &event, app.clock.now())?;
                        calls.push(upsert.call);
                    }
                }
            }
            Err(err) => {
                tracing::warn!(provider = %provider, error = %err, "active call listing failed");
            }
        }
    }

    Ok(Json(ApiResponse::data(ActiveCallsResponse { calls })))
}

fn snapshot_event(snapshot: &dialplane_types::CallSnapshot) -> dialplane_types::ProviderEvent {
    dialplane_types::ProviderEvent {
        kind: dialplane_types::ProviderEventKind::Updated,
        provider: snapshot.provider,
        external_id: snapshot.external_id.clone(),
        agent_external_id: snapshot.agent_external_id.clone(),
        status: snapshot.status,
        direction: snapshot.direction,
        from_number: snapshot.from_number.clone(),
        to_number: snapshot.to_number.clone(),
        started_at: snapshot.started_at,
        ended_at: snapshot.ended_at,
        duration_secs: snapshot.duration_secs,
        cost_cents: 0,
        transcript: None,
        summary: None,
        voicemail: false,
        provider_meta: serde_json::Value::Null,
    }
}

/// End an active call at the provider.
#[utoipa::path(
    post,
    path = "/calls/{id}/end",
    params(
        ("id" = String, Path, description = "External provider call id"),
        ("provider" = String, Query, description = "provider-a | provider-b | provider-c"),
    ),
    responses(
        (status = 200, description = "End requested", body = ApiResponse<EndCallResponse>),
        (status = 401, description = "Bad bearer"),
        (status = 403, description = "Call belongs to another tenant"),
    ),
    security(("partner_api_key" = []))
)]
#[axum::debug_handler]
pub async fn handle_end_call(
    State(state): State<HttpState>,
    Path(id): Path<String>,
    Query(params): Query<ProviderParam>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    state.metrics.increment_requests("/calls/end");
    let tenant = bearer_tenant(&state, &headers)?;
    let provider: Provider = params
        .provider
        .parse()
        .map_err(|_| ApiError::Validation("unknown provider".into()))?;

    // a stored record must belong to the caller
    if let Some(call) = state.app.store.call_by_external(provider, &id)? {
        if call.tenant_id != tenant.id {
            return Err(ApiError::Forbidden);
        }
        if call.status.is_terminal() {
            return Err(ApiError::Conflict("call has already ended".into()));
        }
    }

    let resolved = keys::resolve(&state.app.store, &tenant.id, None, provider)?;
    state
        .app
        .provider_api
        .end_call(provider, &resolved.key, &id)
        .await?;

    Ok(Json(ApiResponse::data(EndCallResponse { ended: true })))
}

/// Live view of one call: the stored record when we have one, otherwise a
/// fetch straight from the provider.
#[utoipa::path(
    get,
    path = "/calls/{id}/live",
    params(
        ("id" = String, Path, description = "External provider call id"),
        ("provider" = String, Query, description = "provider-a | provider-b | provider-c"),
    ),
    responses(
        (status = 200, description = "Live view", body = ApiResponse<LiveCallResponse>),
        (status = 404, description = "Neither the store nor the provider knows this call"),
    ),
    security(("partner_api_key" = []))
)]
#[axum::debug_handler]
pub async fn handle_live_call(
    State(state): State<HttpState>,
    Path(id): Path<String>,
    Query(params): Query<ProviderParam>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    state.metrics.increment_requests("/calls/live");
    let tenant = bearer_tenant(&state, &headers)?;
    let provider: Provider = params
        .provider
        .parse()
        .map_err(|_| ApiError::Validation("unknown provider".into()))?;

    if let Some(call) = state.app.store.call_by_external(provider, &id)? {
        if call.tenant_id != tenant.id {
            return Err(ApiError::NotFound);
        }
        // a non-terminal stored record may be stale; prefer it anyway and
        // let webhooks catch it up
        if call.status.is_terminal() || call.status == CallStatus::InProgress {
            return Ok(Json(ApiResponse::data(LiveCallResponse {
                call: Some(call),
                source: LiveCallSource::Store,
            })));
        }
    }

    let resolved = keys::resolve(&state.app.store, &tenant.id, None, provider)?;
    let snapshot = state
        .app
        .provider_api
        .fetch_call(provider, &resolved.key, &id)
        .await?
        .ok_or(ApiError::NotFound)?;

    let agent = state
        .app
        .store
        .agent_by_external(provider, &snapshot.agent_external_id)?
        .ok_or(ApiError::NotFound)?;
    if agent.tenant_id != tenant.id {
        return Err(ApiError::NotFound);
    }

    let event = snapshot_event(&snapshot);
    let upsert = state
        .app
        .store
        .upsert_call_event(&agent, &event, state.app.clock.now())?;

    Ok(Json(ApiResponse::data(LiveCallResponse {
        call: Some(upsert.call),
        source: LiveCallSource::Provider,
    })))
}
