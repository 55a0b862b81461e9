use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};

use dialplane_types::{AgentId, WidgetConfig, DEFAULT_WIDGET_COLOR};

use crate::keys;

use super::super::{
    error::ApiError,
    state::HttpState,
    types::{ApiResponse, WidgetDisplay, WidgetSessionResponse},
};

/// Public endpoint behind the embeddable web widget: trades an agent id for
/// a short-lived provider access token plus display config. Only agents
/// explicitly flagged widget-enabled are reachable.
#[utoipa::path(
    post,
    path = "/widget/{agent_id}/session",
    params(("agent_id" = String, Path, description = "Agent id")),
    responses(
        (status = 200, description = "Widget session", body = ApiResponse<WidgetSessionResponse>),
        (status = 404, description = "Unknown agent or widget not enabled"),
    )
)]
#[axum::debug_handler]
pub async fn handle_widget_session(
    State(state): State<HttpState>,
    Path(agent_id): Path<AgentId>,
) -> Result<impl IntoResponse, ApiError> {
    state.metrics.increment_requests("/widget/session");
    let app = &state.app;

    let agent = app.store.agent(&agent_id)?.ok_or(ApiError::NotFound)?;
    // disabled widgets are indistinguishable from missing agents on purpose
    if !agent.widget_enabled() {
        return Err(ApiError::NotFound);
    }

    if let Some(client_id) = &agent.client_id {
        if let Some(client) = app.store.client(client_id)? {
            if !client.permissions.allow_widget {
                return Err(ApiError::NotFound);
            }
        }
    }

    let resolved = keys::resolve(
        &app.store,
        &agent.tenant_id,
        agent.client_id.as_ref(),
        agent.provider,
    )?;

    let session = app
        .provider_api
        .create_web_session(agent.provider, &resolved.key, &agent.external_id)
        .await?;

    let widget = agent.widget.clone().unwrap_or_default();
    Ok(Json(ApiResponse::data(WidgetSessionResponse {
        token: session.token.as_str().to_string(),
        expires_at: session.expires_at.as_datetime().to_rfc3339(),
        widget: display_config(&widget),
        return_url: state.config.app_url.clone(),
    })))
}

fn display_config(widget: &WidgetConfig) -> WidgetDisplay {
    WidgetDisplay {
        color: if widget.color.is_empty() {
            DEFAULT_WIDGET_COLOR.to_string()
        } else {
            widget.color.clone()
        },
        display: widget.display.clone(),
    }
}
