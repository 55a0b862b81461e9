//! Provider webhook endpoints.
//!
//! Providers retry on anything that is not a 2xx, so every outcome other
//! than a signature failure acks `{received: true}`.

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::HeaderMap,
    response::IntoResponse,
    Json,
};

use dialplane_types::Provider;

use crate::{
    signature::{
        PROVIDER_A_SIGNATURE_HEADER, PROVIDER_B_SIGNATURE_HEADER, PROVIDER_C_SIGNATURE_HEADER,
        PROVIDER_C_TIMESTAMP_HEADER,
    },
    webhooks::{self, WebhookHeaders},
};

use super::super::{
    error::ApiError,
    state::HttpState,
    types::{ApiResponse, WebhookAck},
};

/// Asynchronous callbacks from the voice providers.
#[utoipa::path(
    post,
    path = "/webhook/{provider}",
    params(("provider" = String, Path, description = "provider-a | provider-b | provider-c")),
    request_body(content = String, content_type = "application/octet-stream", description = "raw webhook payload"),
    responses(
        (status = 200, description = "Event received", body = ApiResponse<WebhookAck>),
        (status = 401, description = "Signature verification failed"),
        (status = 404, description = "Unknown provider segment"),
    )
)]
#[axum::debug_handler]
pub async fn handle_provider_webhook(
    State(state): State<HttpState>,
    Path(provider): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let provider: Provider = provider.parse().map_err(|_| ApiError::NotFound)?;
    state
        .metrics
        .increment_requests(&format!("/webhook/{}", provider.path_segment()));

    let (signature_header, timestamp_header) = match provider {
        Provider::ProviderA => (PROVIDER_A_SIGNATURE_HEADER, None),
        Provider::ProviderB => (PROVIDER_B_SIGNATURE_HEADER, None),
        Provider::ProviderC => (PROVIDER_C_SIGNATURE_HEADER, Some(PROVIDER_C_TIMESTAMP_HEADER)),
    };

    let webhook_headers = WebhookHeaders {
        signature: headers
            .get(signature_header)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        timestamp: timestamp_header
            .and_then(|name| headers.get(name))
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
    };

    let url_path = format!("/webhook/{}", provider.path_segment());
    webhooks::handle_provider_webhook(
        &state.app,
        provider,
        "POST",
        &url_path,
        &webhook_headers,
        &body,
    )
    .await
    .map_err(|err| {
        if matches!(err, crate::webhooks::WebhookError::Unauthorized(_)) {
            state.metrics.increment_auth_failures();
        }
        ApiError::from(err)
    })?;

    Ok(Json(ApiResponse::data(WebhookAck::received())))
}
