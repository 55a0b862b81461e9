use axum::{extract::State, http::HeaderMap, response::IntoResponse, Json};

use crate::{scheduler, signature};

use super::super::{
    error::ApiError,
    state::HttpState,
    types::{ApiResponse, CronResponse},
};

/// Scheduler tick, hit by an external driver on a one-minute-or-slower
/// cadence. Requires the configured cron bearer; answers 503 until one is
/// configured so a misdeployed instance can never be driven.
#[utoipa::path(
    post,
    path = "/cron/process-scheduled",
    responses(
        (status = 200, description = "Batch drained", body = ApiResponse<CronResponse>),
        (status = 401, description = "Bad bearer"),
        (status = 503, description = "CRON_SECRET is not configured"),
    ),
    security(("cron_secret" = []))
)]
#[axum::debug_handler]
pub async fn handle_process_scheduled(
    State(state): State<HttpState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    state.metrics.increment_requests("/cron/process-scheduled");

    let secret = state
        .config
        .cron_secret
        .as_ref()
        .ok_or_else(|| ApiError::ServiceUnavailable("scheduler secret not configured".into()))?;

    let token = headers
        .get("authorization")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or(ApiError::Unauthorized)?;
    if !signature::bearer_matches(token.trim(), secret) {
        state.metrics.increment_auth_failures();
        return Err(ApiError::Unauthorized);
    }

    let summary = scheduler::tick(&state.app)
        .await
        .map_err(|err| ApiError::Internal(err.into()))?;

    Ok(Json(ApiResponse::data(CronResponse { summary })))
}
