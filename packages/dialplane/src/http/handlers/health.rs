use axum::{extract::State, response::IntoResponse, Json};

use super::super::{
    state::HttpState,
    types::{ApiResponse, HealthResponse},
};

#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Service health", body = ApiResponse<HealthResponse>))
)]
#[axum::debug_handler]
pub async fn handle_health(State(state): State<HttpState>) -> impl IntoResponse {
    state.metrics.increment_requests("/health");
    Json(ApiResponse::data(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    }))
}
