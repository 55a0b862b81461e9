use axum::{http::StatusCode, response::IntoResponse, Json};

use super::super::types::ApiResponse;

pub async fn handle_not_found() -> impl IntoResponse {
    let body: ApiResponse<()> = ApiResponse::error("not found".to_string());
    (StatusCode::NOT_FOUND, Json(body))
}
