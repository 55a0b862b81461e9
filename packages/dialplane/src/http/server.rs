use std::sync::Arc;

use axum::{
    http::{HeaderValue, Method},
    routing::{get, post},
};
use axum_tracing_opentelemetry::middleware::OtelAxumLayer;
use tower_http::{cors::AllowOrigin, cors::CorsLayer, trace::TraceLayer};
use utils::{context::AppContext, telemetry::HttpMetrics};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;
use wildmatch::WildMatch;

use crate::{app::App, config::Config};

use super::{
    handlers::{
        handle_active_calls, handle_end_call, handle_health, handle_live_call, handle_not_found,
        handle_process_scheduled, handle_provider_webhook, handle_trigger_api,
        handle_trigger_crm_a, handle_trigger_crm_b, handle_trigger_schedule,
        handle_widget_session, openapi::ApiDoc,
    },
    state::HttpState,
};

// this is called from main, blocks until shutdown
pub fn start(
    ctx: AppContext,
    config: Config,
    app: Arc<App>,
    metrics: HttpMetrics,
) -> anyhow::Result<()> {
    // The server runs within the tokio runtime
    ctx.rt.clone().block_on(async move {
        let (host, port) = (config.host.clone(), config.port);

        let mut shutdown_signal = ctx.get_kill_receiver();

        let router = make_router(config, app, metrics);

        let listener = tokio::net::TcpListener::bind(&format!("{}:{}", host, port)).await?;

        tracing::info!("Http server starting on: {}", listener.local_addr()?);

        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                shutdown_signal.recv().await.ok();

                tracing::debug!("Http server shutting down");
            })
            .await?;

        anyhow::Ok(())
    })?;

    Ok(())
}

// called from main and tests
pub fn make_router(config: Config, app: Arc<App>, metrics: HttpMetrics) -> axum::Router {
    let cors = cors_layer(&config.cors_allowed_origins);
    let state = HttpState::new(config, app, metrics);

    axum::Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/health", get(handle_health))
        .route("/trigger/crm-a", post(handle_trigger_crm_a))
        .route("/trigger/crm-b", post(handle_trigger_crm_b))
        .route("/trigger/api", post(handle_trigger_api))
        .route("/trigger/schedule", post(handle_trigger_schedule))
        .route("/webhook/{provider}", post(handle_provider_webhook))
        .route("/cron/process-scheduled", post(handle_process_scheduled))
        .route("/calls/active", get(handle_active_calls))
        .route("/calls/{id}/end", post(handle_end_call))
        .route("/calls/{id}/live", get(handle_live_call))
        .route("/widget/{agent_id}/session", post(handle_widget_session))
        .fallback(handle_not_found)
        .layer(TraceLayer::new_for_http())
        .layer(OtelAxumLayer::default())
        .layer(cors)
        .with_state(state)
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    if allowed_origins.is_empty() {
        return CorsLayer::new();
    }

    let patterns: Vec<WildMatch> = allowed_origins.iter().map(|p| WildMatch::new(p)).collect();
    CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_origin(AllowOrigin::predicate(
            move |origin: &HeaderValue, _request| match origin.to_str() {
                Ok(origin) => patterns.iter().any(|pattern| pattern.matches(origin)),
                Err(_) => false,
            },
        ))
}
