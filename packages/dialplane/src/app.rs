use std::sync::Arc;

use opentelemetry::global;

use dialplane_types::TenantId;
use utils::{
    clock::{SharedClock, SystemClock},
    rate_limit::{RateLimiter, RateLimits},
    single_flight::SingleFlight,
    telemetry::EngineMetrics,
};

use crate::{
    broadcast::{EventSink, HttpEventSink, NoopEventSink},
    config::Config,
    providers::{HttpProviderAdapter, ProviderApi},
    store::Store,
    timezone::TimezoneOracle,
};

/// Key for the OAuth single-flight guard: one refresh at a time per
/// `(tenant, integration)`.
pub type RefreshKey = (TenantId, &'static str);

/// Everything the subsystems share. One of these exists per process; HTTP
/// state and background tasks hold it behind an `Arc`.
pub struct App {
    pub config: Config,
    pub store: Store,
    pub clock: SharedClock,
    pub oracle: TimezoneOracle,
    pub provider_api: Arc<dyn ProviderApi>,
    pub event_sink: Arc<dyn EventSink>,
    pub refresh_guard: SingleFlight<RefreshKey>,
    pub rate_limiter: RateLimiter,
    pub metrics: EngineMetrics,
    /// Client for workflow actions and other outbound integration calls.
    pub http_client: reqwest::Client,
}

impl App {
    /// Production wiring: real clock, HTTPS provider adapter, push event
    /// sink when an endpoint is configured.
    pub fn new(config: Config) -> anyhow::Result<Self> {
        let store = Store::new()?;
        let meter = global::meter("dialplane");
        let metrics = EngineMetrics::init(&meter);

        let event_sink: Arc<dyn EventSink> = match &config.broadcast_endpoint {
            Some(endpoint) => Arc::new(HttpEventSink::new(
                endpoint.clone(),
                metrics.broadcast.clone(),
            )),
            None => Arc::new(NoopEventSink),
        };

        let provider_api: Arc<dyn ProviderApi> =
            Arc::new(HttpProviderAdapter::new(config.provider_endpoints.clone()));

        let http_client = reqwest::Client::builder()
            .timeout(crate::workflow::ACTION_TIMEOUT)
            .build()?;

        let rate_limiter = RateLimiter::new(store.db().clone(), RateLimits::default());

        Ok(Self {
            config,
            store,
            clock: Arc::new(SystemClock),
            oracle: TimezoneOracle::new(),
            provider_api,
            event_sink,
            refresh_guard: SingleFlight::new(),
            rate_limiter,
            metrics,
            http_client,
        })
    }
}
