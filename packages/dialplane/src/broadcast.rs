//! Real-time event fan-out.
//!
//! The bus is best-effort and non-durable: a lost event is recovered by
//! consumers polling the read endpoints. Emission happens after the HTTP
//! response is sent and never affects the caller.

use async_trait::async_trait;
use serde::Serialize;
use utils::telemetry::BroadcastMetrics;

use dialplane_types::CallEvent;

#[async_trait]
pub trait EventSink: Send + Sync {
    async fn emit(&self, event: CallEvent);
}

/// Drops everything. The default for tests and for deployments without a
/// bus endpoint configured.
#[derive(Default, Clone)]
pub struct NoopEventSink;

#[async_trait]
impl EventSink for NoopEventSink {
    async fn emit(&self, _event: CallEvent) {}
}

/// Pushes events to a hosted bus over HTTP, one channel per tenant.
pub struct HttpEventSink {
    client: reqwest::Client,
    endpoint: String,
    metrics: BroadcastMetrics,
}

#[derive(Serialize)]
struct PushEnvelope<'a> {
    channel: String,
    topic: &'static str,
    payload: &'a CallEvent,
}

impl HttpEventSink {
    pub fn new(endpoint: String, metrics: BroadcastMetrics) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(5))
            .build()
            .expect("reqwest client");
        Self {
            client,
            endpoint,
            metrics,
        }
    }
}

#[async_trait]
impl EventSink for HttpEventSink {
    async fn emit(&self, event: CallEvent) {
        let envelope = PushEnvelope {
            channel: format!("tenant:{}", event.tenant_id),
            topic: event.kind.topic(),
            payload: &event,
        };

        match self
            .client
            .post(&self.endpoint)
            .json(&envelope)
            .send()
            .await
        {
            Ok(response) if response.status().is_success() => {
                self.metrics.increment_events();
            }
            Ok(response) => {
                self.metrics.increment_total_errors();
                tracing::warn!(
                    status = response.status().as_u16(),
                    tenant_id = %event.tenant_id,
                    "broadcast push rejected"
                );
            }
            Err(err) => {
                self.metrics.increment_total_errors();
                tracing::warn!(error = %err, tenant_id = %event.tenant_id, "broadcast push failed");
            }
        }
    }
}

/// Records events in memory so tests can assert on fan-out.
#[cfg(any(test, feature = "test-utils"))]
#[derive(Default, Clone)]
pub struct RecordingEventSink {
    events: std::sync::Arc<std::sync::Mutex<Vec<CallEvent>>>,
}

#[cfg(any(test, feature = "test-utils"))]
impl RecordingEventSink {
    pub fn events(&self) -> Vec<CallEvent> {
        self.events.lock().unwrap().clone()
    }
}

#[cfg(any(test, feature = "test-utils"))]
#[async_trait]
impl EventSink for RecordingEventSink {
    async fn emit(&self, event: CallEvent) {
        self.events.lock().unwrap().push(event);
    }
}
