use opentelemetry::{global, trace::TracerProvider as _, KeyValue};
use opentelemetry_otlp::{Protocol, SpanExporter, WithExportConfig};
use opentelemetry_sdk::{
    metrics::SdkMeterProvider,
    resource::Resource,
    trace::{self, Sampler, SdkTracerProvider},
};
use tracing_subscriber::layer::SubscriberExt;

/// Console-only tracing, used when no collector is configured.
pub fn init_tracing(filters: tracing_subscriber::EnvFilter) {
    let subscriber = tracing_subscriber::Registry::default()
        .with(filters)
        .with(tracing_subscriber::fmt::layer());

    tracing::subscriber::set_global_default(subscriber)
        .expect("Failed to set global default subscriber");
}

pub fn setup_tracing(
    collector: &str,
    service_name: &str,
    filters: tracing_subscriber::EnvFilter,
) -> SdkTracerProvider {
    let endpoint = format!("{}/v1/traces", collector);
    let exporter = SpanExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()
        .expect("Failed to build OTLP exporter");

    let batch_processor = trace::BatchSpanProcessor::builder(exporter).build();

    let provider = SdkTracerProvider::builder()
        .with_span_processor(batch_processor)
        .with_sampler(Sampler::AlwaysOn)
        .with_resource(
            Resource::builder()
                .with_service_name(service_name.to_owned())
                .build(),
        )
        .build();
    global::set_tracer_provider(provider.clone());
    let tracer = provider.tracer(format!("{}-tracer", service_name));
    let telemetry = tracing_opentelemetry::layer().with_tracer(tracer);

    let subscriber = tracing_subscriber::Registry::default()
        .with(filters)
        .with(tracing_subscriber::fmt::layer()) // console logging layer
        .with(telemetry);

    tracing::subscriber::set_global_default(subscriber)
        .expect("Failed to set global default subscriber");

    tracing::info!("OTLP tracing enabled");
    provider
}

pub fn setup_metrics(collector: &str, service_name: &str) -> SdkMeterProvider {
    let endpoint = format!("{}/api/v1/otlp/v1/metrics", collector);

    let exporter = opentelemetry_otlp::MetricExporter::builder()
        .with_http()
        .with_protocol(Protocol::HttpBinary)
        .with_endpoint(endpoint)
        .build()
        .expect("Failed to build OTLP exporter!");

    let meter_provider = SdkMeterProvider::builder()
        .with_resource(
            Resource::builder()
                .with_service_name(service_name.to_owned())
                .build(),
        )
        .with_periodic_exporter(exporter)
        .build();

    global::set_meter_provider(meter_provider.clone());

    tracing::info!("Metrics enabled and exporting to {}", collector);

    meter_provider
}

use opentelemetry::metrics::{Counter, Histogram, Meter};

pub struct Metrics {
    pub http: HttpMetrics,
    pub engine: EngineMetrics,
}

impl Metrics {
    pub fn init(meter: &Meter) -> Self {
        Self {
            http: HttpMetrics::init(meter),
            engine: EngineMetrics::init(meter),
        }
    }
}

#[derive(Clone, Debug)]
pub struct HttpMetrics {
    pub requests_total: Counter<u64>,
    pub auth_failures: Counter<u64>,
}

impl HttpMetrics {
    pub const LABEL: &'static str = "http";

    pub fn init(meter: &Meter) -> Self {
        HttpMetrics {
            requests_total: meter
                .u64_counter(format!("{}_requests_total", Self::LABEL))
                .with_description("Total inbound http requests")
                .build(),
            auth_failures: meter
                .u64_counter(format!("{}_auth_failures", Self::LABEL))
                .with_description("Requests rejected for bad bearer or signature")
                .build(),
        }
    }

    pub fn increment_requests(&self, route: &str) {
        self.requests_total
            .add(1, &[KeyValue::new("route", route.to_owned())]);
    }

    pub fn increment_auth_failures(&self) {
        self.auth_failures.add(1, &[]);
    }
}

#[derive(Clone, Debug)]
pub struct EngineMetrics {
    pub ingress: IngressMetrics,
    pub scheduler: SchedulerMetrics,
    pub webhook: WebhookMetrics,
    pub workflow: WorkflowMetrics,
    pub broadcast: BroadcastMetrics,
}

impl EngineMetrics {
    pub fn init(meter: &Meter) -> Self {
        Self {
            ingress: IngressMetrics::init(meter),
            scheduler: SchedulerMetrics::init(meter),
            webhook: WebhookMetrics::init(meter),
            workflow: WorkflowMetrics::init(meter),
            broadcast: BroadcastMetrics::init(meter),
        }
    }
}

#[derive(Clone, Debug)]
pub struct IngressMetrics {
    pub triggers_total: Counter<u64>,
    pub total_errors: Counter<u64>,
}

impl IngressMetrics {
    pub const LABEL: &'static str = "ingress";

    pub fn init(meter: &Meter) -> Self {
        Self {
            triggers_total: meter
                .u64_counter(format!("{}_triggers_total", Self::LABEL))
                .with_description("Inbound triggers by source and outcome")
                .build(),
            total_errors: meter
                .u64_counter(format!("{}_total_errors", Self::LABEL))
                .with_description("Total number of errors encountered")
                .build(),
        }
    }

    pub fn increment_triggers(&self, source: &str, outcome: &str) {
        self.triggers_total.add(
            1,
            &[
                KeyValue::new("source", source.to_owned()),
                KeyValue::new("outcome", outcome.to_owned()),
            ],
        );
    }

    pub fn increment_total_errors(&self) {
        self.total_errors.add(1, &[]);
    }
}

#[derive(Clone, Debug)]
pub struct SchedulerMetrics {
    pub jobs_processed: Counter<u64>,
    pub dispatch_seconds: Histogram<f64>,
    pub total_errors: Counter<u64>,
}

impl SchedulerMetrics {
    pub const LABEL: &'static str = "scheduler";

    pub fn init(meter: &Meter) -> Self {
        Self {
            jobs_processed: meter
                .u64_counter(format!("{}_jobs_processed", Self::LABEL))
                .with_description("Scheduled jobs handled, by outcome")
                .build(),
            dispatch_seconds: meter
                .f64_histogram(format!("{}_dispatch_seconds", Self::LABEL))
                .with_description("Time from lease to dispatch result")
                .build(),
            total_errors: meter
                .u64_counter(format!("{}_total_errors", Self::LABEL))
                .with_description("Total number of errors encountered")
                .build(),
        }
    }

    pub fn increment_jobs(&self, outcome: &str) {
        self.jobs_processed
            .add(1, &[KeyValue::new("outcome", outcome.to_owned())]);
    }

    pub fn record_dispatch_seconds(&self, seconds: f64) {
        self.dispatch_seconds.record(seconds, &[]);
    }

    pub fn increment_total_errors(&self) {
        self.total_errors.add(1, &[]);
    }
}

#[derive(Clone, Debug)]
pub struct WebhookMetrics {
    pub events_total: Counter<u64>,
    pub total_errors: Counter<u64>,
}

impl WebhookMetrics {
    pub const LABEL: &'static str = "webhook";

    pub fn init(meter: &Meter) -> Self {
        Self {
            events_total: meter
                .u64_counter(format!("{}_events_total", Self::LABEL))
                .with_description("Provider webhook events by provider and kind")
                .build(),
            total_errors: meter
                .u64_counter(format!("{}_total_errors", Self::LABEL))
                .with_description("Total number of errors encountered")
                .build(),
        }
    }

    pub fn increment_events(&self, provider: &str, kind: &str) {
        self.events_total.add(
            1,
            &[
                KeyValue::new("provider", provider.to_owned()),
                KeyValue::new("kind", kind.to_owned()),
            ],
        );
    }

    pub fn increment_total_errors(&self) {
        self.total_errors.add(1, &[]);
    }
}

#[derive(Clone, Debug)]
pub struct WorkflowMetrics {
    pub executions_total: Counter<u64>,
    pub actions_total: Counter<u64>,
    pub execution_seconds: Histogram<f64>,
}

impl WorkflowMetrics {
    pub const LABEL: &'static str = "workflow";

    pub fn init(meter: &Meter) -> Self {
        Self {
            executions_total: meter
                .u64_counter(format!("{}_executions_total", Self::LABEL))
                .with_description("Workflow executions by aggregate status")
                .build(),
            actions_total: meter
                .u64_counter(format!("{}_actions_total", Self::LABEL))
                .with_description("Workflow actions by kind and outcome")
                .build(),
            execution_seconds: meter
                .f64_histogram(format!("{}_execution_seconds", Self::LABEL))
                .with_description("Wall time of one workflow execution")
                .build(),
        }
    }

    pub fn increment_executions(&self, status: &str) {
        self.executions_total
            .add(1, &[KeyValue::new("status", status.to_owned())]);
    }

    pub fn increment_actions(&self, kind: &str, outcome: &str) {
        self.actions_total.add(
            1,
            &[
                KeyValue::new("kind", kind.to_owned()),
                KeyValue::new("outcome", outcome.to_owned()),
            ],
        );
    }

    pub fn record_execution_seconds(&self, seconds: f64) {
        self.execution_seconds.record(seconds, &[]);
    }
}

#[derive(Clone, Debug)]
pub struct BroadcastMetrics {
    pub events_emitted: Counter<u64>,
    pub total_errors: Counter<u64>,
}

impl BroadcastMetrics {
    pub const LABEL: &'static str = "broadcast";

    pub fn init(meter: &Meter) -> Self {
        Self {
            events_emitted: meter
                .u64_counter(format!("{}_events_emitted", Self::LABEL))
                .with_description("Events pushed to the bus")
                .build(),
            total_errors: meter
                .u64_counter(format!("{}_total_errors", Self::LABEL))
                .with_description("Total number of errors encountered")
                .build(),
        }
    }

    pub fn increment_events(&self) {
        self.events_emitted.add(1, &[]);
    }

    pub fn increment_total_errors(&self) {
        self.total_errors.add(1, &[]);
    }
}
