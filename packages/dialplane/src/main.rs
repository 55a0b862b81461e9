use std::sync::Arc;

use clap::Parser;
use opentelemetry::global;

use dialplane::{app::App, args::CliArgs, config::ConfigBuilder, run_server};
use utils::{context::AppContext, telemetry};

fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();
    let config = ConfigBuilder::new(args).build()?;

    let filters = config.tracing_env_filter()?;
    let _tracer_provider = match &config.tracing_collector {
        Some(collector) => {
            let provider = telemetry::setup_tracing(collector, "dialplane", filters);
            telemetry::setup_metrics(collector, "dialplane");
            Some(provider)
        }
        None => {
            telemetry::init_tracing(filters);
            None
        }
    };

    let metrics = telemetry::HttpMetrics::init(&global::meter("dialplane"));

    let ctx = AppContext::new();
    let app = Arc::new(App::new(config.clone())?);

    run_server(ctx, config, app, metrics)
}
