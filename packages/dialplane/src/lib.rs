#![allow(clippy::result_large_err)]
#![allow(clippy::uninlined_format_args)]

pub mod analysis;
pub mod app;
pub mod args;
pub mod broadcast;
pub mod config;
pub mod http;
pub mod ingress;
pub mod keys;
pub mod providers;
pub mod scheduler;
pub mod signature;
pub mod store;
pub mod timezone;
pub mod webhooks;
pub mod workflow;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

use std::sync::Arc;

use app::App;
use config::Config;
use utils::{context::AppContext, telemetry::HttpMetrics};

/// Entry point to start up the whole server
/// Called from main and end-to-end tests
pub fn run_server(
    ctx: AppContext,
    config: Config,
    app: Arc<App>,
    metrics: HttpMetrics,
) -> anyhow::Result<()> {
    let _ = ctrlc::set_handler({
        let ctx = ctx.clone();
        move || {
            ctx.kill();
        }
    });

    http::server::start(ctx, config, app, metrics)
}
