use clap::Parser;
use serde::{Deserialize, Deserializer, Serialize};
use std::path::PathBuf;

/// Env vars hold lists as comma-separated strings; cli args arrive as real
/// sequences. Accept both.
fn deserialize_vec_string<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        Many(Vec<String>),
        One(String),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::Many(values) => values,
        OneOrMany::One(value) => value
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
    })
}

/// This struct is used for both args and environment variables
/// the basic idea is that every env var can be overriden by a cli arg
/// and these override the config file
/// env vars follow the pattern of DIALPLANE_{UPPERCASE_ARG_NAME}
#[derive(Debug, Parser, Serialize, Deserialize, Default, Clone)]
#[command(version, about, long_about = None)]
#[serde(default)]
pub struct CliArgs {
    /// The home directory of the application, where the dialplane.toml
    /// configuration file is stored. If not provided here or in an env var,
    /// a series of default directories will be tried
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub home: Option<PathBuf>,

    /// The path to an optional dotenv file to try and load
    /// if not set, will be the current working directory's .env
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dotenv: Option<PathBuf>,

    /// The port to bind the server to.
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u32>,

    /// The host to bind the server to
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,

    /// Log level in the format of comma-separated tracing directives.
    #[arg(long, value_delimiter = ',')]
    #[serde(skip_serializing_if = "Vec::is_empty")]
    #[serde(deserialize_with = "deserialize_vec_string")]
    pub log_level: Vec<String>,

    /// The allowed cors origins
    #[arg(long, value_delimiter = ',')]
    #[serde(skip_serializing_if = "Vec::is_empty")]
    #[serde(deserialize_with = "deserialize_vec_string")]
    pub cors_allowed_origins: Vec<String>,

    /// Bearer secret required by the scheduler tick endpoint
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cron_secret: Option<String>,

    /// How many due jobs one scheduler tick may lease
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheduler_batch_size: Option<usize>,

    /// OTLP collector endpoint; when unset, console logging only
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tracing_collector: Option<String>,

    /// Endpoint the broadcast sink pushes events to; when unset, events are
    /// dropped (no-op sink)
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub broadcast_endpoint: Option<String>,
}

impl CliArgs {
    pub const ENV_VAR_PREFIX: &'static str = "DIALPLANE";
}
