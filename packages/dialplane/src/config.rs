use anyhow::{bail, Context, Result};
use dialplane_types::Credential;
use figment::{providers::Format, Figment};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::args::CliArgs;

/// Base API endpoints for the three voice providers. Overridable so tests
/// and staging point somewhere else.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ProviderEndpoints {
    pub provider_a: String,
    pub provider_b: String,
    pub provider_c: String,
}

impl Default for ProviderEndpoints {
    fn default() -> Self {
        Self {
            provider_a: "https://api.provider-a.com/v1".to_string(),
            provider_b: "https://api.provider-b.ai/v2".to_string(),
            provider_c: "https://api.provider-c.io/v1".to_string(),
        }
    }
}

/// Base endpoints for the CRM/calendar/booking integrations the workflow
/// executor talks to. Overridable for tests and staging.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct IntegrationEndpoints {
    pub crm_a_api: String,
    pub crm_b_api: String,
    pub crm_b_token: String,
    pub calendar_api: String,
    pub calendar_token: String,
    pub booking_api: String,
}

impl Default for IntegrationEndpoints {
    fn default() -> Self {
        Self {
            crm_a_api: "https://rest.crm-a.io/v1".to_string(),
            crm_b_api: "https://api.hubapi.com".to_string(),
            crm_b_token: "https://api.hubapi.com/oauth/v1/token".to_string(),
            calendar_api: "https://api.calvendor.com/v2".to_string(),
            calendar_token: "https://oauth.calvendor.com/v2/token".to_string(),
            booking_api: "https://api.bookvendor.com/v1".to_string(),
        }
    }
}

/// The fully parsed and validated config struct we use in the application
/// this is built up from the ConfigBuilder which can load from multiple
/// sources (in order of preference):
///
/// 1. cli args
/// 2. environment variables
/// 3. config file
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    /// The port to bind the server to.
    /// Default is `8000`
    pub port: u32,
    /// The host to bind the server to
    /// Default is `localhost`
    pub host: String,
    /// The log-level to use, in the format of [tracing directives](https://docs.rs/tracing-subscriber/latest/tracing_subscriber/filter/struct.EnvFilter.html#directives).
    /// Default is `["info"]`
    pub log_level: Vec<String>,
    /// The allowed cors origins
    /// Default is empty
    pub cors_allowed_origins: Vec<String>,

    /// Bearer secret for `POST /cron/process-scheduled`. The endpoint
    /// answers 503 while this is unset.
    pub cron_secret: Option<Credential>,
    /// Jobs leased per scheduler tick; sized to finish inside a 60 second
    /// driver budget.
    pub scheduler_batch_size: usize,

    pub provider_endpoints: ProviderEndpoints,
    pub integration_endpoints: IntegrationEndpoints,
    /// Provider B signs its webhooks with one provider-wide secret.
    pub provider_b_webhook_secret: Option<Credential>,
    /// Provider C signs its webhooks with one provider-wide secret.
    pub provider_c_webhook_secret: Option<Credential>,

    /// OAuth app credentials used to refresh CRM B portal tokens.
    pub hubspot_client_id: Option<String>,
    pub hubspot_client_secret: Option<Credential>,

    /// Enables the AI analysis path; absent means analysis is disabled.
    pub anthropic_api_key: Option<Credential>,

    /// Public dashboard URL, used for return-url whitelisting in widget
    /// session responses.
    pub app_url: Option<String>,

    /// Where the push event sink posts tenant events; unset means no-op.
    pub broadcast_endpoint: Option<String>,

    /// OTLP collector; unset means console-only tracing.
    pub tracing_collector: Option<String>,
}

/// Default values for the config struct
/// these are only used to fill in holes after all the parsing and loading is done
impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8000,
            host: "localhost".to_string(),
            log_level: vec!["info".to_string()],
            cors_allowed_origins: Vec::new(),
            cron_secret: None,
            scheduler_batch_size: 50,
            provider_endpoints: ProviderEndpoints::default(),
            integration_endpoints: IntegrationEndpoints::default(),
            provider_b_webhook_secret: None,
            provider_c_webhook_secret: None,
            hubspot_client_id: None,
            hubspot_client_secret: None,
            anthropic_api_key: None,
            app_url: None,
            broadcast_endpoint: None,
            tracing_collector: None,
        }
    }
}

impl Config {
    pub fn tracing_env_filter(&self) -> Result<tracing_subscriber::EnvFilter> {
        let mut filter = tracing_subscriber::EnvFilter::default();
        for directive in &self.log_level {
            filter = filter.add_directive(directive.trim().parse()?);
        }
        Ok(filter)
    }
}

pub struct ConfigBuilder {
    pub cli_args: CliArgs,
}

impl ConfigBuilder {
    pub const FILENAME: &'static str = "dialplane.toml";
    pub const DIRNAME: &'static str = "dialplane";
    pub const HIDDEN_DIRNAME: &'static str = ".dialplane";

    pub fn new(cli_args: CliArgs) -> Self {
        Self { cli_args }
    }

    // merges the cli and env vars
    // which has optional values, by default None (or empty)
    pub fn merge_cli_env_args(&self) -> Result<CliArgs> {
        let cli_args: CliArgs = Figment::new()
            .merge(figment::providers::Env::prefixed(&format!(
                "{}_",
                CliArgs::ENV_VAR_PREFIX
            )))
            .merge(figment::providers::Serialized::defaults(&self.cli_args))
            .extract()?;

        Ok(cli_args)
    }

    pub fn build(self) -> Result<Config> {
        // try to load dotenv first, since it may affect env vars for filepaths
        let dotenv_path = self
            .cli_args
            .dotenv
            .clone()
            .unwrap_or(std::env::current_dir()?.join(".env"));

        if dotenv_path.exists() {
            if let Err(e) = dotenvy::from_path(dotenv_path) {
                bail!("Error loading dotenv file: {}", e);
            }
        }

        let cli_env_args = self.merge_cli_env_args()?;

        // our final config, which can have more complex types with easier
        // TOML-like syntax and fills in defaults for required values at the end
        let mut config: Config = Figment::new()
            .merge(figment::providers::Toml::file(Self::filepath(
                &cli_env_args,
            )?))
            .merge(figment::providers::Serialized::defaults(cli_env_args))
            .join(figment::providers::Serialized::defaults(Config::default()))
            .extract()?;

        // a handful of inputs are conventionally un-prefixed in deploy
        // environments; honor them as fallbacks when nothing else set them
        if config.cron_secret.is_none() {
            config.cron_secret = env_credential("CRON_SECRET");
        }
        if config.hubspot_client_id.is_none() {
            config.hubspot_client_id = std::env::var("HUBSPOT_CLIENT_ID").ok();
        }
        if config.hubspot_client_secret.is_none() {
            config.hubspot_client_secret = env_credential("HUBSPOT_CLIENT_SECRET");
        }
        if config.anthropic_api_key.is_none() {
            config.anthropic_api_key = env_credential("ANTHROPIC_API_KEY");
        }
        if config.app_url.is_none() {
            config.app_url = std::env::var("NEXT_PUBLIC_APP_URL").ok();
        }

        Ok(config)
    }

    /// finds the filepath through a series of fallbacks
    /// the argument is internally derived cli + env args
    pub fn filepath(cli_env_args: &CliArgs) -> Result<PathBuf> {
        let filepaths_to_try = Self::filepaths_to_try(cli_env_args);

        filepaths_to_try
            .iter()
            .find(|filename| filename.exists())
            .with_context(|| {
                format!(
                    "No config file found, try creating one of these: {:?}",
                    filepaths_to_try
                )
            })
            .cloned()
    }

    /// provides the list of filepaths to try for the config file
    pub fn filepaths_to_try(cli_env_args: &CliArgs) -> Vec<PathBuf> {
        // the paths returned will be tried in order of pushing
        let mut dirs_to_try = Vec::new();

        // explicit arg passed to the cli, e.g. --home /foo, or env var
        // DIALPLANE_HOME="/foo"; used as the direct home directory
        if let Some(dir) = cli_env_args.home.clone() {
            let expanded = shellexpand::tilde(&dir.to_string_lossy()).to_string();
            dirs_to_try.push(PathBuf::from(expanded));
        }

        // next, the current working directory, wherever the command is run from
        if let Ok(dir) = std::env::current_dir() {
            dirs_to_try.push(dir);
        }

        // the user's home directory directly, under a hidden subdir:
        // ~/.dialplane/dialplane.toml
        if let Some(dir) = dirs::home_dir().map(|dir| dir.join(Self::HIDDEN_DIRNAME)) {
            dirs_to_try.push(dir);
        }

        // the system config directory, e.g. ~/.config/dialplane/dialplane.toml
        if let Some(dir) = dirs::config_dir().map(|dir| dir.join(Self::DIRNAME)) {
            dirs_to_try.push(dir);
        }

        dirs_to_try
            .into_iter()
            .map(|dir| dir.join(Self::FILENAME))
            .collect()
    }
}

fn env_credential(name: &str) -> Option<Credential> {
    std::env::var(name).ok().map(Credential::new)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_holes() {
        let config = Config::default();
        assert_eq!(config.port, 8000);
        assert_eq!(config.scheduler_batch_size, 50);
        assert!(config.cron_secret.is_none());
    }

    #[test]
    fn env_filter_parses_directives() {
        let config = Config {
            log_level: vec!["info".into(), "dialplane=debug".into()],
            ..Default::default()
        };
        config.tracing_env_filter().unwrap();
    }

    #[test]
    fn filepaths_prefer_explicit_home() {
        let args = CliArgs {
            home: Some(PathBuf::from("/tmp/dialplane-test")),
            ..Default::default()
        };
        let paths = ConfigBuilder::filepaths_to_try(&args);
        assert_eq!(
            paths[0],
            PathBuf::from("/tmp/dialplane-test").join(ConfigBuilder::FILENAME)
        );
    }
}
