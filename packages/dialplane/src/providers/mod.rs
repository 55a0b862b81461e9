pub mod provider_a;
pub mod provider_b;
pub mod provider_c;

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

use dialplane_types::{CallSnapshot, Credential, Provider, ProviderEvent, Timestamp};

use crate::config::ProviderEndpoints;

/// Per-call deadline for every outbound provider request.
pub const PROVIDER_CALL_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("{provider} request timed out")]
    Timeout { provider: Provider },

    #[error("{provider} transport error: {source}")]
    Transport {
        provider: Provider,
        source: reqwest::Error,
    },

    #[error("{provider} returned {status}: {body}")]
    Upstream {
        provider: Provider,
        status: u16,
        body: String,
    },

    #[error("{provider} call {external_id} not found")]
    NotFound {
        provider: Provider,
        external_id: String,
    },

    #[error("unexpected {provider} response shape: {detail}")]
    Decode { provider: Provider, detail: String },
}

impl ProviderError {
    /// Network failures, timeouts, 5xx, and 429 are worth retrying; any
    /// other 4xx is a fact about the request and is not.
    pub fn is_retryable(&self) -> bool {
        match self {
            ProviderError::Timeout { .. } | ProviderError::Transport { .. } => true,
            ProviderError::Upstream { status, .. } => *status == 429 || *status >= 500,
            ProviderError::NotFound { .. } | ProviderError::Decode { .. } => false,
        }
    }

    pub(crate) fn from_response(provider: Provider, status: u16, body: String) -> Self {
        ProviderError::Upstream {
            provider,
            status,
            body,
        }
    }
}

#[derive(Error, Debug)]
pub enum WebhookParseError {
    #[error("{provider} webhook body is not valid json: {source}")]
    Json {
        provider: Provider,
        #[source]
        source: serde_json::Error,
    },

    #[error("{provider} webhook missing field {field}")]
    MissingField {
        provider: Provider,
        field: &'static str,
    },

    #[error("{provider} webhook event type {kind:?} is not one we handle")]
    UnknownEventType { provider: Provider, kind: String },
}

/// Everything needed to start an outbound call, provider-agnostic.
#[derive(Debug, Clone)]
pub struct InitiateRequest {
    pub provider: Provider,
    pub key: Credential,
    pub agent_external_id: String,
    pub to_number: String,
    pub from_number: Option<String>,
    /// Experiment variant override; replaces the agent's default prompt.
    pub prompt_override: Option<String>,
    pub metadata: Value,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitiatedCall {
    pub external_id: String,
}

/// Short-lived token handed to the public web widget.
#[derive(Debug, Clone)]
pub struct WebSession {
    pub token: Credential,
    pub expires_at: Timestamp,
}

/// One interface over the three voice providers. Implementations translate
/// to each provider's wire format and never touch the store.
#[async_trait]
pub trait ProviderApi: Send + Sync {
    async fn initiate(&self, request: InitiateRequest) -> Result<InitiatedCall, ProviderError>;

    async fn end_call(
        &self,
        provider: Provider,
        key: &Credential,
        external_id: &str,
    ) -> Result<(), ProviderError>;

    async fn fetch_call(
        &self,
        provider: Provider,
        key: &Credential,
        external_id: &str,
    ) -> Result<Option<CallSnapshot>, ProviderError>;

    /// Ongoing calls across the given agents. Providers differ in how much
    /// they can filter server-side; see the per-provider modules.
    async fn list_active(
        &self,
        provider: Provider,
        key: &Credential,
        agent_external_ids: &[String],
    ) -> Result<Vec<CallSnapshot>, ProviderError>;

    async fn create_web_session(
        &self,
        provider: Provider,
        key: &Credential,
        agent_external_id: &str,
    ) -> Result<WebSession, ProviderError>;
}

/// Normalize a raw webhook body into the canonical event. Pure translation;
/// signature verification happens before this is called.
pub fn parse_webhook(provider: Provider, body: &[u8]) -> Result<ProviderEvent, WebhookParseError> {
    match provider {
        Provider::ProviderA => provider_a::parse_webhook(body),
        Provider::ProviderB => provider_b::parse_webhook(body),
        Provider::ProviderC => provider_c::parse_webhook(body),
    }
}

/// The real HTTPS adapter used in production.
pub struct HttpProviderAdapter {
    client: reqwest::Client,
    endpoints: ProviderEndpoints,
}

impl HttpProviderAdapter {
    pub fn new(endpoints: ProviderEndpoints) -> Self {
        let client = reqwest::Client::builder()
            .timeout(PROVIDER_CALL_TIMEOUT)
            .build()
            .expect("reqwest client");
        Self { client, endpoints }
    }

    fn base_url(&self, provider: Provider) -> &str {
        match provider {
            Provider::ProviderA => &self.endpoints.provider_a,
            Provider::ProviderB => &self.endpoints.provider_b,
            Provider::ProviderC => &self.endpoints.provider_c,
        }
    }
}

#[async_trait]
impl ProviderApi for HttpProviderAdapter {
    async fn initiate(&self, request: InitiateRequest) -> Result<InitiatedCall, ProviderError> {
        let base = self.base_url(request.provider);
        match request.provider {
            Provider::ProviderA => provider_a::initiate(&self.client, base, request).await,
            Provider::ProviderB => provider_b::initiate(&self.client, base, request).await,
            Provider::ProviderC => provider_c::initiate(&self.client, base, request).await,
        }
    }

    async fn end_call(
        &self,
        provider: Provider,
        key: &Credential,
        external_id: &str,
    ) -> Result<(), ProviderError> {
        let base = self.base_url(provider);
        match provider {
            Provider::ProviderA => provider_a::end_call(&self.client, base, key, external_id).await,
            Provider::ProviderB => provider_b::end_call(&self.client, base, key, external_id).await,
            Provider::ProviderC => provider_c::end_call(&self.client, base, key, external_id).await,
        }
    }

    async fn fetch_call(
        &self,
        provider: Provider,
        key: &Credential,
        external_id: &str,
    ) -> Result<Option<CallSnapshot>, ProviderError> {
        let base = self.base_url(provider);
        match provider {
            Provider::ProviderA => {
                provider_a::fetch_call(&self.client, base, key, external_id).await
            }
            Provider::ProviderB => {
                provider_b::fetch_call(&self.client, base, key, external_id).await
            }
            Provider::ProviderC => {
                provider_c::fetch_call(&self.client, base, key, external_id).await
            }
        }
    }

    async fn list_active(
        &self,
        provider: Provider,
        key: &Credential,
        agent_external_ids: &[String],
    ) -> Result<Vec<CallSnapshot>, ProviderError> {
        let base = self.base_url(provider);
        match provider {
            Provider::ProviderA => {
                provider_a::list_active(&self.client, base, key, agent_external_ids).await
            }
            Provider::ProviderB => {
                provider_b::list_active(&self.client, base, key, agent_external_ids).await
            }
            Provider::ProviderC => {
                provider_c::list_active(&self.client, base, key, agent_external_ids).await
            }
        }
    }

    async fn create_web_session(
        &self,
        provider: Provider,
        key: &Credential,
        agent_external_id: &str,
    ) -> Result<WebSession, ProviderError> {
        let base = self.base_url(provider);
        match provider {
            Provider::ProviderA => {
                provider_a::create_web_session(&self.client, base, key, agent_external_id).await
            }
            Provider::ProviderB => {
                provider_b::create_web_session(&self.client, base, key, agent_external_id).await
            }
            Provider::ProviderC => {
                provider_c::create_web_session(&self.client, base, key, agent_external_id).await
            }
        }
    }
}

pub(crate) async fn check_status(
    provider: Provider,
    response: reqwest::Response,
) -> Result<reqwest::Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let code = status.as_u16();
    let body = response.text().await.unwrap_or_default();
    Err(ProviderError::from_response(provider, code, body))
}

pub(crate) fn transport_error(provider: Provider, err: reqwest::Error) -> ProviderError {
    if err.is_timeout() {
        ProviderError::Timeout { provider }
    } else {
        ProviderError::Transport {
            provider,
            source: err,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification() {
        let retryable = ProviderError::Upstream {
            provider: Provider::ProviderA,
            status: 503,
            body: String::new(),
        };
        assert!(retryable.is_retryable());

        let rate_limited = ProviderError::Upstream {
            provider: Provider::ProviderA,
            status: 429,
            body: String::new(),
        };
        assert!(rate_limited.is_retryable());

        let fatal = ProviderError::Upstream {
            provider: Provider::ProviderA,
            status: 400,
            body: String::new(),
        };
        assert!(!fatal.is_retryable());

        let timeout = ProviderError::Timeout {
            provider: Provider::ProviderB,
        };
        assert!(timeout.is_retryable());
    }
}
