use std::sync::Arc;

use subtle::ConstantTimeEq;
use utils::telemetry::HttpMetrics;

use dialplane_types::Tenant;

use crate::{app::App, config::Config};

use super::error::ApiError;

#[derive(Clone)]
pub struct HttpState {
    pub config: Config,
    pub app: Arc<App>,
    pub metrics: HttpMetrics,
}

impl HttpState {
    pub fn new(config: Config, app: Arc<App>, metrics: HttpMetrics) -> Self {
        Self {
            config,
            app,
            metrics,
        }
    }

    /// Resolve the tenant behind a partner bearer (`authorization: Bearer
    /// pdy_sk_<64hex>`). The prefix finds the candidate tenant; the full key
    /// is then compared constant-time against the stored one.
    pub fn tenant_from_bearer(&self, authorization: Option<&str>) -> Result<Tenant, ApiError> {
        let token = authorization
            .and_then(|value| value.strip_prefix("Bearer "))
            .ok_or(ApiError::Unauthorized)?;

        let key = dialplane_types::PartnerApiKey::parse(token.trim())
            .map_err(|_| ApiError::Unauthorized)?;

        let tenant = self
            .app
            .store
            .tenant_by_key_prefix(key.prefix())
            .map_err(ApiError::from)?
            .ok_or(ApiError::Unauthorized)?;

        let stored = tenant
            .integrations
            .partner_api
            .as_ref()
            .ok_or(ApiError::Unauthorized)?;

        let matches: bool = stored
            .api_key
            .as_str()
            .as_bytes()
            .ct_eq(key.as_str().as_bytes())
            .into();
        if !matches {
            self.metrics.increment_auth_failures();
            return Err(ApiError::Unauthorized);
        }

        Ok(tenant)
    }
}
