//! Resolved integration context for one workflow execution.
//!
//! Built once at the start of execution from the tenant aggregate; actions
//! receive this snapshot instead of reaching back into the store. OAuth
//! integrations (CRM B, calendar vendor) hold single-use refresh tokens, so
//! refresh runs under the per-`(tenant, integration)` single-flight guard
//! and persists the rotated tokens before the guard releases.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use serde_json::json;

use dialplane_types::{
    BookingConfig, ChatWebhookConfig, CrmAConfig, Credential, Tenant, TenantId, Timestamp,
};

use crate::app::App;

/// Tokens are refreshed when they expire within this margin, so an action
/// never starts with a token about to lapse mid-request.
const REFRESH_MARGIN_SECS: i64 = 60;

#[derive(Clone, Debug)]
pub struct OAuthAccess {
    pub access_token: Credential,
    /// Portal / calendar id, whatever scopes the API calls.
    pub scope_id: String,
}

/// Everything an action may talk to, resolved and refreshed up front.
/// Slots are `None` when the tenant has not connected that integration.
#[derive(Default, Clone)]
pub struct IntegrationContext {
    pub crm_a: Option<CrmAConfig>,
    pub crm_b: Option<OAuthAccess>,
    pub calendar: Option<OAuthAccess>,
    pub booking: Option<BookingConfig>,
    pub chat_webhook: Option<ChatWebhookConfig>,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    expires_in: i64,
}

impl IntegrationContext {
    /// Resolve the tenant's integrations. Refresh failures degrade the
    /// matching slot to `None`; the actions that needed it will record
    /// failures while the rest of the workflow proceeds.
    pub async fn resolve(app: &Arc<App>, tenant_id: &TenantId) -> Self {
        let tenant = match app.store.tenant(tenant_id) {
            Ok(Some(tenant)) => tenant,
            Ok(None) => return Self::default(),
            Err(err) => {
                tracing::error!(tenant_id = %tenant_id, error = %err, "tenant read failed");
                return Self::default();
            }
        };

        let crm_b = ensure_crm_b_token(app, &tenant).await;
        let calendar = ensure_calendar_token(app, &tenant).await;

        Self {
            crm_a: tenant.integrations.crm_a.clone(),
            crm_b,
            calendar,
            booking: tenant.integrations.booking.clone(),
            chat_webhook: tenant.integrations.chat_webhook.clone(),
        }
    }
}

fn is_fresh(expires_at: Timestamp, now: DateTime<Utc>) -> bool {
    expires_at.as_datetime() > now + Duration::seconds(REFRESH_MARGIN_SECS)
}

async fn ensure_crm_b_token(app: &Arc<App>, tenant: &Tenant) -> Option<OAuthAccess> {
    let config = tenant.integrations.crm_b.as_ref()?;
    let now = app.clock.now();

    if is_fresh(config.token_expires_at, now) {
        return Some(OAuthAccess {
            access_token: config.access_token.clone(),
            scope_id: config.portal_id.clone(),
        });
    }

    let tenant_id = tenant.id.clone();
    let guard = app.refresh_guard.clone();
    let app = app.clone();
    guard
        .run((tenant_id.clone(), "crm_b"), || async move {
            // another waiter may have refreshed while we queued; re-read
            // before spending the single-use refresh token
            let current = match app.store.tenant(&tenant_id) {
                Ok(Some(tenant)) => tenant.integrations.crm_b.clone()?,
                _ => return None,
            };
            let now = app.clock.now();
            if is_fresh(current.token_expires_at, now) {
                return Some(OAuthAccess {
                    access_token: current.access_token.clone(),
                    scope_id: current.portal_id.clone(),
                });
            }

            let (client_id, client_secret) = match (
                app.config.hubspot_client_id.as_ref(),
                app.config.hubspot_client_secret.as_ref(),
            ) {
                (Some(id), Some(secret)) => (id.clone(), secret.clone()),
                _ => {
                    tracing::warn!(
                        tenant_id = %tenant_id,
                        "crm_b token expired but oauth app credentials are not configured"
                    );
                    return None;
                }
            };

            let response = app
                .http_client
                .post(&app.config.integration_endpoints.crm_b_token)
                .form(&[
                    ("grant_type", "refresh_token"),
                    ("client_id", client_id.as_str()),
                    ("client_secret", client_secret.as_str()),
                    ("refresh_token", current.refresh_token.as_str()),
                ])
                .send()
                .await;

            let token: TokenResponse = match response {
                Ok(response) if response.status().is_success() => {
                    match response.json().await {
                        Ok(token) => token,
                        Err(err) => {
                            tracing::error!(tenant_id = %tenant_id, error = %err, "crm_b token decode failed");
                            return None;
                        }
                    }
                }
                Ok(response) => {
                    tracing::error!(
                        tenant_id = %tenant_id,
                        status = response.status().as_u16(),
                        "crm_b token refresh rejected"
                    );
                    return None;
                }
                Err(err) => {
                    tracing::error!(tenant_id = %tenant_id, error = %err, "crm_b token refresh failed");
                    return None;
                }
            };

            let access = Credential::new(token.access_token);
            let refresh = Credential::new(token.refresh_token);
            let expires_at = Timestamp::from(now + Duration::seconds(token.expires_in));

            // persist before the guard releases, so the next waiter re-reads
            // the rotated pair instead of refreshing again
            if let Err(err) =
                app.store
                    .update_crm_b_tokens(&tenant_id, access.clone(), refresh, expires_at)
            {
                tracing::error!(tenant_id = %tenant_id, error = %err, "failed to persist crm_b tokens");
                return None;
            }

            Some(OAuthAccess {
                access_token: access,
                scope_id: current.portal_id.clone(),
            })
        })
        .await
}

async fn ensure_calendar_token(app: &Arc<App>, tenant: &Tenant) -> Option<OAuthAccess> {
    let config = tenant.integrations.calendar.as_ref()?;
    let now = app.clock.now();

    if is_fresh(config.token_expires_at, now) {
        return Some(OAuthAccess {
            access_token: config.access_token.clone(),
            scope_id: config.calendar_id.clone(),
        });
    }

    let tenant_id = tenant.id.clone();
    let guard = app.refresh_guard.clone();
    let app = app.clone();
    guard
        .run((tenant_id.clone(), "calendar"), || async move {
            let current = match app.store.tenant(&tenant_id) {
                Ok(Some(tenant)) => tenant.integrations.calendar.clone()?,
                _ => return None,
            };
            let now = app.clock.now();
            if is_fresh(current.token_expires_at, now) {
                return Some(OAuthAccess {
                    access_token: current.access_token.clone(),
                    scope_id: current.calendar_id.clone(),
                });
            }

            let response = app
                .http_client
                .post(&app.config.integration_endpoints.calendar_token)
                .json(&json!({
                    "grant_type": "refresh_token",
                    "refresh_token": current.refresh_token.as_str(),
                }))
                .send()
                .await;

            let token: TokenResponse = match response {
                Ok(response) if response.status().is_success() => match response.json().await {
                    Ok(token) => token,
                    Err(err) => {
                        tracing::error!(tenant_id = %tenant_id, error = %err, "calendar token decode failed");
                        return None;
                    }
                },
                Ok(response) => {
                    tracing::error!(
                        tenant_id = %tenant_id,
                        status = response.status().as_u16(),
                        "calendar token refresh rejected"
                    );
                    return None;
                }
                Err(err) => {
                    tracing::error!(tenant_id = %tenant_id, error = %err, "calendar token refresh failed");
                    return None;
                }
            };

            let access = Credential::new(token.access_token);
            let refresh = Credential::new(token.refresh_token);
            let expires_at = Timestamp::from(now + Duration::seconds(token.expires_in));

            if let Err(err) =
                app.store
                    .update_calendar_tokens(&tenant_id, access.clone(), refresh, expires_at)
            {
                tracing::error!(tenant_id = %tenant_id, error = %err, "failed to persist calendar tokens");
                return None;
            }

            Some(OAuthAccess {
                access_token: access,
                scope_id: current.calendar_id.clone(),
            })
        })
        .await
}
