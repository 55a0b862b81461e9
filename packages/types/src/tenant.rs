use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{AgentId, ClientId, Credential, PartnerApiKey, Provider, TenantId, Timestamp};

/// Per-provider API key slots. Present on tenants and, as overrides, on
/// clients.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, ToSchema)]
pub struct ProviderKeys {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_a: Option<Credential>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_b: Option<Credential>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_c: Option<Credential>,
}

impl ProviderKeys {
    pub fn get(&self, provider: Provider) -> Option<&Credential> {
        match provider {
            Provider::ProviderA => self.provider_a.as_ref(),
            Provider::ProviderB => self.provider_b.as_ref(),
            Provider::ProviderC => self.provider_c.as_ref(),
        }
    }
}

/// Time-of-day + day-of-week policy, evaluated in the lead's local zone.
/// `days_of_week` uses 0=Sun .. 6=Sat.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, ToSchema)]
pub struct CallingWindow {
    pub enabled: bool,
    pub start_hour: u8,
    pub end_hour: u8,
    pub days_of_week: Vec<u8>,
}

impl Default for CallingWindow {
    fn default() -> Self {
        // weekdays, 9am to 8pm lead-local
        Self {
            enabled: false,
            start_hour: 9,
            end_hour: 20,
            days_of_week: vec![1, 2, 3, 4, 5],
        }
    }
}

impl CallingWindow {
    pub fn allows_day(&self, weekday0_sun: u8) -> bool {
        self.days_of_week.contains(&weekday0_sun)
    }
}

/// CRM A integration: location-scoped CRM with API-key auth and a webhook
/// secret for inbound trigger verification.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, ToSchema)]
pub struct CrmAConfig {
    pub location_id: String,
    pub api_key: Credential,
    pub webhook_secret: Credential,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_agent_id: Option<AgentId>,
}

/// CRM B integration: portal-scoped CRM with OAuth tokens. Refresh tokens
/// are single-use; refresh goes through the single-flight guard and the
/// rotated tokens are persisted back here before any action proceeds.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, ToSchema)]
pub struct CrmBConfig {
    pub portal_id: String,
    pub access_token: Credential,
    pub refresh_token: Credential,
    pub token_expires_at: Timestamp,
    pub webhook_secret: Credential,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_agent_id: Option<AgentId>,
}

/// Calendar vendor integration (OAuth, single-use refresh tokens as well).
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, ToSchema)]
pub struct CalendarConfig {
    pub calendar_id: String,
    pub access_token: Credential,
    pub refresh_token: Credential,
    pub token_expires_at: Timestamp,
}

/// Scheduling vendor integration (API-key auth, hosted booking links).
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, ToSchema)]
pub struct BookingConfig {
    pub api_key: Credential,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization: Option<String>,
}

/// Outbound chat-notification webhook (ops channel style).
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, ToSchema)]
pub struct ChatWebhookConfig {
    pub url: String,
}

/// Partner trigger-API access for this tenant.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, ToSchema)]
pub struct PartnerApiConfig {
    pub api_key: PartnerApiKey,
}

/// Explicit per-integration records inside the tenant aggregate. Workflow
/// execution receives a resolved snapshot of these, never a store handle.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, ToSchema)]
pub struct IntegrationConfigs {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crm_a: Option<CrmAConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crm_b: Option<CrmBConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calendar: Option<CalendarConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub booking: Option<BookingConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_webhook: Option<ChatWebhookConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partner_api: Option<PartnerApiConfig>,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Trialing,
    Active,
    PastDue,
    Cancelled,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, ToSchema)]
pub struct StripeConnectSettings {
    pub account_id: String,
    pub charges_enabled: bool,
}

/// The top-level account. Owns every other entity transitively; no entity
/// is shared across tenants.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, ToSchema)]
pub struct Tenant {
    pub id: TenantId,
    pub name: String,
    pub provider_keys: ProviderKeys,
    pub calling_window: CallingWindow,
    #[serde(default)]
    pub integrations: IntegrationConfigs,
    pub subscription: SubscriptionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stripe_connect: Option<StripeConnectSettings>,
    pub created_at: Timestamp,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, ToSchema)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum BillingType {
    Subscription,
    PerMinute { rate_cents: u32 },
    OneShot,
}

/// Per-client permissions which override the tenant defaults.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, ToSchema)]
pub struct ClientPermissions {
    pub allow_outbound: bool,
    pub allow_widget: bool,
    pub ai_analysis_enabled: bool,
}

impl Default for ClientPermissions {
    fn default() -> Self {
        Self {
            allow_outbound: true,
            allow_widget: true,
            ai_analysis_enabled: false,
        }
    }
}

/// A tenant's customer. Owned by exactly one tenant.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, ToSchema)]
pub struct Client {
    pub id: ClientId,
    pub tenant_id: TenantId,
    pub name: String,
    /// Per-provider key overrides; empty slots fall back to the tenant key.
    #[serde(default)]
    pub provider_key_overrides: ProviderKeys,
    #[serde(default)]
    pub permissions: ClientPermissions,
    pub billing: BillingType,
    pub created_at: Timestamp,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_key_slots() {
        let keys = ProviderKeys {
            provider_a: Some(Credential::new("key-a".into())),
            provider_b: None,
            provider_c: None,
        };
        assert!(keys.get(Provider::ProviderA).is_some());
        assert!(keys.get(Provider::ProviderB).is_none());
    }

    #[test]
    fn default_window_is_disabled_weekdays() {
        let w = CallingWindow::default();
        assert!(!w.enabled);
        assert!(w.allows_day(1));
        assert!(!w.allows_day(0));
        assert!(!w.allows_day(6));
    }
}
