//! A fully wired [`App`] on in-memory everything: pinned clock, mock
//! provider adapter, recording event sink. Fixture builders seed the
//! common tenant/agent topology the scenario tests share.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use opentelemetry::global;

use dialplane_types::{
    Agent, AgentId, BillingType, CallingWindow, Client, ClientId, ClientPermissions, CrmAConfig,
    Credential, IntegrationConfigs, PartnerApiConfig, PartnerApiKey, Phone, PhoneNumber, Provider,
    ProviderKeys, SubscriptionStatus, Tenant, TenantId, Timestamp,
};
use utils::{
    clock::FixedClock,
    rate_limit::{RateLimiter, RateLimits},
    single_flight::SingleFlight,
    telemetry::EngineMetrics,
};

use crate::{
    app::App,
    broadcast::RecordingEventSink,
    config::Config,
    store::Store,
    timezone::TimezoneOracle,
    workflow,
};

use super::mock_provider::MockProviderAdapter;

pub const TEST_PARTNER_KEY: &str =
    "pdy_sk_0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef";
pub const TEST_CRM_A_SECRET: &str = "crm-a-webhook-secret";
pub const TEST_LOCATION_ID: &str = "loc-1001";

pub struct TestApp {
    pub app: Arc<App>,
    pub clock: FixedClock,
    pub provider: MockProviderAdapter,
    pub sink: RecordingEventSink,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Self {
        let store = Store::new().expect("store");
        let clock = FixedClock::at(
            "2026-07-21T18:00:00Z".parse::<DateTime<Utc>>().unwrap(),
        );
        let provider = MockProviderAdapter::new();
        let sink = RecordingEventSink::default();
        let metrics = EngineMetrics::init(&global::meter("dialplane-tests"));
        let rate_limiter = RateLimiter::new(store.db().clone(), RateLimits::default());

        let http_client = reqwest::Client::builder()
            .timeout(workflow::ACTION_TIMEOUT)
            .build()
            .expect("reqwest client");

        let app = Arc::new(App {
            config,
            store,
            clock: Arc::new(clock.clone()),
            oracle: TimezoneOracle::new(),
            provider_api: Arc::new(provider.clone()),
            event_sink: Arc::new(sink.clone()),
            refresh_guard: SingleFlight::new(),
            rate_limiter,
            metrics,
            http_client,
        });

        Self {
            app,
            clock,
            provider,
            sink,
        }
    }

    pub fn set_now(&self, instant: &str) {
        self.clock
            .set(instant.parse::<DateTime<Utc>>().expect("rfc3339 instant"));
    }

    /// Seed the standard tenant: weekday 9-20 window, a provider A key,
    /// CRM A + partner API integrations.
    pub fn seed_tenant(&self) -> Tenant {
        let tenant = Tenant {
            id: TenantId::new("tenant-1").unwrap(),
            name: "Acme Agency".into(),
            provider_keys: ProviderKeys {
                provider_a: Some(Credential::new("tenant-key-a".into())),
                provider_b: Some(Credential::new("tenant-key-b".into())),
                provider_c: None,
            },
            calling_window: CallingWindow {
                enabled: true,
                start_hour: 9,
                end_hour: 20,
                days_of_week: vec![1, 2, 3, 4, 5],
            },
            integrations: IntegrationConfigs {
                crm_a: Some(CrmAConfig {
                    location_id: TEST_LOCATION_ID.into(),
                    api_key: Credential::new("crm-a-api-key".into()),
                    webhook_secret: Credential::new(TEST_CRM_A_SECRET.into()),
                    default_agent_id: Some(AgentId::new("agent-1").unwrap()),
                }),
                partner_api: Some(PartnerApiConfig {
                    api_key: PartnerApiKey::parse(TEST_PARTNER_KEY).unwrap(),
                }),
                ..Default::default()
            },
            subscription: SubscriptionStatus::Active,
            stripe_connect: None,
            created_at: Timestamp::from_nanos(0),
        };
        self.app.store.put_tenant(tenant.clone()).unwrap();
        tenant
    }

    pub fn seed_agent(&self) -> Agent {
        let agent = Agent {
            id: AgentId::new("agent-1").unwrap(),
            tenant_id: TenantId::new("tenant-1").unwrap(),
            client_id: None,
            name: "Receptionist".into(),
            provider: Provider::ProviderA,
            external_id: "ext-agent-1".into(),
            prompt: Some("You are a friendly receptionist.".into()),
            config: serde_json::Value::Null,
            widget: None,
            created_at: Timestamp::from_nanos(0),
        };
        self.app.store.put_agent(agent.clone()).unwrap();
        agent
    }

    pub fn seed_client_per_minute(&self, rate_cents: u32) -> Client {
        let client = Client {
            id: ClientId::new("client-1").unwrap(),
            tenant_id: TenantId::new("tenant-1").unwrap(),
            name: "Dental practice".into(),
            provider_key_overrides: ProviderKeys::default(),
            permissions: ClientPermissions {
                allow_outbound: true,
                allow_widget: true,
                ai_analysis_enabled: false,
            },
            billing: BillingType::PerMinute { rate_cents },
            created_at: Timestamp::from_nanos(0),
        };
        self.app.store.put_client(client.clone()).unwrap();
        client
    }

    pub fn seed_phone_number(&self, number: &str, outbound_agent: &str) {
        self.app
            .store
            .put_phone_number(PhoneNumber {
                tenant_id: TenantId::new("tenant-1").unwrap(),
                number: Phone::normalize(number).unwrap(),
                provider: Provider::ProviderA,
                inbound_agent_id: None,
                outbound_agent_id: Some(AgentId::new(outbound_agent).unwrap()),
            })
            .unwrap();
    }
}

impl Default for TestApp {
    fn default() -> Self {
        Self::new()
    }
}
