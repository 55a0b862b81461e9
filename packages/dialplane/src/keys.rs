use thiserror::Error;

use dialplane_types::{ClientId, Credential, Provider, TenantId};

use crate::store::{Store, StoreError};

#[derive(Error, Debug)]
pub enum KeyError {
    #[error("no {provider} key configured for tenant {tenant}")]
    NotConfigured { tenant: TenantId, provider: Provider },

    #[error("tenant {0} not found")]
    TenantNotFound(TenantId),

    #[error("store: {0}")]
    Store(#[from] StoreError),
}

/// Where a resolved key came from, for observability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySource {
    Client,
    Tenant,
}

impl KeySource {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeySource::Client => "client",
            KeySource::Tenant => "tenant",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedKey {
    pub key: Credential,
    pub source: KeySource,
}

/// Resolve the provider API key for a dispatch: the client's override wins,
/// then the tenant's key, then `NotConfigured`.
///
/// Resolution is a pure read of the current store snapshot. Callers must
/// not hold a resolved key across webhook boundaries; keys rotate.
pub fn resolve(
    store: &Store,
    tenant_id: &TenantId,
    client_id: Option<&ClientId>,
    provider: Provider,
) -> Result<ResolvedKey, KeyError> {
    if let Some(client_id) = client_id {
        if let Some(client) = store.client(client_id)? {
            // a client record owned by another tenant is never followed
            if &client.tenant_id == tenant_id {
                if let Some(key) = client.provider_key_overrides.get(provider) {
                    return Ok(ResolvedKey {
                        key: key.clone(),
                        source: KeySource::Client,
                    });
                }
            }
        }
    }

    let tenant = store
        .tenant(tenant_id)?
        .ok_or_else(|| KeyError::TenantNotFound(tenant_id.clone()))?;

    match tenant.provider_keys.get(provider) {
        Some(key) => Ok(ResolvedKey {
            key: key.clone(),
            source: KeySource::Tenant,
        }),
        None => Err(KeyError::NotConfigured {
            tenant: tenant_id.clone(),
            provider,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dialplane_types::{
        BillingType, Client, ClientPermissions, ProviderKeys, SubscriptionStatus, Tenant,
        Timestamp,
    };

    fn seed(store: &Store) {
        store
            .put_tenant(Tenant {
                id: TenantId::new("tenant-1").unwrap(),
                name: "Acme".into(),
                provider_keys: ProviderKeys {
                    provider_a: Some(Credential::new("tenant-key-a".into())),
                    provider_b: Some(Credential::new("tenant-key-b".into())),
                    provider_c: None,
                },
                calling_window: Default::default(),
                integrations: Default::default(),
                subscription: SubscriptionStatus::Active,
                stripe_connect: None,
                created_at: Timestamp::from_nanos(0),
            })
            .unwrap();
        store
            .put_tenant(Tenant {
                id: TenantId::new("tenant-2").unwrap(),
                name: "Other".into(),
                provider_keys: ProviderKeys {
                    provider_a: Some(Credential::new("other-tenant-key".into())),
                    ..Default::default()
                },
                calling_window: Default::default(),
                integrations: Default::default(),
                subscription: SubscriptionStatus::Active,
                stripe_connect: None,
                created_at: Timestamp::from_nanos(0),
            })
            .unwrap();
        store
            .put_client(Client {
                id: ClientId::new("client-1").unwrap(),
                tenant_id: TenantId::new("tenant-1").unwrap(),
                name: "Dental practice".into(),
                provider_key_overrides: ProviderKeys {
                    provider_a: Some(Credential::new("client-key-a".into())),
                    ..Default::default()
                },
                permissions: ClientPermissions::default(),
                billing: BillingType::Subscription,
                created_at: Timestamp::from_nanos(0),
            })
            .unwrap();
    }

    #[test]
    fn client_override_wins() {
        let store = Store::new().unwrap();
        seed(&store);

        let resolved = resolve(
            &store,
            &TenantId::new("tenant-1").unwrap(),
            Some(&ClientId::new("client-1").unwrap()),
            Provider::ProviderA,
        )
        .unwrap();
        assert_eq!(resolved.key.as_str(), "client-key-a");
        assert_eq!(resolved.source, KeySource::Client);
    }

    #[test]
    fn falls_back_to_tenant_key() {
        let store = Store::new().unwrap();
        seed(&store);

        // client has no B override
        let resolved = resolve(
            &store,
            &TenantId::new("tenant-1").unwrap(),
            Some(&ClientId::new("client-1").unwrap()),
            Provider::ProviderB,
        )
        .unwrap();
        assert_eq!(resolved.key.as_str(), "tenant-key-b");
        assert_eq!(resolved.source, KeySource::Tenant);

        // no client at all
        let resolved = resolve(
            &store,
            &TenantId::new("tenant-1").unwrap(),
            None,
            Provider::ProviderA,
        )
        .unwrap();
        assert_eq!(resolved.key.as_str(), "tenant-key-a");
    }

    #[test]
    fn unconfigured_provider_fails() {
        let store = Store::new().unwrap();
        seed(&store);

        let err = resolve(
            &store,
            &TenantId::new("tenant-1").unwrap(),
            None,
            Provider::ProviderC,
        )
        .unwrap_err();
        assert!(matches!(err, KeyError::NotConfigured { .. }));
    }

    #[test]
    fn never_resolves_across_tenants() {
        let store = Store::new().unwrap();
        seed(&store);

        for client in [None, Some(ClientId::new("client-1").unwrap())] {
            let resolved = resolve(
                &store,
                &TenantId::new("tenant-2").unwrap(),
                client.as_ref(),
                Provider::ProviderA,
            )
            .unwrap();
            // client-1 belongs to tenant-1; its override must never leak here
            assert_eq!(resolved.key.as_str(), "other-tenant-key");
        }
    }
}
