//! A scriptable in-memory provider adapter for tests.

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc, Mutex,
};

use async_trait::async_trait;

use dialplane_types::{CallSnapshot, Credential, Provider, Timestamp};

use crate::providers::{
    InitiateRequest, InitiatedCall, ProviderApi, ProviderError, WebSession,
};

#[derive(Default)]
struct Inner {
    /// Results popped front-first by `initiate`; empty means auto-success.
    scripted_initiations: Vec<Result<InitiatedCall, ProviderError>>,
    initiations: Vec<InitiateRequest>,
    ended: Vec<(Provider, String)>,
    snapshots: Vec<CallSnapshot>,
}

#[derive(Clone, Default)]
pub struct MockProviderAdapter {
    inner: Arc<Mutex<Inner>>,
    counter: Arc<AtomicU64>,
}

impl MockProviderAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the next `initiate` outcomes, consumed in order.
    pub fn script_initiation(&self, result: Result<InitiatedCall, ProviderError>) {
        self.inner.lock().unwrap().scripted_initiations.push(result);
    }

    pub fn script_retryable_failure(&self) {
        self.script_initiation(Err(ProviderError::Upstream {
            provider: Provider::ProviderA,
            status: 503,
            body: "unavailable".into(),
        }));
    }

    pub fn script_fatal_failure(&self) {
        self.script_initiation(Err(ProviderError::Upstream {
            provider: Provider::ProviderA,
            status: 400,
            body: "bad request".into(),
        }));
    }

    pub fn add_snapshot(&self, snapshot: CallSnapshot) {
        self.inner.lock().unwrap().snapshots.push(snapshot);
    }

    pub fn initiations(&self) -> Vec<InitiateRequest> {
        self.inner.lock().unwrap().initiations.clone()
    }

    pub fn ended_calls(&self) -> Vec<(Provider, String)> {
        self.inner.lock().unwrap().ended.clone()
    }
}

#[async_trait]
impl ProviderApi for MockProviderAdapter {
    async fn initiate(&self, request: InitiateRequest) -> Result<InitiatedCall, ProviderError> {
        let mut inner = self.inner.lock().unwrap();
        inner.initiations.push(request);

        if !inner.scripted_initiations.is_empty() {
            return inner.scripted_initiations.remove(0);
        }

        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(InitiatedCall {
            external_id: format!("mock-call-{}", n),
        })
    }

    async fn end_call(
        &self,
        provider: Provider,
        _key: &Credential,
        external_id: &str,
    ) -> Result<(), ProviderError> {
        self.inner
            .lock()
            .unwrap()
            .ended
            .push((provider, external_id.to_string()));
        Ok(())
    }

    async fn fetch_call(
        &self,
        provider: Provider,
        _key: &Credential,
        external_id: &str,
    ) -> Result<Option<CallSnapshot>, ProviderError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .snapshots
            .iter()
            .find(|s| s.provider == provider && s.external_id == external_id)
            .cloned())
    }

    async fn list_active(
        &self,
        provider: Provider,
        _key: &Credential,
        agent_external_ids: &[String],
    ) -> Result<Vec<CallSnapshot>, ProviderError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .snapshots
            .iter()
            .filter(|s| {
                s.provider == provider
                    && agent_external_ids.iter().any(|id| id == &s.agent_external_id)
            })
            .cloned()
            .collect())
    }

    async fn create_web_session(
        &self,
        _provider: Provider,
        _key: &Credential,
        agent_external_id: &str,
    ) -> Result<WebSession, ProviderError> {
        Ok(WebSession {
            token: Credential::new(format!("mock-token-{}", agent_external_id)),
            expires_at: Timestamp::from_nanos(u64::MAX / 2),
        })
    }
}
