use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::instrument;

use dialplane_types::{
    Agent, AgentId, CallAnalysis, CallId, CallRecord, CallStatus, Client, ClientId, ExecutionLog,
    Experiment, ExperimentStatus, PhoneNumber, Provider, ProviderEvent, ScheduledCall,
    ScheduledCallId, ScheduledCallStatus, Tenant, TenantId, Timestamp, TriggerLog, Workflow,
    WorkflowTrigger, TRANSCRIPT_MAX_CHARS,
};
use utils::storage::db::{handles, DBError, Db};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("phone number {number} already exists for tenant {tenant}")]
    PhoneNumberExists { tenant: TenantId, number: String },

    #[error("agent {0} already registered with its provider id")]
    AgentExternalIdExists(AgentId),

    #[error("another running experiment already exists for agent {0}")]
    RunningExperimentExists(AgentId),

    #[error("DB: {0}")]
    DB(#[from] DBError),
}

/// Entity-level operations over the shared typed-table store. Handlers and
/// subsystems go through this; nothing else touches table handles.
#[derive(Clone, Default)]
pub struct Store {
    db: Db,
}

/// What a call upsert observed while holding the record's entry lock.
#[derive(Debug, Clone)]
pub struct CallUpsert {
    pub call: CallRecord,
    pub created: bool,
    /// True exactly once per call: the event moved it into a terminal
    /// status. Later terminal events find the stored status terminal and
    /// report false, which is what makes post-call fan-out at-most-once.
    pub newly_terminal: bool,
}

impl Store {
    pub fn new() -> Result<Self, DBError> {
        Ok(Self { db: Db::new()? })
    }

    pub fn db(&self) -> &Db {
        &self.db
    }

    // ---- tenants / clients ----

    #[instrument(skip(self, tenant), fields(subsys = "Store", tenant_id = %tenant.id))]
    pub fn put_tenant(&self, tenant: Tenant) -> Result<(), StoreError> {
        if let Some(crm_a) = &tenant.integrations.crm_a {
            self.db.set(
                &handles::TENANTS_BY_LOCATION,
                crm_a.location_id.clone(),
                tenant.id.clone(),
            )?;
        }
        if let Some(crm_b) = &tenant.integrations.crm_b {
            self.db.set(
                &handles::TENANTS_BY_PORTAL,
                crm_b.portal_id.clone(),
                tenant.id.clone(),
            )?;
        }
        if let Some(partner) = &tenant.integrations.partner_api {
            self.db.set(
                &handles::TENANTS_BY_KEY_PREFIX,
                partner.api_key.prefix().to_string(),
                tenant.id.clone(),
            )?;
        }
        self.db.set(&handles::TENANTS, tenant.id.clone(), tenant)?;
        Ok(())
    }

    pub fn tenant(&self, id: &TenantId) -> Result<Option<Tenant>, StoreError> {
        Ok(self.db.get(&handles::TENANTS, id)?)
    }

    pub fn tenant_by_location(&self, location_id: &str) -> Result<Option<Tenant>, StoreError> {
        match self
            .db
            .get(&handles::TENANTS_BY_LOCATION, &location_id.to_string())?
        {
            Some(id) => self.tenant(&id),
            None => Ok(None),
        }
    }

    pub fn tenant_by_portal(&self, portal_id: &str) -> Result<Option<Tenant>, StoreError> {
        match self
            .db
            .get(&handles::TENANTS_BY_PORTAL, &portal_id.to_string())?
        {
            Some(id) => self.tenant(&id),
            None => Ok(None),
        }
    }

    /// Resolve a tenant from a partner API key prefix. The caller still has
    /// to constant-time-compare the full key against the stored one.
    pub fn tenant_by_key_prefix(&self, prefix: &str) -> Result<Option<Tenant>, StoreError> {
        match self
            .db
            .get(&handles::TENANTS_BY_KEY_PREFIX, &prefix.to_string())?
        {
            Some(id) => self.tenant(&id),
            None => Ok(None),
        }
    }

    pub fn put_client(&self, client: Client) -> Result<(), StoreError> {
        self.db.set(&handles::CLIENTS, client.id.clone(), client)?;
        Ok(())
    }

    pub fn client(&self, id: &ClientId) -> Result<Option<Client>, StoreError> {
        Ok(self.db.get(&handles::CLIENTS, id)?)
    }

    /// Persist rotated CRM B tokens. Runs inside the single-flight refresh
    /// section, before the refresh lock is released.
    pub fn update_crm_b_tokens(
        &self,
        tenant_id: &TenantId,
        access_token: dialplane_types::Credential,
        refresh_token: dialplane_types::Credential,
        expires_at: Timestamp,
    ) -> Result<(), StoreError> {
        self.db.update(&handles::TENANTS, tenant_id, |tenant| {
            if let Some(tenant) = tenant {
                if let Some(crm_b) = &mut tenant.integrations.crm_b {
                    crm_b.access_token = access_token;
                    crm_b.refresh_token = refresh_token;
                    crm_b.token_expires_at = expires_at;
                }
            }
        })?;
        Ok(())
    }

    pub fn update_calendar_tokens(
        &self,
        tenant_id: &TenantId,
        access_token: dialplane_types::Credential,
        refresh_token: dialplane_types::Credential,
        expires_at: Timestamp,
    ) -> Result<(), StoreError> {
        self.db.update(&handles::TENANTS, tenant_id, |tenant| {
            if let Some(tenant) = tenant {
                if let Some(calendar) = &mut tenant.integrations.calendar {
                    calendar.access_token = access_token;
                    calendar.refresh_token = refresh_token;
                    calendar.token_expires_at = expires_at;
                }
            }
        })?;
        Ok(())
    }

    // ---- agents / phone numbers ----

    #[instrument(skip(self, agent), fields(subsys = "Store", agent_id = %agent.id))]
    pub fn put_agent(&self, agent: Agent) -> Result<(), StoreError> {
        let external_key = (agent.provider, agent.external_id.clone());
        let (existing, inserted) = self
            .db
            .get_or_insert_with(&handles::AGENTS_BY_EXTERNAL, external_key, || {
                agent.id.clone()
            })?;
        if !inserted && existing != agent.id {
            return Err(StoreError::AgentExternalIdExists(agent.id));
        }
        self.db.set(&handles::AGENTS, agent.id.clone(), agent)?;
        Ok(())
    }

    pub fn agent(&self, id: &AgentId) -> Result<Option<Agent>, StoreError> {
        Ok(self.db.get(&handles::AGENTS, id)?)
    }

    pub fn agent_by_external(
        &self,
        provider: Provider,
        external_id: &str,
    ) -> Result<Option<Agent>, StoreError> {
        match self.db.get(
            &handles::AGENTS_BY_EXTERNAL,
            &(provider, external_id.to_string()),
        )? {
            Some(id) => self.agent(&id),
            None => Ok(None),
        }
    }

    pub fn agents_for_tenant(&self, tenant_id: &TenantId) -> Result<Vec<Agent>, StoreError> {
        let agents = self.db.with_table_read(&handles::AGENTS, |table| {
            Ok(table
                .iter()
                .filter(|entry| &entry.pair().1.tenant_id == tenant_id)
                .map(|entry| entry.pair().1.clone())
                .collect())
        })?;
        Ok(agents)
    }

    /// Uniqueness on `(tenant, number)` is enforced here.
    pub fn put_phone_number(&self, phone: PhoneNumber) -> Result<(), StoreError> {
        let key = (phone.tenant_id.clone(), phone.number.as_str().to_string());
        let (_, inserted) = self
            .db
            .get_or_insert_with(&handles::PHONE_NUMBERS, key, || phone.clone())?;
        if !inserted {
            return Err(StoreError::PhoneNumberExists {
                tenant: phone.tenant_id,
                number: phone.number.as_str().to_string(),
            });
        }
        Ok(())
    }

    pub fn phone_number(
        &self,
        tenant_id: &TenantId,
        number: &str,
    ) -> Result<Option<PhoneNumber>, StoreError> {
        Ok(self.db.get(
            &handles::PHONE_NUMBERS,
            &(tenant_id.clone(), number.to_string()),
        )?)
    }

    // ---- calls ----

    /// Upsert the canonical call record from a normalized provider event,
    /// keyed on `(provider, external_id)`. Transcript capping and the
    /// terminal no-regress rule are applied while holding the entry lock.
    #[instrument(skip(self, agent, event, now), fields(subsys = "Store", external_id = %event.external_id))]
    pub fn upsert_call_event(
        &self,
        agent: &Agent,
        event: &ProviderEvent,
        now: DateTime<Utc>,
    ) -> Result<CallUpsert, StoreError> {
        let now = Timestamp::from(now);
        let key = (event.provider, event.external_id.clone());
        let (call_id, _) = self
            .db
            .get_or_insert_with(&handles::CALLS_BY_EXTERNAL, key, CallId::generate)?;

        // whoever lands first creates the row; everyone after merges into it
        let (call, created) =
            self.db
                .get_or_insert_with(&handles::CALLS, call_id.clone(), || {
                    let mut call = CallRecord {
                        id: call_id.clone(),
                        tenant_id: agent.tenant_id.clone(),
                        client_id: agent.client_id.clone(),
                        agent_id: agent.id.clone(),
                        provider: event.provider,
                        external_id: event.external_id.clone(),
                        status: event.status,
                        direction: event.direction,
                        from_number: event.from_number.clone(),
                        to_number: event.to_number.clone(),
                        started_at: event.started_at,
                        ended_at: event.ended_at,
                        duration_secs: event.duration_secs,
                        cost_cents: event.cost_cents,
                        transcript: event.transcript.clone(),
                        voicemail: event.voicemail,
                        analysis: CallAnalysis {
                            summary: event.summary.clone(),
                            ..Default::default()
                        },
                        metadata: Default::default(),
                        created_at: now,
                        updated_at: now,
                    };
                    call.cap_transcript();
                    call
                })?;

        if created {
            return Ok(CallUpsert {
                newly_terminal: call.status.is_terminal(),
                created: true,
                call,
            });
        }

        let result = self.db.update(&handles::CALLS, &call_id, |call| {
            let call = match call {
                Some(call) => call,
                None => return None,
            };

            let was_terminal = call.status.is_terminal();
            if !was_terminal {
                call.status = event.status;
                call.direction = event.direction;
            }

            if call.from_number.is_none() {
                call.from_number = event.from_number.clone();
            }
            if call.to_number.is_none() {
                call.to_number = event.to_number.clone();
            }
            if call.started_at.is_none() {
                call.started_at = event.started_at;
            }
            if event.ended_at.is_some() && !was_terminal {
                call.ended_at = event.ended_at;
            }
            if event.duration_secs > 0 && !was_terminal {
                call.duration_secs = event.duration_secs;
            }
            if event.cost_cents > 0 && !was_terminal {
                call.cost_cents = event.cost_cents;
            }
            if let Some(transcript) = &event.transcript {
                let capped: String = transcript.chars().take(TRANSCRIPT_MAX_CHARS).collect();
                call.transcript = Some(capped);
            }
            if call.analysis.summary.is_none() {
                call.analysis.summary = event.summary.clone();
            }
            call.voicemail = call.voicemail || event.voicemail;
            call.updated_at = now;

            Some(CallUpsert {
                call: call.clone(),
                created: false,
                newly_terminal: !was_terminal && call.status.is_terminal(),
            })
        })?;

        // rows are never deleted, so the entry is always there by now
        result.ok_or_else(|| StoreError::DB(anyhow::anyhow!("call row {} missing", call_id)))
    }

    pub fn call(&self, id: &CallId) -> Result<Option<CallRecord>, StoreError> {
        Ok(self.db.get(&handles::CALLS, id)?)
    }

    pub fn call_by_external(
        &self,
        provider: Provider,
        external_id: &str,
    ) -> Result<Option<CallRecord>, StoreError> {
        match self.db.get(
            &handles::CALLS_BY_EXTERNAL,
            &(provider, external_id.to_string()),
        )? {
            Some(id) => self.call(&id),
            None => Ok(None),
        }
    }

    pub fn set_call_metadata(
        &self,
        id: &CallId,
        metadata: dialplane_types::CallMetadata,
    ) -> Result<(), StoreError> {
        self.db.update(&handles::CALLS, id, |call| {
            if let Some(call) = call {
                call.metadata = metadata;
            }
        })?;
        Ok(())
    }

    pub fn set_call_analysis(
        &self,
        id: &CallId,
        analysis: CallAnalysis,
    ) -> Result<(), StoreError> {
        self.db.update(&handles::CALLS, id, |call| {
            if let Some(call) = call {
                // keep a summary a provider already delivered if the
                // analyzer produced none
                if analysis.summary.is_some() {
                    call.analysis.summary = analysis.summary.clone();
                }
                call.analysis.sentiment = analysis.sentiment;
                call.analysis.topics = analysis.topics.clone();
                call.analysis.score = analysis.score;
            }
        })?;
        Ok(())
    }

    pub fn ongoing_calls(&self, tenant_id: &TenantId) -> Result<Vec<CallRecord>, StoreError> {
        let calls = self.db.with_table_read(&handles::CALLS, |table| {
            Ok(table
                .iter()
                .filter(|entry| {
                    let call = entry.pair().1;
                    &call.tenant_id == tenant_id
                        && matches!(call.status, CallStatus::Queued | CallStatus::InProgress)
                })
                .map(|entry| entry.pair().1.clone())
                .collect())
        })?;
        Ok(calls)
    }

    // ---- scheduled calls ----

    pub fn put_scheduled_call(&self, job: ScheduledCall) -> Result<(), StoreError> {
        self.db
            .set(&handles::SCHEDULED_CALLS, job.id.clone(), job)?;
        Ok(())
    }

    pub fn scheduled_call(&self, id: &ScheduledCallId) -> Result<Option<ScheduledCall>, StoreError> {
        Ok(self.db.get(&handles::SCHEDULED_CALLS, id)?)
    }

    /// Pending jobs due at `now`, oldest first, at most `batch`.
    pub fn due_scheduled_calls(
        &self,
        now: DateTime<Utc>,
        batch: usize,
    ) -> Result<Vec<ScheduledCall>, StoreError> {
        let now = Timestamp::from(now);
        let mut due: Vec<ScheduledCall> =
            self.db.with_table_read(&handles::SCHEDULED_CALLS, |table| {
                Ok(table
                    .iter()
                    .filter(|entry| {
                        let job = entry.pair().1;
                        job.status == ScheduledCallStatus::Pending && job.scheduled_at <= now
                    })
                    .map(|entry| entry.pair().1.clone())
                    .collect())
            })?;
        due.sort_by_key(|job| job.scheduled_at);
        due.truncate(batch);
        Ok(due)
    }

    /// The lease: CAS `pending -> in_progress`. Exactly one concurrent
    /// caller wins; everyone else observes false and moves on.
    #[instrument(skip(self), fields(subsys = "Store", job_id = %id))]
    pub fn lease_scheduled_call(&self, id: &ScheduledCallId) -> Result<bool, StoreError> {
        let leased = self
            .db
            .update(&handles::SCHEDULED_CALLS, id, |job| match job {
                Some(job) if job.status == ScheduledCallStatus::Pending => {
                    job.status = ScheduledCallStatus::InProgress;
                    true
                }
                _ => false,
            })?;
        Ok(leased)
    }

    /// Put a leased job back to pending at a later instant because the
    /// window closed between scheduling and dispatch.
    pub fn reschedule_scheduled_call(
        &self,
        id: &ScheduledCallId,
        next_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let next_at = Timestamp::from(next_at);
        self.db.update(&handles::SCHEDULED_CALLS, id, |job| {
            if let Some(job) = job {
                job.status = ScheduledCallStatus::Pending;
                job.scheduled_at = next_at;
                job.timezone_delayed = true;
            }
        })?;
        Ok(())
    }

    pub fn complete_scheduled_call(
        &self,
        id: &ScheduledCallId,
        external_call_id: &str,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let now = Timestamp::from(now);
        self.db.update(&handles::SCHEDULED_CALLS, id, |job| {
            if let Some(job) = job {
                job.status = ScheduledCallStatus::Completed;
                job.external_call_id = Some(external_call_id.to_string());
                job.completed_at = Some(now);
                job.error_message = None;
            }
        })?;
        Ok(())
    }

    /// Record a failed dispatch attempt. Exhausted jobs go terminal;
    /// everything else returns to pending for the next tick.
    pub fn fail_scheduled_call_attempt(
        &self,
        id: &ScheduledCallId,
        error: &str,
    ) -> Result<ScheduledCallStatus, StoreError> {
        let status = self
            .db
            .update(&handles::SCHEDULED_CALLS, id, |job| match job {
                Some(job) => {
                    job.error_message = Some(error.to_string());
                    if job.retries_exhausted() {
                        job.status = ScheduledCallStatus::Failed;
                    } else {
                        job.retry_count += 1;
                        job.status = ScheduledCallStatus::Pending;
                    }
                    job.status
                }
                None => ScheduledCallStatus::Failed,
            })?;
        Ok(status)
    }

    /// Terminal failure with no retry, used for fatal provider rejections.
    pub fn fail_scheduled_call_terminal(
        &self,
        id: &ScheduledCallId,
        error: &str,
    ) -> Result<(), StoreError> {
        self.db.update(&handles::SCHEDULED_CALLS, id, |job| {
            if let Some(job) = job {
                job.status = ScheduledCallStatus::Failed;
                job.error_message = Some(error.to_string());
            }
        })?;
        Ok(())
    }

    pub fn cancel_scheduled_call(&self, id: &ScheduledCallId) -> Result<bool, StoreError> {
        let cancelled = self
            .db
            .update(&handles::SCHEDULED_CALLS, id, |job| match job {
                Some(job) if job.status == ScheduledCallStatus::Pending => {
                    job.status = ScheduledCallStatus::Cancelled;
                    true
                }
                _ => false,
            })?;
        Ok(cancelled)
    }

    // ---- experiments / workflows ----

    pub fn put_experiment(&self, experiment: Experiment) -> Result<(), StoreError> {
        if experiment.status == ExperimentStatus::Running {
            let running = self.running_experiment(&experiment.agent_id)?;
            if running.as_ref().is_some_and(|e| e.id != experiment.id) {
                return Err(StoreError::RunningExperimentExists(experiment.agent_id));
            }
        }
        self.db
            .set(&handles::EXPERIMENTS, experiment.id.clone(), experiment)?;
        Ok(())
    }

    pub fn running_experiment(
        &self,
        agent_id: &AgentId,
    ) -> Result<Option<Experiment>, StoreError> {
        let experiment = self.db.with_table_read(&handles::EXPERIMENTS, |table| {
            Ok(table
                .iter()
                .map(|entry| entry.pair().1.clone())
                .find(|e| &e.agent_id == agent_id && e.status == ExperimentStatus::Running))
        })?;
        Ok(experiment)
    }

    pub fn put_workflow(&self, workflow: Workflow) -> Result<(), StoreError> {
        self.db
            .set(&handles::WORKFLOWS, workflow.id.clone(), workflow)?;
        Ok(())
    }

    /// Enabled workflows for a finished call, in creation order: trigger tag
    /// matches and the workflow is either tenant-wide or pinned to this agent.
    pub fn workflows_for_call(
        &self,
        tenant_id: &TenantId,
        agent_id: &AgentId,
        triggers: &[WorkflowTrigger],
    ) -> Result<Vec<Workflow>, StoreError> {
        let mut workflows: Vec<Workflow> =
            self.db.with_table_read(&handles::WORKFLOWS, |table| {
                Ok(table
                    .iter()
                    .filter(|entry| {
                        let wf = entry.pair().1;
                        wf.enabled
                            && &wf.tenant_id == tenant_id
                            && triggers.contains(&wf.trigger)
                            && wf
                                .agent_id
                                .as_ref()
                                .map(|id| id == agent_id)
                                .unwrap_or(true)
                    })
                    .map(|entry| entry.pair().1.clone())
                    .collect())
            })?;
        workflows.sort_by_key(|wf| wf.created_at);
        Ok(workflows)
    }

    // ---- logs ----

    pub fn put_trigger_log(&self, log: TriggerLog) -> Result<(), StoreError> {
        self.db.set(&handles::TRIGGER_LOGS, log.id.clone(), log)?;
        Ok(())
    }

    pub fn trigger_logs_for_tenant(
        &self,
        tenant_id: &TenantId,
    ) -> Result<Vec<TriggerLog>, StoreError> {
        let mut logs: Vec<TriggerLog> =
            self.db.with_table_read(&handles::TRIGGER_LOGS, |table| {
                Ok(table
                    .iter()
                    .filter(|entry| &entry.pair().1.tenant_id == tenant_id)
                    .map(|entry| entry.pair().1.clone())
                    .collect())
            })?;
        logs.sort_by_key(|log| log.created_at);
        Ok(logs)
    }

    pub fn put_execution_log(&self, log: ExecutionLog) -> Result<(), StoreError> {
        self.db
            .set(&handles::EXECUTION_LOGS, log.id.clone(), log)?;
        Ok(())
    }

    pub fn execution_logs_for_call(
        &self,
        call_id: &CallId,
    ) -> Result<Vec<ExecutionLog>, StoreError> {
        let mut logs: Vec<ExecutionLog> =
            self.db.with_table_read(&handles::EXECUTION_LOGS, |table| {
                Ok(table
                    .iter()
                    .filter(|entry| &entry.pair().1.call_id == call_id)
                    .map(|entry| entry.pair().1.clone())
                    .collect())
            })?;
        logs.sort_by_key(|log| log.started_at);
        Ok(logs)
    }

    // ---- usage ----

    /// Atomically accrue billable cents for a per-minute client.
    pub fn add_usage_cents(
        &self,
        tenant_id: &TenantId,
        client_id: &ClientId,
        cents: i64,
    ) -> Result<i64, StoreError> {
        let key = format!("{}/{}", tenant_id, client_id);
        Ok(self.db.increment(&handles::USAGE_CENTS, key, cents)?)
    }

    pub fn usage_cents(
        &self,
        tenant_id: &TenantId,
        client_id: &ClientId,
    ) -> Result<i64, StoreError> {
        let key = format!("{}/{}", tenant_id, client_id);
        Ok(self
            .db
            .get(&handles::USAGE_CENTS, &key)?
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dialplane_types::{
        CallDirection, CallMetadata, Phone, ProviderEventKind, SubscriptionStatus, TriggerSource,
    };

    fn tenant() -> Tenant {
        Tenant {
            id: TenantId::new("tenant-1").unwrap(),
            name: "Acme Agency".into(),
            provider_keys: Default::default(),
            calling_window: Default::default(),
            integrations: Default::default(),
            subscription: SubscriptionStatus::Active,
            stripe_connect: None,
            created_at: Timestamp::from_nanos(0),
        }
    }

    fn agent() -> Agent {
        Agent {
            id: AgentId::new("agent-1").unwrap(),
            tenant_id: TenantId::new("tenant-1").unwrap(),
            client_id: None,
            name: "Receptionist".into(),
            provider: Provider::ProviderA,
            external_id: "ext-agent-1".into(),
            prompt: None,
            config: serde_json::Value::Null,
            widget: None,
            created_at: Timestamp::from_nanos(0),
        }
    }

    fn ended_event(external_id: &str, status: CallStatus) -> ProviderEvent {
        ProviderEvent {
            kind: ProviderEventKind::Ended,
            provider: Provider::ProviderA,
            external_id: external_id.into(),
            agent_external_id: "ext-agent-1".into(),
            status,
            direction: CallDirection::Outbound,
            from_number: Some("+14155550000".into()),
            to_number: Some("+14155551234".into()),
            started_at: Some(Timestamp::from_nanos(1)),
            ended_at: Some(Timestamp::from_nanos(2)),
            duration_secs: 61,
            cost_cents: 25,
            transcript: Some("hello".into()),
            summary: None,
            voicemail: false,
            provider_meta: serde_json::Value::Null,
        }
    }

    fn job(id: &str, at: u64) -> ScheduledCall {
        ScheduledCall {
            id: ScheduledCallId::new(id).unwrap(),
            tenant_id: TenantId::new("tenant-1").unwrap(),
            client_id: None,
            agent_id: AgentId::new("agent-1").unwrap(),
            phone: Phone::normalize("+14155551234").unwrap(),
            status: ScheduledCallStatus::Pending,
            scheduled_at: Timestamp::from_nanos(at),
            original_scheduled_at: Timestamp::from_nanos(at),
            lead_timezone: None,
            timezone_delayed: false,
            retry_count: 0,
            max_retries: 3,
            trigger_source: TriggerSource::Api,
            contact_id: None,
            metadata: CallMetadata::default(),
            external_call_id: None,
            error_message: None,
            completed_at: None,
            created_at: Timestamp::from_nanos(0),
        }
    }

    #[test]
    fn upsert_creates_then_merges() {
        let store = Store::new().unwrap();
        store.put_tenant(tenant()).unwrap();
        store.put_agent(agent()).unwrap();
        let now = Utc::now();

        let first = store
            .upsert_call_event(&agent(), &ended_event("call-1", CallStatus::InProgress), now)
            .unwrap();
        assert!(first.created);
        assert!(!first.newly_terminal);

        let second = store
            .upsert_call_event(&agent(), &ended_event("call-1", CallStatus::Completed), now)
            .unwrap();
        assert!(!second.created);
        assert!(second.newly_terminal);
        assert_eq!(second.call.id, first.call.id);
    }

    #[test]
    fn terminal_status_never_regresses() {
        let store = Store::new().unwrap();
        store.put_agent(agent()).unwrap();
        let now = Utc::now();

        store
            .upsert_call_event(&agent(), &ended_event("call-2", CallStatus::Completed), now)
            .unwrap();

        // late `started` event arrives out of order
        let mut late = ended_event("call-2", CallStatus::InProgress);
        late.kind = ProviderEventKind::Started;
        let upsert = store.upsert_call_event(&agent(), &late, now).unwrap();

        assert_eq!(upsert.call.status, CallStatus::Completed);
        assert!(!upsert.newly_terminal);
    }

    #[test]
    fn completed_is_newly_terminal_exactly_once() {
        let store = Store::new().unwrap();
        store.put_agent(agent()).unwrap();
        let now = Utc::now();

        let first = store
            .upsert_call_event(&agent(), &ended_event("call-3", CallStatus::Completed), now)
            .unwrap();
        let second = store
            .upsert_call_event(&agent(), &ended_event("call-3", CallStatus::Completed), now)
            .unwrap();

        assert!(first.newly_terminal);
        assert!(!second.newly_terminal);
    }

    #[test]
    fn lease_single_winner_under_contention() {
        let store = Store::new().unwrap();
        store.put_scheduled_call(job("job-racy", 0)).unwrap();
        let id = ScheduledCallId::new("job-racy").unwrap();

        let winners: usize = std::thread::scope(|scope| {
            let joins: Vec<_> = (0..8)
                .map(|_| {
                    let store = store.clone();
                    let id = id.clone();
                    scope.spawn(move || store.lease_scheduled_call(&id).unwrap())
                })
                .collect();
            joins
                .into_iter()
                .map(|j| j.join().unwrap())
                .filter(|won| *won)
                .count()
        });
        assert_eq!(winners, 1);
    }

    #[test]
    fn due_jobs_are_ordered_and_bounded() {
        let store = Store::new().unwrap();
        store.put_scheduled_call(job("job-aa", 300)).unwrap();
        store.put_scheduled_call(job("job-bb", 100)).unwrap();
        store.put_scheduled_call(job("job-cc", 200)).unwrap();

        let now = DateTime::from_timestamp_nanos(500).to_utc();
        let due = store.due_scheduled_calls(now, 2).unwrap();
        assert_eq!(due.len(), 2);
        assert_eq!(due[0].id.as_ref(), "job-bb");
        assert_eq!(due[1].id.as_ref(), "job-cc");
    }

    #[test]
    fn retry_bookkeeping_exhausts_at_max() {
        let store = Store::new().unwrap();
        store.put_scheduled_call(job("job-retry", 0)).unwrap();
        let id = ScheduledCallId::new("job-retry").unwrap();

        // max_retries = 3 means two returns to pending, then failed
        assert!(store.lease_scheduled_call(&id).unwrap());
        assert_eq!(
            store.fail_scheduled_call_attempt(&id, "boom").unwrap(),
            ScheduledCallStatus::Pending
        );
        assert!(store.lease_scheduled_call(&id).unwrap());
        assert_eq!(
            store.fail_scheduled_call_attempt(&id, "boom").unwrap(),
            ScheduledCallStatus::Pending
        );
        assert!(store.lease_scheduled_call(&id).unwrap());
        assert_eq!(
            store.fail_scheduled_call_attempt(&id, "boom").unwrap(),
            ScheduledCallStatus::Failed
        );

        // terminal: the next tick can't lease it again
        assert!(!store.lease_scheduled_call(&id).unwrap());
        let stored = store.scheduled_call(&id).unwrap().unwrap();
        assert_eq!(stored.retry_count, 2);
        assert_eq!(stored.error_message.as_deref(), Some("boom"));
    }

    #[test]
    fn cancelled_jobs_are_not_leased() {
        let store = Store::new().unwrap();
        store.put_scheduled_call(job("job-cancel", 0)).unwrap();
        let id = ScheduledCallId::new("job-cancel").unwrap();

        assert!(store.cancel_scheduled_call(&id).unwrap());
        assert!(!store.lease_scheduled_call(&id).unwrap());
    }

    #[test]
    fn phone_numbers_unique_per_tenant() {
        let store = Store::new().unwrap();
        let number = PhoneNumber {
            tenant_id: TenantId::new("tenant-1").unwrap(),
            number: Phone::normalize("+14155551234").unwrap(),
            provider: Provider::ProviderA,
            inbound_agent_id: None,
            outbound_agent_id: Some(AgentId::new("agent-1").unwrap()),
        };
        store.put_phone_number(number.clone()).unwrap();
        assert!(matches!(
            store.put_phone_number(number),
            Err(StoreError::PhoneNumberExists { .. })
        ));
    }

    #[test]
    fn one_running_experiment_per_agent() {
        let store = Store::new().unwrap();
        let make = |id: &str, status| Experiment {
            id: dialplane_types::ExperimentId::new(id).unwrap(),
            tenant_id: TenantId::new("tenant-1").unwrap(),
            agent_id: AgentId::new("agent-1").unwrap(),
            name: "exp".into(),
            status,
            variants: Vec::new(),
            created_at: Timestamp::from_nanos(0),
        };

        store.put_experiment(make("exp-1", ExperimentStatus::Running)).unwrap();
        assert!(matches!(
            store.put_experiment(make("exp-2", ExperimentStatus::Running)),
            Err(StoreError::RunningExperimentExists(_))
        ));
        // a paused one is fine
        store.put_experiment(make("exp-3", ExperimentStatus::Paused)).unwrap();
    }

    #[test]
    fn usage_accumulates_per_client() {
        let store = Store::new().unwrap();
        let tenant_id = TenantId::new("tenant-1").unwrap();
        let client_id = ClientId::new("client-1").unwrap();

        store.add_usage_cents(&tenant_id, &client_id, 120).unwrap();
        store.add_usage_cents(&tenant_id, &client_id, 30).unwrap();
        assert_eq!(store.usage_cents(&tenant_id, &client_id).unwrap(), 150);
    }
}
