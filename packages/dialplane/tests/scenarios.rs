//! End-to-end scenarios over the full pipeline: trigger ingress, scheduler,
//! webhook ingress, and workflow execution against an in-process mock CRM.

use axum::{routing::post, Router};
use chrono::{DateTime, Utc};

use dialplane::{
    config::Config,
    ingress,
    scheduler,
    signature,
    test_utils::TestApp,
    webhooks::{self, WebhookHeaders},
    workflow,
};
use dialplane_types::{
    ActionConfig, ActionKind, ActionOutcome, AgentId, CallEventKind, CallStatus, Credential,
    ExecutionStatus, Phone, Provider, ScheduledCallStatus, Timestamp, TriggerRequest,
    TriggerSource, TriggerStatus, Workflow, WorkflowId, WorkflowTrigger,
};
use utils::clock::Clock;

fn utc(s: &str) -> DateTime<Utc> {
    s.parse().unwrap()
}

fn trigger_request(phone: &str) -> TriggerRequest {
    TriggerRequest {
        phone_number: phone.to_string(),
        contact_id: Some("contact-42".to_string()),
        ..Default::default()
    }
}

/// Scenario: a CRM trigger lands on a Saturday morning for a Pacific lead.
/// The window (Mon-Fri 9-20) is closed, so the call is deferred to Monday
/// 09:00 in America/Los_Angeles, expressed in UTC.
#[tokio::test]
async fn out_of_window_trigger_schedules_for_monday_opening() {
    let harness = TestApp::new();
    let tenant = harness.seed_tenant();
    harness.seed_agent();

    // Sat 2026-07-18 10:00 PDT
    harness.set_now("2026-07-18T17:00:00Z");

    let outcome = ingress::handle_trigger(
        &harness.app,
        &tenant,
        TriggerSource::CrmA,
        &trigger_request("+14155551234"),
    )
    .await
    .unwrap();

    assert_eq!(outcome.status, TriggerStatus::Scheduled);
    assert_eq!(outcome.lead_timezone.as_deref(), Some("America/Los_Angeles"));
    let job_id = outcome.scheduled_call_id.expect("a scheduled job");

    let job = harness.app.store.scheduled_call(&job_id).unwrap().unwrap();
    assert_eq!(job.status, ScheduledCallStatus::Pending);
    // Mon 2026-07-20 09:00 PDT == 16:00 UTC
    assert_eq!(
        job.scheduled_at,
        Timestamp::from(utc("2026-07-20T16:00:00Z"))
    );
    assert!(job.timezone_delayed);
    assert_eq!(job.trigger_source, TriggerSource::CrmA);

    // nothing was dialed
    assert!(harness.provider.initiations().is_empty());

    let logs = harness.app.store.trigger_logs_for_tenant(&tenant.id).unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].status, TriggerStatus::Scheduled);
}

/// Scenario: the same trigger inside the window dials immediately, stamping
/// lead timezone and trigger source into the provider metadata.
#[tokio::test]
async fn in_window_trigger_dispatches_immediately() {
    let harness = TestApp::new();
    let tenant = harness.seed_tenant();
    harness.seed_agent();

    // Tue 2026-07-21 11:00 PDT
    harness.set_now("2026-07-21T18:00:00Z");

    let outcome = ingress::handle_trigger(
        &harness.app,
        &tenant,
        TriggerSource::CrmA,
        &trigger_request("+14155551234"),
    )
    .await
    .unwrap();

    assert_eq!(outcome.status, TriggerStatus::Initiated);
    let external_id = outcome.call_id.expect("an external call id");

    let initiations = harness.provider.initiations();
    assert_eq!(initiations.len(), 1);
    let request = &initiations[0];
    assert_eq!(request.provider, Provider::ProviderA);
    assert_eq!(request.to_number, "+14155551234");
    assert_eq!(request.agent_external_id, "ext-agent-1");
    assert_eq!(
        request.metadata["lead_timezone"],
        serde_json::json!("America/Los_Angeles")
    );
    assert_eq!(request.metadata["trigger_source"], serde_json::json!("crm_a"));

    // a queued call record exists before the first provider webhook
    let call = harness
        .app
        .store
        .call_by_external(Provider::ProviderA, &external_id)
        .unwrap()
        .expect("dispatch-side call record");
    assert_eq!(call.status, CallStatus::Queued);
    assert_eq!(call.metadata.trigger_source, Some(TriggerSource::CrmA));
}

/// Scenario: a pending job whose first dispatch fails with a retryable
/// provider error goes back to pending and completes on the next tick.
#[tokio::test]
async fn scheduler_retries_then_succeeds() {
    let harness = TestApp::new();
    let tenant = harness.seed_tenant();
    harness.seed_agent();

    // schedule inside the window so dispatch is attempted right away:
    // Tue 11:00 PDT
    harness.set_now("2026-07-21T18:00:00Z");
    let outcome = ingress::handle_trigger(
        &harness.app,
        &tenant,
        TriggerSource::Api,
        &TriggerRequest {
            phone_number: "+14155551234".into(),
            agent_id: Some(AgentId::new("agent-1").unwrap()),
            scheduled_at: Some(utc("2026-07-21T18:30:00Z")),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    let job_id = outcome.scheduled_call_id.unwrap();

    // due now
    harness.set_now("2026-07-21T18:30:00Z");
    harness.provider.script_retryable_failure();

    let first = scheduler::tick(&harness.app).await.unwrap();
    assert_eq!(first.due, 1);
    assert_eq!(first.retried, 1);

    let job = harness.app.store.scheduled_call(&job_id).unwrap().unwrap();
    assert_eq!(job.status, ScheduledCallStatus::Pending);
    assert_eq!(job.retry_count, 1);
    assert!(job.error_message.is_some());

    let second = scheduler::tick(&harness.app).await.unwrap();
    assert_eq!(second.completed, 1);

    let job = harness.app.store.scheduled_call(&job_id).unwrap().unwrap();
    assert_eq!(job.status, ScheduledCallStatus::Completed);
    assert!(job.external_call_id.is_some());
}

/// Scenario: a provider A webhook with a tampered body is rejected with no
/// store writes and no broadcast.
#[tokio::test]
async fn tampered_webhook_is_rejected_without_side_effects() {
    let harness = TestApp::new();
    harness.seed_tenant();
    harness.seed_agent();

    let body = serde_json::json!({
        "type": "call.ended",
        "call": {
            "id": "call-evil",
            "assistant_id": "ext-agent-1",
            "status": "ended",
            "duration_seconds": 60,
        }
    });
    let body = serde_json::to_vec(&body).unwrap();

    // signed with the wrong key
    let bad_signature = signature::sign_hex(&Credential::new("wrong-key".into()), &body);
    let headers = WebhookHeaders {
        signature: Some(bad_signature),
        timestamp: None,
    };

    let result = webhooks::handle_provider_webhook(
        &harness.app,
        Provider::ProviderA,
        "POST",
        "/webhook/provider-a",
        &headers,
        &body,
    )
    .await;

    assert!(matches!(result, Err(webhooks::WebhookError::Unauthorized(_))));
    assert!(harness
        .app
        .store
        .call_by_external(Provider::ProviderA, "call-evil")
        .unwrap()
        .is_none());
    assert!(harness.sink.events().is_empty());
}

/// Scenario: a correctly signed terminal webhook updates the call, emits
/// `call:ended`, and accrues per-minute usage for the client.
#[tokio::test]
async fn signed_terminal_webhook_fans_out() {
    let harness = TestApp::new();
    let tenant = harness.seed_tenant();
    let client = harness.seed_client_per_minute(10);
    let mut agent = harness.seed_agent();
    agent.client_id = Some(client.id.clone());
    harness.app.store.put_agent(agent).unwrap();

    let body = serde_json::json!({
        "type": "call.ended",
        "call": {
            "id": "call-77",
            "assistant_id": "ext-agent-1",
            "status": "ended",
            "direction": "outbound",
            "duration_seconds": 61,
            "cost": 0.40,
            "transcript": "hello there",
        }
    });
    let body = serde_json::to_vec(&body).unwrap();

    let key = tenant.provider_keys.provider_a.as_ref().unwrap();
    let headers = WebhookHeaders {
        signature: Some(signature::sign_hex(key, &body)),
        timestamp: None,
    };

    webhooks::handle_provider_webhook(
        &harness.app,
        Provider::ProviderA,
        "POST",
        "/webhook/provider-a",
        &headers,
        &body,
    )
    .await
    .unwrap();

    let call = harness
        .app
        .store
        .call_by_external(Provider::ProviderA, "call-77")
        .unwrap()
        .unwrap();
    assert_eq!(call.status, CallStatus::Completed);
    assert_eq!(call.duration_secs, 61);

    // fan-out runs on spawned tasks after the ack
    for _ in 0..100 {
        if !harness.sink.events().is_empty() {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }

    let events = harness.sink.events();
    assert!(events
        .iter()
        .any(|event| event.kind == CallEventKind::Ended && event.external_id == "call-77"));

    // 61s bills as 2 minutes at 10c/min
    for _ in 0..100 {
        if harness.app.store.usage_cents(&tenant.id, &client.id).unwrap() > 0 {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    assert_eq!(
        harness.app.store.usage_cents(&tenant.id, &client.id).unwrap(),
        20
    );
}

/// Scenario: a workflow with three CRM actions where the middle one hits a
/// 400 lands on partial_failure with an ordered, attempt-counted log.
#[tokio::test]
async fn workflow_partial_failure_is_recorded() {
    // in-process CRM A stand-in: tags and notes succeed, activity logging 400s
    let crm = Router::new()
        .route(
            "/contacts/{id}/tags",
            post(|| async { axum::http::StatusCode::OK }),
        )
        .route(
            "/contacts/{id}/activities",
            post(|| async { (axum::http::StatusCode::BAD_REQUEST, "no such contact") }),
        )
        .route(
            "/contacts/{id}/notes",
            post(|| async { axum::http::StatusCode::OK }),
        );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, crm).await.unwrap();
    });

    let mut config = Config::default();
    config.integration_endpoints.crm_a_api = format!("http://{}", addr);

    let harness = TestApp::with_config(config);
    let tenant = harness.seed_tenant();
    harness.seed_agent();
    harness.set_now("2026-07-21T18:05:00Z");

    let workflow_def = Workflow {
        id: WorkflowId::new("wf-post-call").unwrap(),
        tenant_id: tenant.id.clone(),
        agent_id: None,
        name: "post call sync".into(),
        trigger: WorkflowTrigger::CallEnded,
        conditions: Vec::new(),
        actions: vec![
            ActionConfig {
                kind: ActionKind::CrmAAddTags,
                config: serde_json::json!({"contact_id": "c-1", "tags": ["called"]}),
            },
            ActionConfig {
                kind: ActionKind::CrmALogCall,
                config: serde_json::json!({"contact_id": "c-1"}),
            },
            ActionConfig {
                kind: ActionKind::CrmAAddCallNote,
                config: serde_json::json!({"contact_id": "c-1", "note": "{{summary}}"}),
            },
        ],
        enabled: true,
        created_at: Timestamp::from_nanos(0),
    };
    harness.app.store.put_workflow(workflow_def.clone()).unwrap();

    // deliver a signed terminal webhook to drive the whole fan-out
    let body = serde_json::json!({
        "type": "call.ended",
        "call": {
            "id": "call-wf",
            "assistant_id": "ext-agent-1",
            "status": "ended",
            "duration_seconds": 120,
            "summary": "booked a cleaning",
        }
    });
    let body = serde_json::to_vec(&body).unwrap();
    let key = tenant.provider_keys.provider_a.as_ref().unwrap();
    let headers = WebhookHeaders {
        signature: Some(signature::sign_hex(key, &body)),
        timestamp: None,
    };
    webhooks::handle_provider_webhook(
        &harness.app,
        Provider::ProviderA,
        "POST",
        "/webhook/provider-a",
        &headers,
        &body,
    )
    .await
    .unwrap();

    let call = harness
        .app
        .store
        .call_by_external(Provider::ProviderA, "call-wf")
        .unwrap()
        .unwrap();

    // execution runs in the post-ack background; wait for the log
    let mut logs = Vec::new();
    for _ in 0..200 {
        logs = harness.app.store.execution_logs_for_call(&call.id).unwrap();
        if !logs.is_empty() {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(25)).await;
    }
    assert_eq!(logs.len(), 1, "expected one execution log");

    let log = &logs[0];
    assert_eq!(log.status, ExecutionStatus::PartialFailure);
    assert_eq!(log.actions_succeeded, 2);
    assert_eq!(log.actions_failed, 1);
    assert_eq!(log.actions.len(), 3);

    assert_eq!(log.actions[0].status, ActionOutcome::Success);
    assert_eq!(log.actions[1].status, ActionOutcome::Failed);
    // a 400 is fatal: exactly one attempt, no retries
    assert_eq!(log.actions[1].attempts, 1);
    assert!(log.actions[1].error.as_deref().unwrap().contains("400"));
    assert_eq!(log.actions[2].status, ActionOutcome::Success);
}

/// Scenario: two scheduler drivers race on the same due job; the CAS lease
/// lets exactly one dispatch it while the other skips without error.
#[tokio::test]
async fn concurrent_ticks_dispatch_a_job_exactly_once() {
    let harness = TestApp::new();
    harness.seed_tenant();
    harness.seed_agent();

    harness.set_now("2026-07-21T18:00:00Z");
    let job = dialplane_types::ScheduledCall {
        id: dialplane_types::ScheduledCallId::new("job-racy").unwrap(),
        tenant_id: dialplane_types::TenantId::new("tenant-1").unwrap(),
        client_id: None,
        agent_id: dialplane_types::AgentId::new("agent-1").unwrap(),
        phone: Phone::normalize("+14155551234").unwrap(),
        status: ScheduledCallStatus::Pending,
        scheduled_at: Timestamp::from(utc("2026-07-21T17:59:00Z")),
        original_scheduled_at: Timestamp::from(utc("2026-07-21T17:59:00Z")),
        lead_timezone: Some("America/Los_Angeles".into()),
        timezone_delayed: false,
        retry_count: 0,
        max_retries: 3,
        trigger_source: TriggerSource::Api,
        contact_id: None,
        metadata: Default::default(),
        external_call_id: None,
        error_message: None,
        completed_at: None,
        created_at: Timestamp::from_nanos(0),
    };
    harness.app.store.put_scheduled_call(job).unwrap();

    let app_a = harness.app.clone();
    let app_b = harness.app.clone();
    let (left, right) = tokio::join!(
        tokio::spawn(async move { scheduler::tick(&app_a).await.unwrap() }),
        tokio::spawn(async move { scheduler::tick(&app_b).await.unwrap() }),
    );
    let (left, right) = (left.unwrap(), right.unwrap());

    assert_eq!(left.completed + right.completed, 1);
    assert_eq!(harness.provider.initiations().len(), 1);

    let job = harness
        .app
        .store
        .scheduled_call(&dialplane_types::ScheduledCallId::new("job-racy").unwrap())
        .unwrap()
        .unwrap();
    assert_eq!(job.status, ScheduledCallStatus::Completed);
}

/// The workflow executor skips a workflow whose conditions fail, and the
/// log says so.
#[tokio::test]
async fn workflow_conditions_gate_execution() {
    let harness = TestApp::new();
    let tenant = harness.seed_tenant();
    let agent = harness.seed_agent();

    let workflow_def = Workflow {
        id: WorkflowId::new("wf-long-calls").unwrap(),
        tenant_id: tenant.id.clone(),
        agent_id: None,
        name: "long calls only".into(),
        trigger: WorkflowTrigger::CallEnded,
        conditions: vec![dialplane_types::Condition {
            field: "duration_secs".into(),
            operator: dialplane_types::ConditionOperator::Gt,
            value: serde_json::json!(300),
        }],
        actions: vec![ActionConfig {
            kind: ActionKind::ChatNotify,
            config: serde_json::json!({"message": "long call finished"}),
        }],
        enabled: true,
        created_at: Timestamp::from_nanos(0),
    };

    let call = {
        let event = dialplane_types::ProviderEvent {
            kind: dialplane_types::ProviderEventKind::Ended,
            provider: Provider::ProviderA,
            external_id: "call-short".into(),
            agent_external_id: agent.external_id.clone(),
            status: CallStatus::Completed,
            direction: dialplane_types::CallDirection::Outbound,
            from_number: None,
            to_number: None,
            started_at: None,
            ended_at: None,
            duration_secs: 45,
            cost_cents: 0,
            transcript: None,
            summary: None,
            voicemail: false,
            provider_meta: serde_json::Value::Null,
        };
        harness
            .app
            .store
            .upsert_call_event(&agent, &event, harness.clock.now())
            .unwrap()
            .call
    };

    let payload = webhooks::enriched_payload(&call, &agent);
    workflow::execute_all(&harness.app, vec![workflow_def], &call, payload).await;

    let logs = harness.app.store.execution_logs_for_call(&call.id).unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].status, ExecutionStatus::Skipped);
    assert!(logs[0].actions.is_empty());
}
