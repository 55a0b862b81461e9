use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{AgentId, CallId, ExecutionLogId, TenantId, Timestamp, WorkflowId};

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowTrigger {
    CallEnded,
    InboundCallEnded,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, ToSchema)]
pub enum ConditionOperator {
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = "!=")]
    NotEq,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = ">=")]
    Gte,
    #[serde(rename = "<=")]
    Lte,
    #[serde(rename = "contains")]
    Contains,
    #[serde(rename = "not_contains")]
    NotContains,
}

/// One AND-ed condition over the enriched call payload. `field` is a dotted
/// path; a missing field fails every operator.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, ToSchema)]
pub struct Condition {
    pub field: String,
    pub operator: ConditionOperator,
    pub value: serde_json::Value,
}

/// The closed action registry. Adding a kind here is the only way to make a
/// new action configurable; payloads arrive as opaque per-kind config.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    // generic outbound HTTP
    Webhook,

    // CRM A (location-scoped, API-key auth)
    CrmALogCall,
    CrmAUpsertContact,
    CrmAAddTags,
    CrmARemoveTags,
    CrmAUpdatePipelineStage,
    CrmASetLeadScore,
    CrmABookAppointment,
    CrmACancelAppointment,
    CrmAAddCallNote,
    CrmATriggerWorkflow,
    CrmAUpdateField,

    // CRM B (portal-scoped, OAuth)
    CrmBLogCall,
    CrmBUpsertContact,
    CrmBAddTags,
    CrmBRemoveTags,
    CrmBUpdatePipelineStage,
    CrmBSetLeadScore,
    CrmBBookAppointment,
    CrmBCancelAppointment,
    CrmBAddCallNote,
    CrmBTriggerWorkflow,
    CrmBUpdateField,

    // calendar vendor
    CalendarBookEvent,
    CalendarCancelEvent,
    CalendarCheckAvailability,

    // scheduling vendor
    BookingCheckAvailability,
    BookingCreateLink,
    BookingCancel,

    // messaging
    SendSms,
    SendEmail,
    ChatNotify,
}

impl ActionKind {
    /// Whether a failure of this action is allowed to stop the remaining
    /// actions. Contact upserts are the anchor for everything that follows
    /// them; nothing else (webhooks included) short-circuits.
    pub fn may_fatal_stop(&self) -> bool {
        matches!(self, ActionKind::CrmAUpsertContact | ActionKind::CrmBUpsertContact)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Webhook => "webhook",
            ActionKind::CrmALogCall => "crm_a_log_call",
            ActionKind::CrmAUpsertContact => "crm_a_upsert_contact",
            ActionKind::CrmAAddTags => "crm_a_add_tags",
            ActionKind::CrmARemoveTags => "crm_a_remove_tags",
            ActionKind::CrmAUpdatePipelineStage => "crm_a_update_pipeline_stage",
            ActionKind::CrmASetLeadScore => "crm_a_set_lead_score",
            ActionKind::CrmABookAppointment => "crm_a_book_appointment",
            ActionKind::CrmACancelAppointment => "crm_a_cancel_appointment",
            ActionKind::CrmAAddCallNote => "crm_a_add_call_note",
            ActionKind::CrmATriggerWorkflow => "crm_a_trigger_workflow",
            ActionKind::CrmAUpdateField => "crm_a_update_field",
            ActionKind::CrmBLogCall => "crm_b_log_call",
            ActionKind::CrmBUpsertContact => "crm_b_upsert_contact",
            ActionKind::CrmBAddTags => "crm_b_add_tags",
            ActionKind::CrmBRemoveTags => "crm_b_remove_tags",
            ActionKind::CrmBUpdatePipelineStage => "crm_b_update_pipeline_stage",
            ActionKind::CrmBSetLeadScore => "crm_b_set_lead_score",
            ActionKind::CrmBBookAppointment => "crm_b_book_appointment",
            ActionKind::CrmBCancelAppointment => "crm_b_cancel_appointment",
            ActionKind::CrmBAddCallNote => "crm_b_add_call_note",
            ActionKind::CrmBTriggerWorkflow => "crm_b_trigger_workflow",
            ActionKind::CrmBUpdateField => "crm_b_update_field",
            ActionKind::CalendarBookEvent => "calendar_book_event",
            ActionKind::CalendarCancelEvent => "calendar_cancel_event",
            ActionKind::CalendarCheckAvailability => "calendar_check_availability",
            ActionKind::BookingCheckAvailability => "booking_check_availability",
            ActionKind::BookingCreateLink => "booking_create_link",
            ActionKind::BookingCancel => "booking_cancel",
            ActionKind::SendSms => "send_sms",
            ActionKind::SendEmail => "send_email",
            ActionKind::ChatNotify => "chat_notify",
        }
    }
}

/// One configured action inside a workflow. Config strings may carry
/// `{{dotted.path}}` placeholders interpolated from the call payload.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, ToSchema)]
pub struct ActionConfig {
    #[serde(rename = "type")]
    pub kind: ActionKind,
    #[serde(default)]
    pub config: serde_json::Value,
}

/// A post-call pipeline: trigger tag + AND-conditions + ordered actions.
/// Scoped to one agent or (with `agent_id: None`) to all of the tenant's
/// agents.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, ToSchema)]
pub struct Workflow {
    pub id: WorkflowId,
    pub tenant_id: TenantId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<AgentId>,
    pub name: String,
    pub trigger: WorkflowTrigger,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    pub actions: Vec<ActionConfig>,
    pub enabled: bool,
    pub created_at: Timestamp,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ActionOutcome {
    Success,
    Failed,
    Skipped,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Completed,
    PartialFailure,
    Failed,
    Skipped,
}

/// Per-action result row inside an execution log.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, ToSchema)]
pub struct ActionResult {
    pub index: usize,
    #[serde(rename = "type")]
    pub kind: ActionKind,
    pub status: ActionOutcome,
    pub started_at: Timestamp,
    pub completed_at: Timestamp,
    pub duration_ms: u64,
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Immutable record tying a call to one workflow execution. Written once,
/// after the final status is known.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, ToSchema)]
pub struct ExecutionLog {
    pub id: ExecutionLogId,
    pub tenant_id: TenantId,
    pub workflow_id: WorkflowId,
    pub call_id: CallId,
    pub status: ExecutionStatus,
    pub actions_succeeded: u32,
    pub actions_failed: u32,
    pub actions: Vec<ActionResult>,
    pub started_at: Timestamp,
    pub completed_at: Timestamp,
}

/// Fold per-action outcomes into the workflow aggregate: `completed` iff
/// every action succeeded, `failed` iff none did (and something failed),
/// `skipped` when nothing ran at all, `partial_failure` otherwise.
pub fn aggregate_status(results: &[ActionResult]) -> ExecutionStatus {
    let succeeded = results
        .iter()
        .filter(|r| r.status == ActionOutcome::Success)
        .count();
    let failed = results
        .iter()
        .filter(|r| r.status == ActionOutcome::Failed)
        .count();
    let skipped = results
        .iter()
        .filter(|r| r.status == ActionOutcome::Skipped)
        .count();

    if failed == 0 && skipped == 0 {
        ExecutionStatus::Completed
    } else if succeeded == 0 && failed == 0 {
        ExecutionStatus::Skipped
    } else if succeeded == 0 {
        ExecutionStatus::Failed
    } else {
        ExecutionStatus::PartialFailure
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(index: usize, status: ActionOutcome) -> ActionResult {
        ActionResult {
            index,
            kind: ActionKind::Webhook,
            status,
            started_at: Timestamp::from_nanos(0),
            completed_at: Timestamp::from_nanos(0),
            duration_ms: 0,
            attempts: 1,
            error: None,
        }
    }

    #[test]
    fn aggregation_matrix() {
        use ActionOutcome::*;

        assert_eq!(
            aggregate_status(&[result(0, Success), result(1, Success)]),
            ExecutionStatus::Completed
        );
        assert_eq!(
            aggregate_status(&[result(0, Success), result(1, Failed)]),
            ExecutionStatus::PartialFailure
        );
        assert_eq!(
            aggregate_status(&[result(0, Failed), result(1, Failed)]),
            ExecutionStatus::Failed
        );
        assert_eq!(aggregate_status(&[]), ExecutionStatus::Completed);
        // timed-out tail: something succeeded, rest skipped
        assert_eq!(
            aggregate_status(&[result(0, Success), result(1, Skipped)]),
            ExecutionStatus::PartialFailure
        );
        assert_eq!(
            aggregate_status(&[result(0, Skipped), result(1, Skipped)]),
            ExecutionStatus::Skipped
        );
    }

    #[test]
    fn operator_wire_names() {
        assert_eq!(
            serde_json::to_string(&ConditionOperator::Eq).unwrap(),
            "\"==\""
        );
        assert_eq!(
            serde_json::to_string(&ConditionOperator::NotContains).unwrap(),
            "\"not_contains\""
        );
    }

    #[test]
    fn action_registry_wire_names_are_unique() {
        let kinds = [
            ActionKind::Webhook,
            ActionKind::CrmALogCall,
            ActionKind::CrmBUpsertContact,
            ActionKind::CalendarBookEvent,
            ActionKind::BookingCancel,
            ActionKind::ChatNotify,
        ];
        let mut names: Vec<&str> = kinds.iter().map(|k| k.as_str()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), kinds.len());
    }

    #[test]
    fn fatal_stop_is_limited_to_upserts() {
        assert!(ActionKind::CrmAUpsertContact.may_fatal_stop());
        assert!(ActionKind::CrmBUpsertContact.may_fatal_stop());
        assert!(!ActionKind::Webhook.may_fatal_stop());
        assert!(!ActionKind::SendSms.may_fatal_stop());
    }
}
