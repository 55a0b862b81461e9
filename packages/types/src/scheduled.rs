use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{AgentId, CallMetadata, ClientId, Phone, ScheduledCallId, TenantId, Timestamp};

pub const DEFAULT_MAX_RETRIES: u32 = 3;

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum TriggerSource {
    CrmA,
    CrmB,
    Api,
    Dashboard,
}

impl TriggerSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerSource::CrmA => "crm_a",
            TriggerSource::CrmB => "crm_b",
            TriggerSource::Api => "api",
            TriggerSource::Dashboard => "dashboard",
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ScheduledCallStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    Cancelled,
}

impl ScheduledCallStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ScheduledCallStatus::Completed
                | ScheduledCallStatus::Failed
                | ScheduledCallStatus::Cancelled
        )
    }
}

/// A pending outbound intent. Transitions out of `pending` happen only via
/// the scheduler's compare-and-set lease; `cancelled` is set externally and
/// never touched by the scheduler.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, ToSchema)]
pub struct ScheduledCall {
    pub id: ScheduledCallId,
    pub tenant_id: TenantId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<ClientId>,
    pub agent_id: AgentId,
    pub phone: Phone,
    pub status: ScheduledCallStatus,
    pub scheduled_at: Timestamp,
    /// What the caller originally asked for ("now" when the trigger carried
    /// no schedule time). Observability only; the scheduler never reads it.
    pub original_scheduled_at: Timestamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lead_timezone: Option<String>,
    pub timezone_delayed: bool,
    pub retry_count: u32,
    pub max_retries: u32,
    pub trigger_source: TriggerSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact_id: Option<String>,
    #[serde(default)]
    pub metadata: CallMetadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<Timestamp>,
    pub created_at: Timestamp,
}

impl ScheduledCall {
    pub fn retries_exhausted(&self) -> bool {
        self.retry_count + 1 >= self.max_retries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states() {
        assert!(!ScheduledCallStatus::Pending.is_terminal());
        assert!(!ScheduledCallStatus::InProgress.is_terminal());
        assert!(ScheduledCallStatus::Completed.is_terminal());
        assert!(ScheduledCallStatus::Failed.is_terminal());
        assert!(ScheduledCallStatus::Cancelled.is_terminal());
    }
}
