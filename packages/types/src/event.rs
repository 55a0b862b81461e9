use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{AgentId, CallDirection, CallId, CallStatus, Provider, TenantId, Timestamp};

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum CallEventKind {
    Started,
    Updated,
    Ended,
}

impl CallEventKind {
    /// The bus topic name, e.g. `call:ended`.
    pub fn topic(&self) -> &'static str {
        match self {
            CallEventKind::Started => "call:started",
            CallEventKind::Updated => "call:updated",
            CallEventKind::Ended => "call:ended",
        }
    }
}

/// A real-time event published on the broadcast bus, keyed by tenant.
/// Best-effort and non-durable; consumers that miss one poll instead.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, ToSchema)]
pub struct CallEvent {
    pub kind: CallEventKind,
    pub tenant_id: TenantId,
    pub call_id: CallId,
    pub provider: Provider,
    pub external_id: String,
    pub agent_id: AgentId,
    pub status: CallStatus,
    pub direction: CallDirection,
    pub duration_secs: u32,
    pub occurred_at: Timestamp,
}
