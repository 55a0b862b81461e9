use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use dialplane_types::{CallRecord, TriggerStatus};

use crate::scheduler::TickSummary;

/// Every endpoint answers with this envelope.
#[derive(Serialize, Deserialize, Debug, Clone, ToSchema)]
pub struct ApiResponse<T> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn data(data: T) -> Self {
        Self {
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            data: None,
            error: Some(message),
        }
    }
}

/// Successful trigger outcome, mirrored from the ingress decision.
#[derive(Serialize, Deserialize, Debug, Clone, ToSchema)]
pub struct TriggerResponse {
    pub status: TriggerStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheduled_call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lead_timezone: Option<String>,
    pub agent: String,
}

impl From<crate::ingress::TriggerOutcome> for TriggerResponse {
    fn from(outcome: crate::ingress::TriggerOutcome) -> Self {
        Self {
            status: outcome.status,
            call_id: outcome.call_id,
            scheduled_call_id: outcome.scheduled_call_id.map(|id| id.to_string()),
            lead_timezone: outcome.lead_timezone,
            agent: outcome.agent_name,
        }
    }
}

/// Provider webhooks always ack with this unless the signature fails.
#[derive(Serialize, Deserialize, Debug, Clone, ToSchema)]
pub struct WebhookAck {
    pub received: bool,
}

impl WebhookAck {
    pub fn received() -> Self {
        Self { received: true }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, ToSchema)]
pub struct CronResponse {
    pub summary: TickSummary,
}

#[derive(Serialize, Deserialize, Debug, Clone, ToSchema)]
pub struct ActiveCallsResponse {
    pub calls: Vec<CallRecord>,
}

#[derive(Serialize, Deserialize, Debug, Clone, ToSchema)]
pub struct LiveCallResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub call: Option<CallRecord>,
    /// Whether the record came from the store or straight from the provider.
    pub source: LiveCallSource,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum LiveCallSource {
    Store,
    Provider,
}

#[derive(Serialize, Deserialize, Debug, Clone, ToSchema)]
pub struct EndCallResponse {
    pub ended: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, ToSchema)]
pub struct WidgetSessionResponse {
    pub token: String,
    pub expires_at: String,
    pub widget: WidgetDisplay,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub return_url: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, ToSchema)]
pub struct WidgetDisplay {
    pub color: String,
    pub display: serde_json::Value,
}

#[derive(Serialize, Deserialize, Debug, Clone, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}
