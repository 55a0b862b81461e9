use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{
    AgentId, CallId, ClientId, ExperimentId, Provider, TenantId, Timestamp, TriggerSource,
    VariantId,
};

/// Transcripts are capped at ingest; anything longer is truncated.
pub const TRANSCRIPT_MAX_CHARS: usize = 500_000;

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum CallStatus {
    Queued,
    InProgress,
    Completed,
    Failed,
}

impl CallStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, CallStatus::Completed | CallStatus::Failed)
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum CallDirection {
    Inbound,
    Outbound,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Sentiment {
    Positive,
    Neutral,
    Negative,
}

/// AI-derived fields, populated asynchronously after a call completes.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, ToSchema)]
pub struct CallAnalysis {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sentiment: Option<Sentiment>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub topics: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

/// Correlation data stamped onto a call at dispatch time.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, ToSchema)]
pub struct CallMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lead_timezone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger_source: Option<TriggerSource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub experiment_id: Option<ExperimentId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant_id: Option<VariantId>,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub extra: serde_json::Value,
}

/// The canonical call record. Upserts key on `(provider, external_id)`;
/// a record is created by whichever arrives first, dispatch or webhook.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, ToSchema)]
pub struct CallRecord {
    pub id: CallId,
    pub tenant_id: TenantId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<ClientId>,
    pub agent_id: AgentId,
    pub provider: Provider,
    pub external_id: String,
    pub status: CallStatus,
    pub direction: CallDirection,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<Timestamp>,
    pub duration_secs: u32,
    pub cost_cents: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transcript: Option<String>,
    pub voicemail: bool,
    #[serde(default)]
    pub analysis: CallAnalysis,
    #[serde(default)]
    pub metadata: CallMetadata,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl CallRecord {
    /// Enforce the transcript cap in place.
    pub fn cap_transcript(&mut self) {
        if let Some(t) = &mut self.transcript {
            if t.chars().count() > TRANSCRIPT_MAX_CHARS {
                *t = t.chars().take(TRANSCRIPT_MAX_CHARS).collect();
            }
        }
    }
}

/// A provider's view of a call, as returned by fetch/list operations.
/// The adapter translates each provider's shape into this.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, ToSchema)]
pub struct CallSnapshot {
    pub provider: Provider,
    pub external_id: String,
    pub agent_external_id: String,
    pub status: CallStatus,
    pub direction: CallDirection,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<Timestamp>,
    pub duration_secs: u32,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ProviderEventKind {
    Started,
    Updated,
    Ended,
    Transcript,
}

/// A provider webhook event normalized into one shape. Produced by the
/// adapter's `parse_webhook`; consumed by webhook ingress.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, ToSchema)]
pub struct ProviderEvent {
    pub kind: ProviderEventKind,
    pub provider: Provider,
    pub external_id: String,
    pub agent_external_id: String,
    pub status: CallStatus,
    pub direction: CallDirection,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<Timestamp>,
    pub duration_secs: u32,
    pub cost_cents: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transcript: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    pub voicemail: bool,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub provider_meta: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_statuses() {
        assert!(!CallStatus::Queued.is_terminal());
        assert!(!CallStatus::InProgress.is_terminal());
        assert!(CallStatus::Completed.is_terminal());
        assert!(CallStatus::Failed.is_terminal());
    }

    #[test]
    fn transcript_cap() {
        let mut call = CallRecord {
            id: CallId::generate(),
            tenant_id: TenantId::new("tenant-1").unwrap(),
            client_id: None,
            agent_id: AgentId::new("agent-1").unwrap(),
            provider: Provider::ProviderA,
            external_id: "ext".into(),
            status: CallStatus::Completed,
            direction: CallDirection::Outbound,
            from_number: None,
            to_number: None,
            started_at: None,
            ended_at: None,
            duration_secs: 0,
            cost_cents: 0,
            transcript: Some("x".repeat(TRANSCRIPT_MAX_CHARS + 10)),
            voicemail: false,
            analysis: CallAnalysis::default(),
            metadata: CallMetadata::default(),
            created_at: Timestamp::from_nanos(0),
            updated_at: Timestamp::from_nanos(0),
        };
        call.cap_transcript();
        assert_eq!(call.transcript.unwrap().len(), TRANSCRIPT_MAX_CHARS);
    }
}
