use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{AgentId, ClientId, Phone, Provider, TenantId, Timestamp};

pub const DEFAULT_WIDGET_COLOR: &str = "#0f172a";

fn default_widget_color() -> String {
    DEFAULT_WIDGET_COLOR.to_string()
}

/// Embeddable web-widget settings for an agent. The display config is opaque
/// to the core and handed to the widget as-is.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, ToSchema)]
pub struct WidgetConfig {
    pub enabled: bool,
    #[serde(default = "default_widget_color")]
    pub color: String,
    #[serde(default)]
    pub display: serde_json::Value,
}

impl Default for WidgetConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            color: default_widget_color(),
            display: serde_json::Value::Null,
        }
    }
}

/// A voice-agent definition, pinned to one provider under an
/// externally-issued identifier. The configuration blob belongs to the
/// provider and is opaque to the core.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, ToSchema)]
pub struct Agent {
    pub id: AgentId,
    pub tenant_id: TenantId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<ClientId>,
    pub name: String,
    pub provider: Provider,
    /// The id the provider knows this agent by.
    pub external_id: String,
    /// The agent's default prompt; experiments override it per variant.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    #[serde(default)]
    pub config: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub widget: Option<WidgetConfig>,
    pub created_at: Timestamp,
}

impl Agent {
    pub fn widget_enabled(&self) -> bool {
        self.widget.as_ref().is_some_and(|w| w.enabled)
    }
}

/// A tenant-owned phone number, bound to one provider. Unique per
/// `(tenant, number)`. Inbound and outbound agents are tracked separately.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, ToSchema)]
pub struct PhoneNumber {
    pub tenant_id: TenantId,
    pub number: Phone,
    pub provider: Provider,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inbound_agent_id: Option<AgentId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outbound_agent_id: Option<AgentId>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn widget_color_defaults() {
        let w: WidgetConfig = serde_json::from_str(r#"{"enabled":true}"#).unwrap();
        assert_eq!(w.color, DEFAULT_WIDGET_COLOR);
    }

    #[test]
    fn widget_enabled_requires_config() {
        let mut agent: Agent = serde_json::from_value(serde_json::json!({
            "id": "agent-1",
            "tenant_id": "tenant-1",
            "name": "Receptionist",
            "provider": "provider_a",
            "external_id": "ext-123",
            "created_at": 0,
        }))
        .unwrap();
        assert!(!agent.widget_enabled());

        agent.widget = Some(WidgetConfig {
            enabled: true,
            ..Default::default()
        });
        assert!(agent.widget_enabled());
    }
}
