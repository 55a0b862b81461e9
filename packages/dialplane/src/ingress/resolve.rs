use dialplane_types::{Agent, AgentId, Phone, Tenant, TriggerRequest, TriggerSource};

use crate::app::App;

use super::IngressError;

/// Resolve the agent a trigger should dial with, in priority order:
///
/// 1. explicit `agent_id` in the payload
/// 2. the source integration's configured default agent
/// 3. the outbound agent of the tenant phone number matching `from_number`
///
/// Anything else is `NoAgentConfigured`. An explicit id pointing at another
/// tenant's agent is a hard error, not a fallthrough.
pub fn resolve_agent(
    app: &App,
    tenant: &Tenant,
    source: TriggerSource,
    request: &TriggerRequest,
    from_number: Option<&Phone>,
) -> Result<Agent, IngressError> {
    if let Some(agent_id) = &request.agent_id {
        let agent = app
            .store
            .agent(agent_id)?
            .ok_or(IngressError::NoAgentConfigured)?;
        if agent.tenant_id != tenant.id {
            return Err(IngressError::ForeignAgent);
        }
        return Ok(agent);
    }

    let integration_default: Option<&AgentId> = match source {
        TriggerSource::CrmA => tenant
            .integrations
            .crm_a
            .as_ref()
            .and_then(|c| c.default_agent_id.as_ref()),
        TriggerSource::CrmB => tenant
            .integrations
            .crm_b
            .as_ref()
            .and_then(|c| c.default_agent_id.as_ref()),
        TriggerSource::Api | TriggerSource::Dashboard => None,
    };

    if let Some(agent_id) = integration_default {
        if let Some(agent) = app.store.agent(agent_id)? {
            if agent.tenant_id == tenant.id {
                return Ok(agent);
            }
        }
    }

    if let Some(from) = from_number {
        if let Some(record) = app.store.phone_number(&tenant.id, from.as_str())? {
            if let Some(agent_id) = &record.outbound_agent_id {
                if let Some(agent) = app.store.agent(agent_id)? {
                    if agent.tenant_id == tenant.id {
                        return Ok(agent);
                    }
                }
            }
        }
    }

    Err(IngressError::NoAgentConfigured)
}
