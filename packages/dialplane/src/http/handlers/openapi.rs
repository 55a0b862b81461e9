use utoipa::{
    openapi::security::{Http, HttpAuthScheme, SecurityScheme},
    Modify, OpenApi,
};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "dialplane",
        description = "Outbound call lifecycle engine: trigger ingress, scheduler, provider webhooks, workflows."
    ),
    modifiers(&BearerSchemes),
    paths(
        super::triggers::handle_trigger_crm_a,
        super::triggers::handle_trigger_crm_b,
        super::triggers::handle_trigger_api,
        super::triggers::handle_trigger_schedule,
        super::webhooks::handle_provider_webhook,
        super::cron::handle_process_scheduled,
        super::calls::handle_active_calls,
        super::calls::handle_end_call,
        super::calls::handle_live_call,
        super::widget::handle_widget_session,
        super::health::handle_health,
    ),
    components(schemas(
        dialplane_types::TriggerRequest,
        dialplane_types::TriggerStatus,
        dialplane_types::CallRecord,
        dialplane_types::CallStatus,
        dialplane_types::CallDirection,
        crate::http::types::TriggerResponse,
        crate::http::types::WebhookAck,
        crate::http::types::CronResponse,
        crate::http::types::ActiveCallsResponse,
        crate::http::types::LiveCallResponse,
        crate::http::types::EndCallResponse,
        crate::http::types::WidgetSessionResponse,
        crate::http::types::HealthResponse,
    ))
)]
pub struct ApiDoc;

struct BearerSchemes;

impl Modify for BearerSchemes {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "partner_api_key",
            SecurityScheme::Http(Http::new(HttpAuthScheme::Bearer)),
        );
        components.add_security_scheme(
            "cron_secret",
            SecurityScheme::Http(Http::new(HttpAuthScheme::Bearer)),
        );
    }
}
