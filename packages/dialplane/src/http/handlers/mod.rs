pub mod calls;
pub mod cron;
pub mod health;
mod not_found;
pub(crate) mod openapi;
pub mod triggers;
pub mod webhooks;
pub mod widget;

pub use calls::{handle_active_calls, handle_end_call, handle_live_call};
pub use cron::handle_process_scheduled;
pub use health::handle_health;
pub use not_found::handle_not_found;
pub use triggers::{
    handle_trigger_api, handle_trigger_crm_a, handle_trigger_crm_b, handle_trigger_schedule,
};
pub use webhooks::handle_provider_webhook;
pub use widget::handle_widget_session;
