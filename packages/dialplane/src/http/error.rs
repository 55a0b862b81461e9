//! Error-to-status mapping at the HTTP boundary.
//!
//! Handlers convert subsystem errors into one of these; background tasks
//! never surface here. Auth failures are deliberately detail-free.

use axum::{http::StatusCode, response::IntoResponse, Json};

use crate::{
    ingress::IngressError,
    keys::KeyError,
    providers::ProviderError,
    store::StoreError,
    timezone::TimezoneError,
    webhooks::WebhookError,
};

use super::types::ApiResponse;

#[derive(Debug)]
pub enum ApiError {
    /// Schema failure, bad phone, disallowed value. Message goes to caller.
    Validation(String),
    /// Bad or missing signature/bearer. No detail, not logged with payload.
    Unauthorized,
    /// Cross-tenant access or missing permission.
    Forbidden,
    /// Entity missing or invisible to the caller, indistinguishably.
    NotFound,
    /// Entity in use.
    Conflict(String),
    RateLimited,
    /// Missing configuration the caller can fix.
    BadConfig(String),
    /// Transient provider/CRM failure after retries.
    Upstream(String),
    /// Missing configuration only the operator can fix.
    ServiceUnavailable(String),
    /// Unexpected. Caller gets a generic message; detail goes to the log.
    Internal(anyhow::Error),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ApiError::BadConfig(_) => StatusCode::BAD_REQUEST,
            ApiError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ApiError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn message(&self) -> String {
        match self {
            ApiError::Validation(msg) | ApiError::Conflict(msg) | ApiError::BadConfig(msg) => {
                msg.clone()
            }
            ApiError::Unauthorized => "unauthorized".to_string(),
            ApiError::Forbidden => "forbidden".to_string(),
            ApiError::NotFound => "not found".to_string(),
            ApiError::RateLimited => "rate limit exceeded".to_string(),
            ApiError::Upstream(msg) => format!("upstream provider failure: {}", msg),
            ApiError::ServiceUnavailable(msg) => msg.clone(),
            ApiError::Internal(_) => "internal error".to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        if let ApiError::Internal(err) = &self {
            tracing::error!(error = ?err, "request failed unexpectedly");
        }
        let body: ApiResponse<()> = ApiResponse::error(self.message());
        (self.status(), Json(body)).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::PhoneNumberExists { .. }
            | StoreError::AgentExternalIdExists(_)
            | StoreError::RunningExperimentExists(_) => ApiError::Conflict(err.to_string()),
            StoreError::DB(err) => ApiError::Internal(err),
        }
    }
}

impl From<IngressError> for ApiError {
    fn from(err: IngressError) -> Self {
        match err {
            IngressError::Phone(e) => ApiError::Validation(e.to_string()),
            IngressError::NoAgentConfigured => {
                ApiError::BadConfig("no agent configured for this trigger".to_string())
            }
            IngressError::ForeignAgent | IngressError::OutboundNotAllowed => ApiError::Forbidden,
            IngressError::Key(e) => e.into(),
            IngressError::Timezone(e) => ApiError::Validation(e.to_string()),
            IngressError::Provider(e) => e.into(),
            IngressError::Store(e) => e.into(),
        }
    }
}

impl From<KeyError> for ApiError {
    fn from(err: KeyError) -> Self {
        match err {
            KeyError::NotConfigured { .. } => ApiError::BadConfig(err.to_string()),
            KeyError::TenantNotFound(_) => ApiError::NotFound,
            KeyError::Store(e) => e.into(),
        }
    }
}

impl From<ProviderError> for ApiError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::NotFound { .. } => ApiError::NotFound,
            other => ApiError::Upstream(other.to_string()),
        }
    }
}

impl From<WebhookError> for ApiError {
    fn from(err: WebhookError) -> Self {
        match err {
            WebhookError::Unauthorized(_) => ApiError::Unauthorized,
            WebhookError::Store(e) => e.into(),
        }
    }
}

impl From<TimezoneError> for ApiError {
    fn from(err: TimezoneError) -> Self {
        ApiError::Validation(err.to_string())
    }
}
