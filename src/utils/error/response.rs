//! Wire-level error payload
//!
//! Customer-facing HTTP framing is out of scope for this crate; callers that
//! do expose one are expected to translate [`GatewayError`] into their own
//! status-code scheme. What we provide is the stable JSON shape from the
//! external interface contract: `{kind, message, provider?, deployment?,
//! status_code?, retry_after?}`.

use super::types::GatewayError;
use serde::Serialize;

/// Standard error response envelope.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

/// Error detail matching the external error contract.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorDetail {
    pub kind: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deployment: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_secs: Option<u64>,
}

impl GatewayError {
    /// Stable string tag for this error's kind, for callers that need to
    /// branch on error category without matching the full enum.
    pub fn kind(&self) -> &'static str {
        match self {
            GatewayError::BadRequest(_) => "bad_request",
            GatewayError::Unauthorized(_) => "unauthorized",
            GatewayError::NotFound(_) => "not_found",
            GatewayError::RateLimited { .. } => "rate_limited",
            GatewayError::Timeout(_) => "timeout",
            GatewayError::ServiceUnavailable(_) => "service_unavailable",
            GatewayError::Internal(_) => "internal_error",
            GatewayError::ContextWindowExceeded { .. } => "context_window_exceeded",
            GatewayError::ContentPolicyViolation(_) => "content_policy_violation",
            GatewayError::NoDeploymentsAvailable { .. } => "no_deployments_available",
            GatewayError::BudgetExceeded(_) => "budget_exceeded",
            GatewayError::Cancelled => "cancelled",
            GatewayError::StoreUnavailable(_) => "store_unavailable",
            GatewayError::Config(_) => "configuration_error",
            GatewayError::Serialization(_) => "serialization_error",
            GatewayError::Io(_) => "io_error",
            #[cfg(feature = "redis")]
            GatewayError::Redis(_) => "store_unavailable",
            GatewayError::Provider(_) => "provider_error",
        }
    }

    /// Convert into the wire-level payload. `provider`/`deployment` are
    /// supplied by the caller since `GatewayError` carries no routing
    /// context of its own beyond what's embedded in the message.
    pub fn to_response(
        &self,
        provider: Option<String>,
        deployment: Option<String>,
    ) -> ErrorResponse {
        let retry_after_secs = match self {
            GatewayError::RateLimited { retry_after, .. } => retry_after.map(|d| d.as_secs()),
            _ => None,
        };

        ErrorResponse {
            error: ErrorDetail {
                kind: self.kind(),
                message: self.to_string(),
                provider,
                deployment,
                status_code: None,
                retry_after_secs,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::types::GatewayError;

    #[test]
    fn rate_limited_carries_retry_after() {
        let err = GatewayError::rate_limited("too many requests", Some(std::time::Duration::from_secs(5)));
        let resp = err.to_response(Some("openai".into()), Some("gpt-4-east".into()));
        assert_eq!(resp.error.kind, "rate_limited");
        assert_eq!(resp.error.retry_after_secs, Some(5));
        assert_eq!(resp.error.provider.as_deref(), Some("openai"));
    }

    #[test]
    fn no_deployments_available_kind() {
        let err = GatewayError::no_deployments_available("gpt-4", 3);
        assert_eq!(err.kind(), "no_deployments_available");
    }
}
