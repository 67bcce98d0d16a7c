//! Constructor helpers for [`GatewayError`]

use super::types::GatewayError;
use std::time::Duration;

/// Convenience constructors mirroring the variant set in `types.rs`.
#[allow(dead_code)]
impl GatewayError {
    pub fn bad_request<S: Into<String>>(message: S) -> Self {
        Self::BadRequest(message.into())
    }

    pub fn unauthorized<S: Into<String>>(message: S) -> Self {
        Self::Unauthorized(message.into())
    }

    pub fn not_found<S: Into<String>>(message: S) -> Self {
        Self::NotFound(message.into())
    }

    pub fn rate_limited<S: Into<String>>(message: S, retry_after: Option<Duration>) -> Self {
        Self::RateLimited {
            message: message.into(),
            retry_after,
        }
    }

    pub fn timeout<S: Into<String>>(message: S) -> Self {
        Self::Timeout(message.into())
    }

    pub fn service_unavailable<S: Into<String>>(message: S) -> Self {
        Self::ServiceUnavailable(message.into())
    }

    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal(message.into())
    }

    pub fn context_window_exceeded(requested: usize, max: usize) -> Self {
        Self::ContextWindowExceeded { requested, max }
    }

    pub fn content_policy_violation<S: Into<String>>(message: S) -> Self {
        Self::ContentPolicyViolation(message.into())
    }

    pub fn no_deployments_available<S: Into<String>>(model_group: S, attempted: usize) -> Self {
        Self::NoDeploymentsAvailable {
            model_group: model_group.into(),
            attempted,
        }
    }

    pub fn budget_exceeded<S: Into<String>>(message: S) -> Self {
        Self::BudgetExceeded(message.into())
    }

    pub fn store_unavailable<S: Into<String>>(message: S) -> Self {
        Self::StoreUnavailable(message.into())
    }

    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config(message.into())
    }

    pub fn provider<S: Into<String>>(message: S) -> Self {
        Self::Provider(message.into())
    }
}
