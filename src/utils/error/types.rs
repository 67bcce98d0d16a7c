//! Error types for the router core

use thiserror::Error;

/// Result type alias used throughout the crate
pub type Result<T> = std::result::Result<T, GatewayError>;

/// Unified error type returned by the router core.
///
/// Variants map onto the external error contract 1:1 (see
/// [`super::response::ErrorResponse`]); ambient concerns (config,
/// (de)serialization, io, the optional Redis store) are folded in alongside
/// so callers only ever match on one enum.
#[derive(Error, Debug)]
#[allow(dead_code)]
pub enum GatewayError {
    /// Malformed or semantically invalid request.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Missing or invalid credentials.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// No deployment, model group, or resource matching the request exists.
    #[error("not found: {0}")]
    NotFound(String),

    /// A provider or the router itself is rate limiting the caller.
    #[error("rate limited: {message}")]
    RateLimited {
        message: String,
        retry_after: Option<std::time::Duration>,
    },

    /// A provider call exceeded its deadline.
    #[error("timeout: {0}")]
    Timeout(String),

    /// A dependency (provider, store, cache backend) is temporarily down.
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),

    /// Unclassified failure on our side.
    #[error("internal error: {0}")]
    Internal(String),

    /// The request's context window does not fit the selected model.
    #[error("context window exceeded: requested {requested} tokens, max {max}")]
    ContextWindowExceeded { requested: usize, max: usize },

    /// A provider refused the request on content-policy grounds.
    #[error("content policy violation: {0}")]
    ContentPolicyViolation(String),

    /// Every deployment in the model group was unavailable (cooldown,
    /// unhealthy, or capacity-exhausted).
    #[error("no deployments available for model group '{model_group}' (attempted {attempted})")]
    NoDeploymentsAvailable {
        model_group: String,
        attempted: usize,
    },

    /// A configured budget (cost, token, or request) has been exhausted.
    #[error("budget exceeded: {0}")]
    BudgetExceeded(String),

    /// The request was cancelled by the caller before completion.
    #[error("request cancelled")]
    Cancelled,

    /// The backing state store is unreachable; callers may choose to
    /// degrade rather than fail the request outright.
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    /// Router or provider configuration is invalid or missing.
    #[error("configuration error: {0}")]
    Config(String),

    /// JSON (de)serialization failure.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Filesystem or network IO failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Redis-backed store failure (only constructible with the `redis` feature).
    #[cfg(feature = "redis")]
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Opaque error surfaced by a `ProviderClient` implementation that does
    /// not otherwise map onto a more specific variant above.
    #[error("provider error: {0}")]
    Provider(String),
}
