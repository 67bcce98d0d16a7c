//! `ProviderClient`: the external interface boundary
//!
//! Per-provider wire translation (request/response shape, auth headers, URL
//! assembly) is explicitly out of scope for this crate. The core only ever
//! depends on the narrow [`ProviderClient`] trait; a real deployment wires
//! up one implementation per upstream provider (OpenAI, Azure, Anthropic,
//! ...) outside this crate. [`test_provider`] supplies the single
//! illustrative in-memory implementation used by this crate's own tests.

pub mod test_provider;

pub use test_provider::{ScriptedOutcome, TestProviderClient};

use crate::core::router::deployment::Deployment;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// The call shape a deployment serves, matching the health-check mode list
/// carried from `health_check_helpers.py`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallMode {
    Chat,
    Completion,
    Embedding,
    AudioSpeech,
    AudioTranscription,
    ImageGeneration,
    VideoGeneration,
    Rerank,
    Realtime,
    Batch,
    Responses,
    Ocr,
}

impl CallMode {
    /// Whether a response for this call shape may ever be cached. `Realtime` and `Batch` are the two
    /// modes in this crate's mode list whose responses are not a stable,
    /// replayable artifact of the request alone.
    pub fn is_cacheable(&self) -> bool {
        !matches!(self, CallMode::Realtime | CallMode::Batch)
    }
}

/// An opaque, already-translated request handed to a provider. The router
/// never inspects `params` beyond what it needs for fingerprinting/token
/// estimation (see [`crate::core::cache::fingerprint`] and
/// [`crate::core::router::selector::estimate_input_tokens`]).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderRequest {
    pub mode: CallMode,
    pub params: Value,
    pub stream: bool,
}

/// Token usage reported by the provider for a completed call.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

/// A provider's response to a single [`ProviderClient::invoke`] call.
#[derive(Debug, Clone)]
pub struct ProviderResponse {
    pub body: Value,
    pub usage: Usage,
    /// When this call was streamed, the instant the first token arrived;
    /// used to compute TTFT. `None` for non-streaming calls.
    pub completion_start: Option<Instant>,
}

/// Error classification used by the retry/fallback engine and metrics
/// recorder. A [`ProviderClient`] implementation is responsible for
/// translating its own provider-specific error shapes into this set before
/// returning a [`ProviderCallError`] from `invoke`/`probe` — the router
/// itself never inspects a raw provider error.
#[derive(Debug, Clone, PartialEq)]
pub enum ErrorKind {
    BadRequest,
    Unauthorized,
    NotFound,
    RateLimited { retry_after: Option<Duration> },
    Timeout,
    ServiceUnavailable,
    InternalServerError,
    ConnectionError,
    ContextWindowExceeded { requested: usize, max: usize },
    ContentPolicyViolation,
    Cancelled,
}

impl ErrorKind {
    /// Whether this error class should penalize latency / trigger
    /// cooldown consideration at all.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ErrorKind::ConnectionError
                | ErrorKind::Timeout
                | ErrorKind::ServiceUnavailable
                | ErrorKind::InternalServerError
                | ErrorKind::RateLimited { .. }
                | ErrorKind::Unauthorized
                | ErrorKind::NotFound
        )
    }

    /// How the retry engine should react.
    pub fn retry_class(&self) -> RetryClass {
        match self {
            ErrorKind::RateLimited { retry_after } => RetryClass::RetriableSame {
                retry_after: *retry_after,
            },
            ErrorKind::ConnectionError
            | ErrorKind::Timeout
            | ErrorKind::ServiceUnavailable
            | ErrorKind::InternalServerError
            | ErrorKind::Unauthorized
            | ErrorKind::NotFound => RetryClass::RetriableOther,
            ErrorKind::BadRequest
            | ErrorKind::ContextWindowExceeded { .. }
            | ErrorKind::ContentPolicyViolation => RetryClass::NonRetriable,
            ErrorKind::Cancelled => RetryClass::Cancelled,
        }
    }
}

/// How the retry engine should react to a classified error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryClass {
    /// 429-style: sleep `retry_after` and retry the *same* deployment.
    RetriableSame { retry_after: Option<Duration> },
    /// 5xx/timeout/connection-style: cool the deployment down, try another.
    RetriableOther,
    /// Terminal: surface to the caller immediately.
    NonRetriable,
    /// The caller cancelled; stop retrying, no further telemetry.
    Cancelled,
}

impl RetryClass {
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            RetryClass::RetriableSame { retry_after } => *retry_after,
            _ => None,
        }
    }
}

/// Error returned by a [`ProviderClient`] call.
#[derive(Debug, Clone)]
pub struct ProviderCallError {
    pub kind: ErrorKind,
    pub message: String,
    pub provider: Option<String>,
    pub status_code: Option<u16>,
}

impl std::fmt::Display for ProviderCallError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ProviderCallError {}

/// The external interface every provider integration satisfies.
/// Implementations must not mutate `deployment`; they may cache idempotent
/// artifacts (e.g. auth tokens) internally.
#[async_trait]
pub trait ProviderClient: Send + Sync + Debug {
    /// Invoke the provider for `request` against `deployment`, aborting if
    /// `deadline` passes.
    async fn invoke(
        &self,
        deployment: &Deployment,
        request: &ProviderRequest,
        deadline: Instant,
    ) -> Result<ProviderResponse, ProviderCallError>;

    /// A minimal, known-cheap health call for `mode` against `deployment`.
    async fn probe(
        &self,
        deployment: &Deployment,
        mode: CallMode,
        deadline: Instant,
    ) -> Result<Duration, ProviderCallError>;
}

/// Resolves the [`ProviderClient`] responsible for a given [`Deployment`],
/// keyed by the `provider` field of
/// `provider_params` (e.g. `"openai"`, `"azure"`). A deployment that omits
/// the field, or names a provider with nothing registered, falls back to
/// whichever client was registered as the default — so a single-provider
/// deployment (or this crate's own tests) never needs to populate the map
/// at all.
///
/// Also itself implements [`ProviderClient`], so a [`Router`](crate::core::router::router::Router)
/// can hand the whole registry to [`crate::core::router::retry::RetryFallbackEngine`]
/// and [`crate::core::router::health::HealthChecker`] as if it were one
/// client; each call dispatches to the deployment-appropriate entry.
#[derive(Default)]
pub struct ProviderRegistry {
    clients: HashMap<String, Arc<dyn ProviderClient>>,
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.clients.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `client` as the handler for `provider_name`.
    pub fn register(&mut self, provider_name: impl Into<String>, client: Arc<dyn ProviderClient>) {
        self.clients.insert(provider_name.into(), client);
    }

    /// Register `client` as the catch-all used when a deployment names no
    /// provider, or one with nothing registered.
    pub fn register_default(&mut self, client: Arc<dyn ProviderClient>) {
        self.clients.insert("default".to_string(), client);
    }

    fn provider_name_of(deployment: &Deployment) -> Option<&str> {
        deployment
            .provider_params
            .get("provider")
            .and_then(Value::as_str)
    }

    /// Resolve the client that should serve `deployment`.
    pub fn resolve(&self, deployment: &Deployment) -> Option<Arc<dyn ProviderClient>> {
        Self::provider_name_of(deployment)
            .and_then(|name| self.clients.get(name))
            .or_else(|| self.clients.get("default"))
            .cloned()
    }

    fn not_found_error(deployment: &Deployment) -> ProviderCallError {
        ProviderCallError {
            kind: ErrorKind::ServiceUnavailable,
            message: format!(
                "no provider client registered for deployment '{}'",
                deployment.id
            ),
            provider: Self::provider_name_of(deployment).map(str::to_string),
            status_code: None,
        }
    }
}

#[async_trait]
impl ProviderClient for ProviderRegistry {
    async fn invoke(
        &self,
        deployment: &Deployment,
        request: &ProviderRequest,
        deadline: Instant,
    ) -> Result<ProviderResponse, ProviderCallError> {
        match self.resolve(deployment) {
            Some(client) => client.invoke(deployment, request, deadline).await,
            None => Err(Self::not_found_error(deployment)),
        }
    }

    async fn probe(
        &self,
        deployment: &Deployment,
        mode: CallMode,
        deadline: Instant,
    ) -> Result<Duration, ProviderCallError> {
        match self.resolve(deployment) {
            Some(client) => client.probe(deployment, mode, deadline).await,
            None => Err(Self::not_found_error(deployment)),
        }
    }
}

#[cfg(test)]
mod registry_tests {
    use super::*;
    use crate::core::router::deployment::Deployment;

    #[tokio::test]
    async fn resolves_by_provider_name() {
        let mut registry = ProviderRegistry::new();
        registry.register("openai", Arc::new(TestProviderClient::always_succeeds(10)));
        let deployment = Deployment::new("d1", "g", serde_json::json!({"provider": "openai"}));

        let deadline = Instant::now() + Duration::from_secs(1);
        let req = ProviderRequest {
            mode: CallMode::Chat,
            params: serde_json::json!({}),
            stream: false,
        };
        assert!(registry.invoke(&deployment, &req, deadline).await.is_ok());
    }

    #[tokio::test]
    async fn falls_back_to_default_when_unregistered() {
        let mut registry = ProviderRegistry::new();
        registry.register_default(Arc::new(TestProviderClient::always_succeeds(10)));
        let deployment = Deployment::new("d1", "g", serde_json::json!({"provider": "azure"}));

        let deadline = Instant::now() + Duration::from_secs(1);
        let req = ProviderRequest {
            mode: CallMode::Chat,
            params: serde_json::json!({}),
            stream: false,
        };
        assert!(registry.invoke(&deployment, &req, deadline).await.is_ok());
    }

    #[tokio::test]
    async fn errors_when_nothing_registered() {
        let registry = ProviderRegistry::new();
        let deployment = Deployment::new("d1", "g", serde_json::json!({}));
        let deadline = Instant::now() + Duration::from_secs(1);
        let req = ProviderRequest {
            mode: CallMode::Chat,
            params: serde_json::json!({}),
            stream: false,
        };
        let err = registry.invoke(&deployment, &req, deadline).await.is_err();
        assert!(err);
    }
}
