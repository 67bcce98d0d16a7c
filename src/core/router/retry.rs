//! Retry / fallback orchestration
//!
//! Classifies a failed [`ProviderCallError`] via [`ErrorKind::retry_class`]
//! and decides: retry the same deployment after `retry_after`
//! (rate-limited), cool the deployment down and try another one in the
//! same group, fall through to a fallback model group, or surface the
//! error immediately. The attempt budget is **preserved** across a
//! fallback swap (see `DESIGN.md`): a request that fails out of its
//! primary group does not get a fresh set of attempts against the
//! fallback group.

use crate::core::providers::{ProviderCallError, ProviderClient, ProviderRequest, ProviderResponse, RetryClass};
use crate::core::router::cooldown::{CooldownManager, CooldownReason, DEFAULT_COOLDOWN};
use crate::core::router::deployment::{Deployment, ModelGroup};
use crate::core::router::metrics::MetricsRecorder;
use crate::core::router::selector::{DeploymentSelector, SelectionContext, SelectionTrace};
use crate::utils::error::{GatewayError, Result};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Default maximum attempts across the primary group and all fallbacks.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default per-attempt provider-call timeout, and the overall wall-clock
/// budget across every retry/fallback attempt for a single request, when a
/// deployment doesn't set its own `timeout` override.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(600);

/// Outcome of a fully-retried invocation.
pub struct InvokeOutcome {
    pub response: ProviderResponse,
    pub deployment: Arc<Deployment>,
    pub group_used: String,
    pub attempts: u32,
    pub trace: SelectionTrace,
}

/// Resolves a model group by name. Implemented by the router; kept as a
/// trait so `RetryFallbackEngine` doesn't need to own the full group
/// registry.
pub trait GroupResolver: Send + Sync {
    fn resolve(&self, name: &str) -> Option<Arc<ModelGroup>>;
}

pub struct RetryFallbackEngine {
    cooldowns: CooldownManager,
    metrics: MetricsRecorder,
    max_attempts: u32,
    default_cooldown: Duration,
    default_timeout: Duration,
}

impl RetryFallbackEngine {
    pub fn new(cooldowns: CooldownManager, metrics: MetricsRecorder) -> Self {
        Self {
            cooldowns,
            metrics,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            default_cooldown: DEFAULT_COOLDOWN,
            default_timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_default_cooldown(mut self, default_cooldown: Duration) -> Self {
        self.default_cooldown = default_cooldown;
        self
    }

    /// Set both the per-attempt fallback timeout (for deployments with no
    /// `timeout` override) and the overall wall-clock budget across every
    /// retry/fallback attempt for a single `invoke` call.
    pub fn with_default_timeout(mut self, default_timeout: Duration) -> Self {
        self.default_timeout = default_timeout;
        self
    }

    /// Run `request` against `group`, selecting deployments via `selector`,
    /// retrying/falling back up to the engine's attempt budget.
    pub async fn invoke(
        &self,
        resolver: &dyn GroupResolver,
        selector: &dyn DeploymentSelector,
        provider: &dyn ProviderClient,
        group: &ModelGroup,
        request: &ProviderRequest,
    ) -> Result<InvokeOutcome> {
        let mut current_group = group.clone();
        let mut group_name = group.name.clone();
        let mut attempts = 0u32;
        let mut last_error: Option<GatewayError> = None;

        let overall_started = Instant::now();
        let overall_deadline = overall_started + self.default_timeout;

        'fallback: loop {
            loop {
                if attempts >= self.max_attempts {
                    break 'fallback;
                }
                let now = Instant::now();
                if now >= overall_deadline {
                    last_error = Some(GatewayError::timeout(format!(
                        "request exceeded overall timeout of {:?} across {attempts} attempt(s)",
                        self.default_timeout
                    )));
                    break 'fallback;
                }
                attempts += 1;

                let ctx = SelectionContext {
                    stream: request.stream,
                    estimated_input_tokens: estimate_input_tokens(request),
                };
                let (deployment, trace) = match selector.pick(&current_group, &self.cooldowns, ctx).await {
                    Ok(picked) => picked,
                    Err(err) => {
                        debug!(group = %group_name, "no deployment available, trying fallback");
                        last_error = Some(err);
                        break;
                    }
                };

                // Bounded by whichever is tighter: the deployment's own
                // (or router-default) per-attempt timeout, or what's left
                // of the overall budget across every attempt so far.
                let per_attempt_deadline = now + deployment.effective_timeout(self.default_timeout);
                let deadline = per_attempt_deadline.min(overall_deadline);
                let started = Instant::now();
                match provider.invoke(&deployment, request, deadline).await {
                    Ok(response) => {
                        let elapsed = started.elapsed();
                        let ttft = response
                            .completion_start
                            .map(|start| start.saturating_duration_since(started));
                        self.metrics
                            .on_success(
                                &group_name,
                                &deployment.id,
                                elapsed,
                                response.usage.completion_tokens,
                                ttft,
                            )
                            .await?;
                        return Ok(InvokeOutcome {
                            response,
                            deployment,
                            group_used: group_name,
                            attempts,
                            trace,
                        });
                    }
                    Err(call_error) => {
                        self.handle_failure(&group_name, &deployment, &call_error)
                            .await?;
                        match call_error.kind.retry_class() {
                            RetryClass::RetriableSame { retry_after } => {
                                if let Some(delay) = retry_after {
                                    let remaining = overall_deadline.saturating_duration_since(Instant::now());
                                    tokio::time::sleep(delay.min(Duration::from_secs(30)).min(remaining)).await;
                                }
                                last_error = Some(provider_error(&call_error));
                                continue;
                            }
                            RetryClass::RetriableOther => {
                                last_error = Some(provider_error(&call_error));
                                continue;
                            }
                            RetryClass::NonRetriable => {
                                return Err(provider_error(&call_error));
                            }
                            RetryClass::Cancelled => {
                                return Err(GatewayError::Cancelled);
                            }
                        }
                    }
                }
            }

            match current_group.fallbacks.first() {
                Some(next_name) => {
                    let next_name = next_name.clone();
                    match resolver.resolve(&next_name) {
                        Some(next_group) => {
                            warn!(from = %group_name, to = %next_name, "falling back to alternate model group");
                            group_name = next_group.name.clone();
                            current_group = (*next_group).clone();
                        }
                        None => break 'fallback,
                    }
                }
                None => break 'fallback,
            }
        }

        Err(last_error.unwrap_or_else(|| {
            GatewayError::no_deployments_available(&group_name, attempts as usize)
        }))
    }

    async fn handle_failure(
        &self,
        group: &str,
        deployment: &Deployment,
        error: &ProviderCallError,
    ) -> Result<()> {
        if error.kind.is_transient() {
            self.metrics.on_failure(group, &deployment.id).await?;
        }
        if let Some(reason) = CooldownReason::from_error_kind(&error.kind) {
            let duration = deployment.cooldown_override.unwrap_or(self.default_cooldown);
            self.cooldowns.mark(&deployment.id, reason, duration).await?;
        }
        Ok(())
    }
}

fn provider_error(error: &ProviderCallError) -> GatewayError {
    use crate::core::providers::ErrorKind;
    match &error.kind {
        ErrorKind::BadRequest => GatewayError::bad_request(error.message.clone()),
        ErrorKind::Unauthorized => GatewayError::unauthorized(error.message.clone()),
        ErrorKind::NotFound => GatewayError::not_found(error.message.clone()),
        ErrorKind::RateLimited { retry_after } => {
            GatewayError::rate_limited(error.message.clone(), *retry_after)
        }
        ErrorKind::Timeout => GatewayError::timeout(error.message.clone()),
        ErrorKind::ServiceUnavailable | ErrorKind::ConnectionError => {
            GatewayError::service_unavailable(error.message.clone())
        }
        ErrorKind::InternalServerError => GatewayError::internal(error.message.clone()),
        ErrorKind::ContextWindowExceeded { requested, max } => {
            GatewayError::context_window_exceeded(*requested, *max)
        }
        ErrorKind::ContentPolicyViolation => {
            GatewayError::content_policy_violation(error.message.clone())
        }
        ErrorKind::Cancelled => GatewayError::Cancelled,
    }
}

/// Rough token estimate for capacity filtering, based on request body size
/// rather than a real tokenizer (tokenization is out of scope).
fn estimate_input_tokens(request: &ProviderRequest) -> u64 {
    (request.params.to_string().len() as u64) / 4
}
