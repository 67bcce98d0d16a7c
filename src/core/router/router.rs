//! Router orchestration and the `RouterSurface` exposed to a server
//! layer.
//!
//! `Router` owns the pieces the rest of `core::router` defines —
//! [`DeploymentSelector`]s, [`RetryFallbackEngine`], [`TelemetryBus`] — and
//! holds non-owning [`Arc`] handles to the shared [`Store`], [`Cache`], and
//! [`ProviderClient`] registry. The model-group
//! snapshot is held behind an [`ArcSwap`] so a config reload swaps in a new
//! set of groups atomically; any request already in flight finishes against
//! the snapshot it started with.

use crate::core::cache::{Invalidation, LookupOutcome, RequestFingerprint, SharedCache};
use crate::core::clock::{system_clock, SharedClock};
use crate::core::providers::{CallMode, ProviderClient, ProviderRequest, ProviderResponse};
use crate::core::router::config::RouterConfig;
use crate::core::router::cooldown::CooldownManager;
use crate::core::router::deployment::{ModelGroup, SelectionStrategy};
use crate::core::router::health::{HealthChecker, ReadinessSnapshot};
use crate::core::router::metrics::MetricsRecorder;
use crate::core::router::retry::{GroupResolver, RetryFallbackEngine};
use crate::core::router::selector::{
    DeploymentSelector, LeastBusy, LowestLatency, SimpleShuffle, UsageBased, Weighted,
};
use crate::core::router::telemetry::{HiddenParams, StandardLoggingPayload, TelemetryBus};
use crate::core::store::{SharedStore, StoreExt};
use crate::utils::error::{GatewayError, Result};
use crate::utils::generate_trace_id;
use arc_swap::ArcSwap;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info_span, Instrument};

/// Response envelope returned to the caller by every [`RouterSurface`]
/// completion-shaped method: the normalized provider body plus the
/// bookkeeping a server layer needs to log or bill the call.
#[derive(Debug, Clone)]
pub struct RouterResponse {
    pub body: Value,
    pub trace_id: String,
    pub deployment_id: String,
    pub model_group: String,
    pub cache_hit: bool,
    pub attempts: u32,
}

/// `group -> deployments` snapshot, atomically swappable on config reload.
struct GroupRegistry {
    groups: ArcSwap<HashMap<String, Arc<ModelGroup>>>,
}

impl GroupRegistry {
    fn new(groups: Vec<ModelGroup>) -> Self {
        let map = groups
            .into_iter()
            .map(|g| (g.name.clone(), Arc::new(g)))
            .collect();
        Self {
            groups: ArcSwap::from_pointee(map),
        }
    }

    fn get(&self, name: &str) -> Option<Arc<ModelGroup>> {
        self.groups.load().get(name).cloned()
    }

    fn all(&self) -> Vec<Arc<ModelGroup>> {
        self.groups.load().values().cloned().collect()
    }

    /// Atomically swap in a fresh set of groups (e.g. after a config
    /// reload). In-flight requests keep the `Arc<ModelGroup>` they already
    /// resolved, so they run to completion against the old snapshot.
    fn reload(&self, groups: Vec<ModelGroup>) {
        let map = groups
            .into_iter()
            .map(|g| (g.name.clone(), Arc::new(g)))
            .collect();
        self.groups.store(Arc::new(map));
    }
}

impl GroupResolver for GroupRegistry {
    fn resolve(&self, name: &str) -> Option<Arc<ModelGroup>> {
        self.get(name)
    }
}

/// The surface a server layer calls into. Kept as a trait so a
/// customer-facing HTTP layer (out of scope for this crate) depends on this
/// narrow contract rather than `Router`'s concrete type.
#[async_trait]
pub trait RouterSurface: Send + Sync {
    async fn completion(&self, group: &str, messages: Value, stream: bool, extra: Value) -> Result<RouterResponse>;
    async fn embedding(&self, group: &str, inputs: Value, extra: Value) -> Result<RouterResponse>;
    async fn transcription(
        &self,
        group: &str,
        audio: crate::core::cache::AudioInput,
        extra: Value,
    ) -> Result<RouterResponse>;
    async fn image_generation(&self, group: &str, prompt: Value, extra: Value) -> Result<RouterResponse>;
    async fn rerank(&self, group: &str, query: Value, documents: Value, extra: Value) -> Result<RouterResponse>;
    async fn health_check(&self, filters: Option<&[String]>) -> HealthCheckSummary;
    async fn readiness(&self) -> ReadinessReport;
    fn liveness(&self) -> &'static str;
}

/// Response to [`RouterSurface::health_check`].
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct HealthCheckSummary {
    pub healthy: Vec<String>,
    pub unhealthy: Vec<String>,
}

/// Response to [`RouterSurface::readiness`]. `db` is always
/// `"not_configured"`: persistence is out of this crate's scope, so
/// the router has nothing to probe there; a server layer that does own a
/// DB connection overlays its own reading onto this report.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ReadinessReport {
    pub status: &'static str,
    pub db: &'static str,
    pub cache: &'static str,
    pub version: &'static str,
    pub callbacks: usize,
}

impl ReadinessReport {
    fn degraded(cache: &'static str) -> Self {
        Self {
            status: "degraded",
            db: "not_configured",
            cache,
            version: crate::VERSION,
            callbacks: 0,
        }
    }
}

/// Orchestrates the full request lifecycle: normalize, cache lookup
/// with single-flight, select a deployment, invoke with retry/fallback,
/// record metrics, finalize the cache entry, emit telemetry.
pub struct Router {
    groups: GroupRegistry,
    store: SharedStore,
    cache: SharedCache,
    providers: Arc<dyn ProviderClient>,
    cooldowns: CooldownManager,
    metrics: MetricsRecorder,
    retry: RetryFallbackEngine,
    telemetry: TelemetryBus,
    health: HealthChecker,
    selectors: HashMap<SelectionStrategy, Arc<dyn DeploymentSelector>>,
    clock: SharedClock,
    config: RouterConfig,
}

impl Router {
    pub fn new(
        groups: Vec<ModelGroup>,
        store: SharedStore,
        cache: SharedCache,
        providers: Arc<dyn ProviderClient>,
        config: RouterConfig,
    ) -> Self {
        let clock = system_clock();
        let cooldowns = CooldownManager::new(store.clone());
        let metrics = MetricsRecorder::new(store.clone(), clock.clone())
            .with_window_size(config.max_latency_list_size)
            .with_min_tokens_for_latency(config.min_tokens_for_latency)
            .with_max_latency_per_token(config.max_latency_seconds_per_token)
            .with_max_ttft(config.max_ttft_seconds);
        let retry = RetryFallbackEngine::new(cooldowns.clone(), metrics.clone())
            .with_max_attempts(config.num_retries)
            .with_default_cooldown(Duration::from_secs(config.cooldown_time_seconds))
            .with_default_timeout(Duration::from_secs(config.default_timeout_seconds));
        let telemetry = TelemetryBus::default()
            .with_message_logging_disabled(config.turn_off_message_logging);
        let health = HealthChecker::new(store.clone(), clock.clone())
            .with_max_concurrent(config.max_concurrent_health_checks);

        let mut selectors: HashMap<SelectionStrategy, Arc<dyn DeploymentSelector>> = HashMap::new();
        selectors.insert(SelectionStrategy::SimpleShuffle, Arc::new(SimpleShuffle));
        selectors.insert(SelectionStrategy::Weighted, Arc::new(Weighted));
        selectors.insert(SelectionStrategy::UsageBased, Arc::new(UsageBased::new(store.clone())));
        selectors.insert(SelectionStrategy::LeastBusy, Arc::new(LeastBusy::new(store.clone())));
        selectors.insert(
            SelectionStrategy::LowestLatency,
            Arc::new(
                LowestLatency::new(store.clone())
                    .with_buffer(config.lowest_latency_buffer)
                    .with_clock(clock.clone()),
            ),
        );

        Self {
            groups: GroupRegistry::new(groups),
            store,
            cache,
            providers,
            cooldowns,
            metrics,
            retry,
            telemetry,
            health,
            selectors,
            clock,
            config,
        }
    }

    /// Swap in a freshly loaded set of model groups.
    pub fn reload_groups(&self, groups: Vec<ModelGroup>) {
        self.groups.reload(groups);
    }

    /// Apply an external cache invalidation signal. An operator
    /// endpoint or webhook feeds this through on a content update that
    /// makes previously cached responses stale.
    pub async fn invalidate_cache(&self, signal: Invalidation) {
        self.cache.invalidate(signal).await;
    }

    /// Clear a deployment's cooldown early, e.g. after an operator
    /// confirms the underlying incident is resolved.
    pub async fn clear_cooldown(&self, deployment_id: &str) -> Result<()> {
        self.cooldowns.clear(deployment_id).await
    }

    /// Subscribe to this router's telemetry stream.
    pub fn subscribe_telemetry(&self) -> tokio::sync::broadcast::Receiver<StandardLoggingPayload> {
        self.telemetry.subscribe()
    }

    /// Start a background task that re-probes every model group's
    /// deployments on a timer, matching `background_health_checks`: once
    /// started, `readiness()`/`health_check()` callers get a result this
    /// task already populated instead of each request racing a synchronous
    /// probe. A no-op (returns `None`) unless `config.background_health_checks`
    /// is set. The caller owns the returned handle and is responsible for
    /// aborting it on shutdown; dropping the handle does not stop the task.
    pub fn spawn_background_health_checks(self: &Arc<Self>) -> Option<tokio::task::JoinHandle<()>> {
        if !self.config.background_health_checks {
            return None;
        }
        let interval = Duration::from_secs(self.config.health_check_interval_seconds.max(1));
        let router = self.clone();
        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                for group in router.groups.all() {
                    let _ = router.health.check_group(router.providers.as_ref(), group.as_ref()).await;
                }
            }
        }))
    }

    fn selector_for(&self, strategy: SelectionStrategy) -> &Arc<dyn DeploymentSelector> {
        self.selectors
            .get(&strategy)
            .expect("every SelectionStrategy variant has a registered selector")
    }

    /// The full pre-call -> invoke -> post-call pipeline shared by every
    /// public entry point. `cache_fingerprint` is `None` for call shapes
    /// classifies as non-cacheable (e.g. `Realtime`, `Batch`).
    async fn dispatch(
        &self,
        group_name: &str,
        mode: CallMode,
        params: Value,
        stream: bool,
        fingerprint: Option<RequestFingerprint>,
    ) -> Result<RouterResponse> {
        let trace_id = generate_trace_id();
        let span = info_span!("router.dispatch", trace_id = %trace_id, group = %group_name, mode = ?mode);

        async {
            let group = self
                .groups
                .get(group_name)
                .ok_or_else(|| GatewayError::not_found(format!("model group '{group_name}'")))?;

            let (cache_hit_body, claimed) = match &fingerprint {
                Some(fp) => {
                    match self
                        .cache
                        .lookup_or_claim(fp, Duration::from_millis(self.config.cache_wait_timeout_ms))
                        .await
                    {
                        LookupOutcome::Hit(body) => (Some(body), false),
                        LookupOutcome::Claimed => (None, true),
                        LookupOutcome::WaitedForOther(Some(body)) => (Some(body), false),
                        LookupOutcome::WaitedForOther(None) => (None, false),
                    }
                }
                None => (None, false),
            };

            if let Some(body) = cache_hit_body {
                self.telemetry.publish(StandardLoggingPayload {
                    request_id: trace_id.clone(),
                    model_group: group_name.to_string(),
                    deployment_id: None,
                    api_key_masked: None,
                    status: "success".to_string(),
                    duration_ms: 0,
                    prompt_tokens: 0,
                    completion_tokens: 0,
                    total_tokens: 0,
                    cache_hit: true,
                    error: None,
                    messages: Value::Null,
                    response: body.clone(),
                    hidden_params: HiddenParams::default(),
                    model_map_information: None,
                });
                return Ok(RouterResponse {
                    body,
                    trace_id,
                    deployment_id: String::new(),
                    model_group: group_name.to_string(),
                    cache_hit: true,
                    attempts: 0,
                });
            }

            let request = ProviderRequest { mode, params, stream };
            let selector = self.selector_for(group.strategy).clone();
            let started = Instant::now();

            let outcome = self
                .retry
                .invoke(&self.groups, selector.as_ref(), self.providers.as_ref(), &group, &request)
                .await;

            match outcome {
                Ok(outcome) => {
                    if let Some(fp) = &fingerprint {
                        if claimed {
                            self.cache
                                .finalize(
                                    fp,
                                    outcome.response.body.clone(),
                                    Duration::from_secs(self.config.store_entry_ttl_seconds),
                                )
                                .await;
                        }
                    }
                    self.telemetry.publish(StandardLoggingPayload {
                        request_id: trace_id.clone(),
                        model_group: outcome.group_used.clone(),
                        deployment_id: Some(outcome.deployment.id.clone()),
                        api_key_masked: None,
                        status: "success".to_string(),
                        duration_ms: started.elapsed().as_millis() as u64,
                        prompt_tokens: outcome.response.usage.prompt_tokens,
                        completion_tokens: outcome.response.usage.completion_tokens,
                        total_tokens: outcome.response.usage.total_tokens,
                        cache_hit: false,
                        error: None,
                        messages: request.params.clone(),
                        response: outcome.response.body.clone(),
                        hidden_params: HiddenParams::default(),
                        model_map_information: serde_json::to_value(&outcome.trace.candidate_scores).ok(),
                    });
                    Ok(RouterResponse {
                        body: outcome.response.body,
                        trace_id,
                        deployment_id: outcome.deployment.id.clone(),
                        model_group: outcome.group_used,
                        cache_hit: false,
                        attempts: outcome.attempts,
                    })
                }
                Err(err) => {
                    if let Some(fp) = &fingerprint {
                        if claimed {
                            self.cache.abort(fp).await;
                        }
                    }
                    self.telemetry.publish(StandardLoggingPayload {
                        request_id: trace_id.clone(),
                        model_group: group_name.to_string(),
                        deployment_id: None,
                        api_key_masked: None,
                        status: "failure".to_string(),
                        duration_ms: started.elapsed().as_millis() as u64,
                        prompt_tokens: 0,
                        completion_tokens: 0,
                        total_tokens: 0,
                        cache_hit: false,
                        error: Some(err.to_string()),
                        messages: request.params.clone(),
                        response: Value::Null,
                        hidden_params: HiddenParams::default(),
                        model_map_information: None,
                    });
                    Err(err)
                }
            }
        }
        .instrument(span)
        .await
    }
}

fn response_fingerprint(mode: CallMode, group: &str, params: &Value) -> Option<RequestFingerprint> {
    mode.is_cacheable()
        .then(|| crate::core::cache::fingerprint_text(group, params))
}

#[async_trait]
impl RouterSurface for Router {
    async fn completion(&self, group: &str, messages: Value, stream: bool, extra: Value) -> Result<RouterResponse> {
        let params = merge_params(serde_json::json!({ "messages": messages, "stream": stream }), extra);
        let fingerprint = response_fingerprint(CallMode::Chat, group, &params);
        self.dispatch(group, CallMode::Chat, params, stream, fingerprint).await
    }

    async fn embedding(&self, group: &str, inputs: Value, extra: Value) -> Result<RouterResponse> {
        let params = merge_params(serde_json::json!({ "input": inputs }), extra);
        let fingerprint = response_fingerprint(CallMode::Embedding, group, &params);
        self.dispatch(group, CallMode::Embedding, params, false, fingerprint).await
    }

    async fn transcription(
        &self,
        group: &str,
        audio: crate::core::cache::AudioInput,
        extra: Value,
    ) -> Result<RouterResponse> {
        let params = merge_params(serde_json::json!({}), extra);
        let fingerprint = crate::core::cache::fingerprint_audio(group, &params, &audio)
            .map_err(GatewayError::Io)?;
        self.dispatch(
            group,
            CallMode::AudioTranscription,
            params,
            false,
            Some(fingerprint),
        )
        .await
    }

    async fn image_generation(&self, group: &str, prompt: Value, extra: Value) -> Result<RouterResponse> {
        let params = merge_params(serde_json::json!({ "prompt": prompt }), extra);
        let fingerprint = response_fingerprint(CallMode::ImageGeneration, group, &params);
        self.dispatch(group, CallMode::ImageGeneration, params, false, fingerprint)
            .await
    }

    async fn rerank(&self, group: &str, query: Value, documents: Value, extra: Value) -> Result<RouterResponse> {
        let params = merge_params(
            serde_json::json!({ "query": query, "documents": documents }),
            extra,
        );
        let fingerprint = response_fingerprint(CallMode::Rerank, group, &params);
        self.dispatch(group, CallMode::Rerank, params, false, fingerprint).await
    }

    async fn health_check(&self, filters: Option<&[String]>) -> HealthCheckSummary {
        let mut summary = HealthCheckSummary::default();
        for group in self.groups.all() {
            if let Some(filters) = filters {
                if !filters.iter().any(|f| f == &group.name) {
                    continue;
                }
            }
            let snapshot = self.health.check_group(self.providers.as_ref(), &group).await;
            for (id, result) in snapshot.results {
                if result.status.allows_requests() {
                    summary.healthy.push(id);
                } else {
                    summary.unhealthy.push(id);
                }
            }
        }
        summary
    }

    /// Aggregates [`HealthChecker::readiness`]'s TTL-cached snapshot across
    /// every model group. Honors `allow_requests_on_db_unavailable`: when
    /// `true`, a store read failure degrades to a fresh probe for that
    /// group (per spec, a DB read failure returns the cached/degraded
    /// readiness state rather than propagating an exception); when `false`,
    /// the store failure is surfaced as `"unreachable"` instead of masked.
    async fn readiness(&self) -> ReadinessReport {
        let groups = self.groups.all();
        if groups.is_empty() {
            return ReadinessReport::degraded("reachable");
        }

        let allow_degraded = self.config.allow_requests_on_db_unavailable;
        let mut all_healthy = true;
        let mut store_unreachable = false;

        for group in &groups {
            match self
                .health
                .readiness(self.providers.as_ref(), group, allow_degraded)
                .await
            {
                Ok(snapshot) => {
                    if !snapshot.all_healthy() {
                        all_healthy = false;
                    }
                }
                Err(_) => {
                    store_unreachable = true;
                    all_healthy = false;
                }
            }
        }

        ReadinessReport {
            status: if all_healthy { "ready" } else { "degraded" },
            db: "not_configured",
            cache: if store_unreachable { "unreachable" } else { "reachable" },
            version: crate::VERSION,
            callbacks: 0,
        }
    }

    fn liveness(&self) -> &'static str {
        "alive"
    }
}

fn merge_params(mut base: Value, extra: Value) -> Value {
    if let (Value::Object(base_map), Value::Object(extra_map)) = (&mut base, extra) {
        for (k, v) in extra_map {
            base_map.insert(k, v);
        }
    }
    base
}

/// Probe the health/readiness snapshot a single deployment last reported,
/// independent of any live group (used by an operator "check one
/// deployment" endpoint; not part of [`RouterSurface`] since it isn't
/// group-scoped).
pub async fn last_known_health(store: &SharedStore, deployment_id: &str) -> Result<Option<ReadinessSnapshot>> {
    store.get(&format!("readiness:{deployment_id}")).await
}
