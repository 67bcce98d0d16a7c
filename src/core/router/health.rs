//! Health-check subsystem
//!
//! Runs bounded-concurrency probes against every deployment in a group,
//! persists the result via [`Store`], and serves a 2-minute-TTL cached
//! readiness snapshot so `/ready` doesn't re-probe on every call. Wildcard
//! models (`provider/*`) are resolved to concrete health-check models per
//! `health_check_helpers.py`'s `get_mode_handlers`/wildcard substitution:
//! pick up to 3 candidates, the first becomes the probe target, the rest
//! are recorded as fallback candidates.

use crate::core::clock::SharedClock;
use crate::core::providers::{CallMode, ProviderClient};
use crate::core::router::deployment::{Deployment, ModelGroup};
use crate::core::store::{health_key, SharedStore, StoreExt};
use crate::utils::error::Result;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};
use tracing::{debug, warn};

/// The full set of call shapes a deployment can be probed on, carried
/// verbatim from `health_check_helpers.py`'s `get_mode_handlers` literal.
pub const HEALTH_CHECK_MODES: &[CallMode] = &[
    CallMode::Chat,
    CallMode::Completion,
    CallMode::Embedding,
    CallMode::AudioSpeech,
    CallMode::AudioTranscription,
    CallMode::ImageGeneration,
    CallMode::VideoGeneration,
    CallMode::Rerank,
    CallMode::Realtime,
    CallMode::Batch,
    CallMode::Responses,
    CallMode::Ocr,
];

/// Default bound on simultaneously in-flight probes.
pub const DEFAULT_MAX_CONCURRENT_PROBES: usize = 8;

/// How long a readiness snapshot is served from cache before a fresh round
/// of probes is triggered.
pub const READINESS_TTL: Duration = Duration::from_secs(120);

/// Default interval between background probe rounds when
/// `background_health_checks` is enabled (see `Router::spawn_background_health_checks`).
pub const DEFAULT_HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
    Down,
}

impl HealthStatus {
    pub fn allows_requests(&self) -> bool {
        matches!(self, HealthStatus::Healthy | HealthStatus::Degraded)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckResult {
    pub status: HealthStatus,
    pub response_time_ms: u64,
    pub checked_at_epoch_secs: f64,
    pub error: Option<String>,
}

impl HealthCheckResult {
    fn healthy(response_time: Duration, checked_at: SystemTime) -> Self {
        Self {
            status: HealthStatus::Healthy,
            response_time_ms: response_time.as_millis() as u64,
            checked_at_epoch_secs: epoch_secs(checked_at),
            error: None,
        }
    }

    fn unhealthy(error: String, response_time: Duration, checked_at: SystemTime) -> Self {
        Self {
            status: HealthStatus::Unhealthy,
            response_time_ms: response_time.as_millis() as u64,
            checked_at_epoch_secs: epoch_secs(checked_at),
            error: Some(error),
        }
    }
}

fn epoch_secs(time: SystemTime) -> f64 {
    time.duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

/// Snapshot of every deployment's most recent health result in a group.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessSnapshot {
    pub results: Vec<(String, HealthCheckResult)>,
    pub generated_at_epoch_secs: f64,
}

impl ReadinessSnapshot {
    /// True when every deployment reports a request-allowing status.
    pub fn all_healthy(&self) -> bool {
        self.results.iter().all(|(_, r)| r.status.allows_requests())
    }
}

/// Picks concrete health-check candidates for a wildcard (`provider/*`)
/// model: first is the primary probe target, the rest are fallback model
/// names an operator might wire into a real provider lookup
/// (`pick_cheapest_chat_models_from_llm_provider(n=3)` in the original).
pub fn resolve_wildcard_candidates(candidates: &[String]) -> (Option<&String>, &[String]) {
    match candidates.split_first() {
        Some((primary, rest)) => (Some(primary), rest),
        None => (None, &[]),
    }
}

pub struct HealthChecker {
    store: SharedStore,
    clock: SharedClock,
    max_concurrent: usize,
}

impl HealthChecker {
    pub fn new(store: SharedStore, clock: SharedClock) -> Self {
        Self {
            store,
            clock,
            max_concurrent: DEFAULT_MAX_CONCURRENT_PROBES,
        }
    }

    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent;
        self
    }

    /// Probe a single deployment and persist the result. A wildcard
    /// (`provider/*`) model is resolved to its configured candidates first.
    pub async fn check_deployment(
        &self,
        provider: &dyn ProviderClient,
        deployment: &Deployment,
    ) -> Result<HealthCheckResult> {
        if deployment.has_wildcard_model() {
            return self.check_wildcard_deployment(provider, deployment).await;
        }
        let started = Instant::now();
        let checked_at = self.clock.wall_now();
        let deadline = Instant::now() + Duration::from_secs(30);
        let result = match provider
            .probe(deployment, deployment.health_check_mode, deadline)
            .await
        {
            Ok(_) => HealthCheckResult::healthy(started.elapsed(), checked_at),
            Err(err) => HealthCheckResult::unhealthy(err.message, started.elapsed(), checked_at),
        };
        self.store
            .set(&health_key(&deployment.id), &result, Duration::from_secs(3600))
            .await?;
        Ok(result)
    }

    /// Probes a wildcard deployment by substituting each resolved candidate
    /// model in turn (primary first, then fallbacks), stopping at the first
    /// success. A wildcard with no resolved candidates can't be probed at
    /// all and is reported unhealthy.
    async fn check_wildcard_deployment(
        &self,
        provider: &dyn ProviderClient,
        deployment: &Deployment,
    ) -> Result<HealthCheckResult> {
        let started = Instant::now();
        let checked_at = self.clock.wall_now();
        let (primary, fallbacks) = resolve_wildcard_candidates(&deployment.health_check_candidates);
        let candidates = primary.into_iter().chain(fallbacks.iter());

        let mut last_error = None;
        let mut probed_any = false;
        for candidate in candidates {
            probed_any = true;
            let probe_deployment = deployment.with_model_override(candidate);
            let deadline = Instant::now() + Duration::from_secs(30);
            match provider
                .probe(&probe_deployment, deployment.health_check_mode, deadline)
                .await
            {
                Ok(_) => {
                    let result = HealthCheckResult::healthy(started.elapsed(), checked_at);
                    self.store
                        .set(&health_key(&deployment.id), &result, Duration::from_secs(3600))
                        .await?;
                    return Ok(result);
                }
                Err(err) => last_error = Some(err.message),
            }
        }

        let error = if probed_any {
            last_error.unwrap_or_else(|| "every wildcard candidate failed".to_string())
        } else {
            format!(
                "deployment '{}' has a wildcard model with no resolved health-check candidates",
                deployment.id
            )
        };
        let result = HealthCheckResult::unhealthy(error, started.elapsed(), checked_at);
        self.store
            .set(&health_key(&deployment.id), &result, Duration::from_secs(3600))
            .await?;
        Ok(result)
    }

    /// Probe every deployment in `group` with bounded concurrency and return a fresh readiness snapshot.
    pub async fn check_group(
        &self,
        provider: &dyn ProviderClient,
        group: &ModelGroup,
    ) -> ReadinessSnapshot {
        let results = stream::iter(group.deployments.iter().cloned())
            .map(|deployment| {
                let provider = provider;
                async move {
                    let result = self.check_deployment(provider, &deployment).await;
                    let result = result.unwrap_or_else(|err| {
                        warn!(deployment = %deployment.id, error = %err, "health check failed to persist");
                        HealthCheckResult::unhealthy(err.to_string(), Duration::ZERO, self.clock.wall_now())
                    });
                    (deployment.id.clone(), result)
                }
            })
            .buffer_unordered(self.max_concurrent)
            .collect::<Vec<_>>()
            .await;

        ReadinessSnapshot {
            results,
            generated_at_epoch_secs: epoch_secs(self.clock.wall_now()),
        }
    }

    /// Serve a cached readiness snapshot if one exists and is within
    /// [`READINESS_TTL`]; otherwise re-probe the group and cache the fresh
    /// result.
    ///
    /// `allow_degraded_on_store_error` mirrors `RouterConfig`'s
    /// `allow_requests_on_db_unavailable`: when `true`, a failed cache read
    /// degrades to a fresh probe rather than failing the caller outright;
    /// when `false`, the store error is propagated so a server layer can
    /// report the backing store as down instead of silently masking it.
    pub async fn readiness(
        &self,
        provider: &dyn ProviderClient,
        group: &ModelGroup,
        allow_degraded_on_store_error: bool,
    ) -> Result<ReadinessSnapshot> {
        let cache_key = format!("readiness:{}", group.name);
        match self.store.get::<ReadinessSnapshot>(&cache_key).await {
            Ok(Some(snapshot)) => {
                let age = epoch_secs(self.clock.wall_now()) - snapshot.generated_at_epoch_secs;
                if age <= READINESS_TTL.as_secs_f64() {
                    debug!(group = %group.name, age_secs = age, "serving cached readiness snapshot");
                    return Ok(snapshot);
                }
            }
            Ok(None) => {}
            Err(err) => {
                if !allow_degraded_on_store_error {
                    return Err(err);
                }
                warn!(group = %group.name, error = %err, "store unavailable for readiness cache, degrading to fresh probe");
            }
        }

        let snapshot = self.check_group(provider, group).await;
        let _ = self
            .store
            .set(&cache_key, &snapshot, READINESS_TTL)
            .await;
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::clock::system_clock;
    use crate::core::providers::TestProviderClient;
    use crate::core::router::deployment::Deployment;
    use crate::core::store::InMemoryStore;

    #[tokio::test]
    async fn healthy_probe_is_persisted() {
        let store = Arc::new(InMemoryStore::new());
        let checker = HealthChecker::new(store.clone(), system_clock());
        let provider = TestProviderClient::always_succeeds(10);
        let deployment = Deployment::new("d1", "g", serde_json::json!({}));

        let result = checker.check_deployment(&provider, &deployment).await.unwrap();
        assert_eq!(result.status, HealthStatus::Healthy);

        let persisted: HealthCheckResult = store.get(&health_key("d1")).await.unwrap().unwrap();
        assert_eq!(persisted.status, HealthStatus::Healthy);
    }

    #[tokio::test]
    async fn group_check_covers_every_deployment() {
        let store = Arc::new(InMemoryStore::new());
        let checker = HealthChecker::new(store, system_clock());
        let provider = TestProviderClient::always_succeeds(10);
        let group = ModelGroup::new(
            "g",
            vec![
                Deployment::new("d1", "g", serde_json::json!({})),
                Deployment::new("d2", "g", serde_json::json!({})),
            ],
        )
        .unwrap();

        let snapshot = checker.check_group(&provider, &group).await;
        assert_eq!(snapshot.results.len(), 2);
        assert!(snapshot.all_healthy());
    }

    #[test]
    fn wildcard_candidates_split_primary_and_fallbacks() {
        let candidates = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let (primary, fallbacks) = resolve_wildcard_candidates(&candidates);
        assert_eq!(primary, Some(&"a".to_string()));
        assert_eq!(fallbacks, ["b".to_string(), "c".to_string()]);
    }

    #[test]
    fn empty_candidates_has_no_primary() {
        let (primary, fallbacks) = resolve_wildcard_candidates(&[]);
        assert_eq!(primary, None);
        assert!(fallbacks.is_empty());
    }

    #[tokio::test]
    async fn wildcard_deployment_probes_resolved_candidate() {
        let store = Arc::new(InMemoryStore::new());
        let checker = HealthChecker::new(store.clone(), system_clock());
        let provider = TestProviderClient::always_succeeds(10);
        let deployment = Deployment::new("d1", "g", serde_json::json!({"model": "openai/*"}))
            .with_health_check_candidates(vec!["openai/gpt-4o-mini".to_string()]);

        let result = checker.check_deployment(&provider, &deployment).await.unwrap();
        assert_eq!(result.status, HealthStatus::Healthy);
    }

    #[tokio::test]
    async fn wildcard_deployment_falls_through_to_next_candidate() {
        let store = Arc::new(InMemoryStore::new());
        let checker = HealthChecker::new(store, system_clock());
        let provider = TestProviderClient::scripted(vec![
            crate::core::providers::ScriptedOutcome::Fail(crate::core::providers::ErrorKind::ServiceUnavailable),
            crate::core::providers::ScriptedOutcome::Success {
                completion_tokens: 1,
                total_tokens: 1,
                latency: Duration::from_millis(1),
            },
        ]);
        let deployment = Deployment::new("d1", "g", serde_json::json!({"model": "openai/*"}))
            .with_health_check_candidates(vec![
                "openai/unavailable".to_string(),
                "openai/gpt-4o-mini".to_string(),
            ]);

        let result = checker.check_deployment(&provider, &deployment).await.unwrap();
        assert_eq!(result.status, HealthStatus::Healthy);
    }

    #[derive(Debug, Default)]
    struct FailingStore;

    #[async_trait::async_trait]
    impl crate::core::store::Store for FailingStore {
        async fn get_raw(&self, _key: &str) -> Result<Option<serde_json::Value>> {
            Err(crate::utils::error::GatewayError::store_unavailable("store down"))
        }
        async fn set_raw(&self, _key: &str, _value: serde_json::Value, _ttl: Duration) -> Result<()> {
            Ok(())
        }
        async fn update_raw(
            &self,
            _key: &str,
            _ttl: Duration,
            _update_fn: Box<dyn Fn(Option<serde_json::Value>) -> serde_json::Value + Send + Sync>,
        ) -> Result<serde_json::Value> {
            Ok(serde_json::Value::Null)
        }
        async fn delete(&self, _key: &str) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn readiness_degrades_to_fresh_probe_when_store_unavailable_and_degrade_allowed() {
        let checker = HealthChecker::new(Arc::new(FailingStore), system_clock());
        let provider = TestProviderClient::always_succeeds(10);
        let group = ModelGroup::new("g", vec![Deployment::new("d1", "g", serde_json::json!({}))]).unwrap();

        let snapshot = checker.readiness(&provider, &group, true).await.unwrap();
        assert!(snapshot.all_healthy());
    }

    #[tokio::test]
    async fn readiness_propagates_store_error_when_degrade_disallowed() {
        let checker = HealthChecker::new(Arc::new(FailingStore), system_clock());
        let provider = TestProviderClient::always_succeeds(10);
        let group = ModelGroup::new("g", vec![Deployment::new("d1", "g", serde_json::json!({}))]).unwrap();

        let err = checker.readiness(&provider, &group, false).await;
        assert!(err.is_err());
    }

    #[tokio::test]
    async fn wildcard_deployment_with_no_candidates_is_unhealthy() {
        let store = Arc::new(InMemoryStore::new());
        let checker = HealthChecker::new(store, system_clock());
        let provider = TestProviderClient::always_succeeds(10);
        let deployment = Deployment::new("d1", "g", serde_json::json!({"model": "openai/*"}));

        let result = checker.check_deployment(&provider, &deployment).await.unwrap();
        assert_eq!(result.status, HealthStatus::Unhealthy);
    }
}
