//! `ModelGroup`/`Deployment` data model

use crate::core::providers::CallMode;
use crate::utils::error::{GatewayError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// Deployment identifier, unique within a router instance.
pub type DeploymentId = String;

/// Static per-minute/parallelism caps for a deployment. Absent caps are
/// treated as `+inf` everywhere they're consulted.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct DeploymentCaps {
    pub tpm: Option<u64>,
    pub rpm: Option<u64>,
    pub max_parallel: Option<u32>,
}

impl DeploymentCaps {
    pub fn tpm_limit(&self) -> f64 {
        self.tpm.map(|v| v as f64).unwrap_or(f64::INFINITY)
    }

    pub fn rpm_limit(&self) -> f64 {
        self.rpm.map(|v| v as f64).unwrap_or(f64::INFINITY)
    }
}

/// One concrete provider target behind a [`ModelGroup`].
///
/// `provider_params` is intentionally opaque (`serde_json::Value`): the
/// model name, endpoint, and credentials reference are per-provider wire
/// concerns outside this crate's scope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Deployment {
    pub id: DeploymentId,
    pub group: String,
    pub provider_params: Value,
    pub caps: DeploymentCaps,
    pub health_check_mode: CallMode,
    /// Concrete model names to substitute when `provider_params`'s model is
    /// a `provider/*` wildcard, in probe order: the first is the primary
    /// health-check target, the rest are fallbacks tried if it fails (see
    /// [`crate::core::router::health::resolve_wildcard_candidates`]).
    pub health_check_candidates: Vec<String>,
    pub cooldown_override: Option<Duration>,
    /// Per-deployment timeout override. `None` defers to the router's
    /// configured `default_timeout` (see [`Deployment::effective_timeout`]).
    pub timeout: Option<Duration>,
}

impl Deployment {
    pub fn new(id: impl Into<String>, group: impl Into<String>, provider_params: Value) -> Self {
        Self {
            id: id.into(),
            group: group.into(),
            provider_params,
            caps: DeploymentCaps::default(),
            health_check_mode: CallMode::Chat,
            health_check_candidates: Vec::new(),
            cooldown_override: None,
            timeout: None,
        }
    }

    pub fn with_caps(mut self, caps: DeploymentCaps) -> Self {
        self.caps = caps;
        self
    }

    pub fn with_health_check_mode(mut self, mode: CallMode) -> Self {
        self.health_check_mode = mode;
        self
    }

    /// Set the concrete model candidates to substitute when this
    /// deployment's model is a `provider/*` wildcard.
    pub fn with_health_check_candidates(mut self, candidates: Vec<String>) -> Self {
        self.health_check_candidates = candidates;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// The timeout this deployment's provider calls should use: its own
    /// override, falling back to the router-wide `default_timeout`.
    pub fn effective_timeout(&self, default_timeout: Duration) -> Duration {
        self.timeout.unwrap_or(default_timeout)
    }

    /// True when `provider_params`'s model field is a `provider/*` wildcard
    /// needing substitution before a health probe.
    pub fn has_wildcard_model(&self) -> bool {
        self.provider_params
            .get("model")
            .and_then(Value::as_str)
            .is_some_and(|m| m.ends_with("/*"))
    }

    /// A clone of this deployment with `provider_params`'s `model` field
    /// replaced by `model`, used to probe a resolved wildcard candidate
    /// without mutating the original deployment.
    pub fn with_model_override(&self, model: &str) -> Self {
        let mut clone = self.clone();
        if let Some(obj) = clone.provider_params.as_object_mut() {
            obj.insert("model".to_string(), Value::String(model.to_string()));
        }
        clone
    }
}

/// Which [`DeploymentSelector`](crate::core::router::selector::DeploymentSelector)
/// a [`ModelGroup`] is resolved against. Kept as a plain enum rather than a
/// boxed trait object so `ModelGroup` stays `Serialize`/`Deserialize` and
/// the router can resolve the concrete strategy instance (which may need
/// `Store` access) lazily.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionStrategy {
    SimpleShuffle,
    Weighted,
    UsageBased,
    LeastBusy,
    LowestLatency,
}

impl Default for SelectionStrategy {
    fn default() -> Self {
        SelectionStrategy::LowestLatency
    }
}

/// A logical alias a client uses (e.g. `"gpt-3.5-turbo"`), resolving to an
/// ordered set of concrete [`Deployment`]s under a selection strategy.
#[derive(Debug, Clone)]
pub struct ModelGroup {
    pub name: String,
    pub deployments: Vec<Arc<Deployment>>,
    pub strategy: SelectionStrategy,
    pub fallbacks: Vec<String>,
    pub default_params: Value,
}

impl ModelGroup {
    /// Construct a group, enforcing the non-empty-if-advertised invariant.
    pub fn new(name: impl Into<String>, deployments: Vec<Deployment>) -> Result<Self> {
        if deployments.is_empty() {
            return Err(GatewayError::config(format!(
                "model group '{}' has no deployments",
                name.into()
            )));
        }
        Ok(Self {
            name: name.into(),
            deployments: deployments.into_iter().map(Arc::new).collect(),
            strategy: SelectionStrategy::default(),
            fallbacks: Vec::new(),
            default_params: Value::Null,
        })
    }

    pub fn with_strategy(mut self, strategy: SelectionStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_fallbacks(mut self, fallbacks: Vec<String>) -> Self {
        self.fallbacks = fallbacks;
        self
    }

    pub fn deployment(&self, id: &str) -> Option<&Arc<Deployment>> {
        self.deployments.iter().find(|d| d.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_deployments_rejected() {
        let err = ModelGroup::new("gpt-4", vec![]);
        assert!(err.is_err());
    }

    #[test]
    fn caps_default_to_infinity() {
        let caps = DeploymentCaps::default();
        assert_eq!(caps.tpm_limit(), f64::INFINITY);
        assert_eq!(caps.rpm_limit(), f64::INFINITY);
    }

    #[test]
    fn wildcard_model_detected() {
        let d = Deployment::new("d1", "g", serde_json::json!({"model": "openai/*"}));
        assert!(d.has_wildcard_model());
        let d2 = Deployment::new("d2", "g", serde_json::json!({"model": "openai/gpt-4"}));
        assert!(!d2.has_wildcard_model());
    }

    #[test]
    fn default_strategy_is_lowest_latency() {
        let group = ModelGroup::new("g", vec![Deployment::new("d1", "g", Value::Null)]).unwrap();
        assert_eq!(group.strategy, SelectionStrategy::LowestLatency);
    }

    #[test]
    fn with_strategy_overrides_default() {
        let group = ModelGroup::new("g", vec![Deployment::new("d1", "g", Value::Null)])
            .unwrap()
            .with_strategy(SelectionStrategy::SimpleShuffle);
        assert_eq!(group.strategy, SelectionStrategy::SimpleShuffle);
    }
}
