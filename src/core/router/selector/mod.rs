//! Deployment selection strategies
//!
//! [`DeploymentSelector`] is the pluggable seam: the router picks one
//! concrete [`Deployment`] out of a [`ModelGroup`]'s healthy candidates.
//! [`LowestLatency`] is the fully fleshed-out strategy, grounded line-for-line
//! in `router_strategy/lowest_latency.py`; the others are the simpler
//! strategies, grounded in `router::strategy::StrategyExecutor`.

mod least_busy;
pub mod lowest_latency;
mod simple_shuffle;
mod usage_based;
mod weighted;

pub use least_busy::LeastBusy;
pub use lowest_latency::LowestLatency;
pub use simple_shuffle::SimpleShuffle;
pub use usage_based::UsageBased;
pub use weighted::Weighted;

use crate::core::router::cooldown::CooldownManager;
use crate::core::router::deployment::{Deployment, ModelGroup};
use crate::core::router::health::HealthCheckResult;
use crate::core::store::{health_key, StoreExt};
use crate::utils::error::{GatewayError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Per-candidate score surfaced for telemetry/operator debugging, grounded
/// in `_latency_per_deployment`'s debugging role in
/// `router_strategy/lowest_latency.py`. Not used to make the selection
/// decision itself.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SelectionTrace {
    pub candidate_scores: HashMap<String, CandidateScore>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CandidateScore {
    pub latency: f64,
    pub ttft: Option<f64>,
}

/// Whether the caller is asking for a streamed response, which the
/// latency-based strategy uses to prefer TTFT over throughput.
#[derive(Debug, Clone, Copy, Default)]
pub struct SelectionContext {
    pub stream: bool,
    pub estimated_input_tokens: u64,
}

/// Strategy contract for picking a deployment out of a group's currently
/// non-cooling-down, capacity-eligible candidates.
#[async_trait]
pub trait DeploymentSelector: Send + Sync {
    /// Pick a deployment from `group`, consulting `cooldowns` to exclude
    /// unhealthy candidates. Returns `GatewayError::NoDeploymentsAvailable`
    /// if nothing is eligible.
    async fn pick(
        &self,
        group: &ModelGroup,
        cooldowns: &CooldownManager,
        ctx: SelectionContext,
    ) -> Result<(Arc<Deployment>, SelectionTrace)>;
}

/// Filter `group`'s deployments down to those not currently cooling down
/// and not last reported unhealthy by the health-check subsystem. Shared by
/// every strategy, matching the router's pre-call candidate resolution:
/// "not cooling down, not known unhealthy".
pub(super) async fn healthy_candidates<'a>(
    group: &'a ModelGroup,
    cooldowns: &CooldownManager,
) -> Result<Vec<&'a Arc<Deployment>>> {
    let store = cooldowns.store();
    let mut candidates = Vec::with_capacity(group.deployments.len());
    for deployment in &group.deployments {
        if cooldowns.is_cooling(&deployment.id).await? {
            continue;
        }
        // A missing or unreadable health entry is `unknown`, which still
        // allows requests: a deployment that has never been probed isn't
        // penalized for it, only one actively reported unhealthy is.
        let reported_unhealthy = store
            .get::<HealthCheckResult>(&health_key(&deployment.id))
            .await
            .ok()
            .flatten()
            .is_some_and(|result| !result.status.allows_requests());
        if reported_unhealthy {
            continue;
        }
        candidates.push(deployment);
    }
    if candidates.is_empty() {
        return Err(GatewayError::no_deployments_available(
            &group.name,
            group.deployments.len(),
        ));
    }
    Ok(candidates)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::store::InMemoryStore;

    #[tokio::test]
    async fn all_cooling_down_yields_no_deployments_available() {
        let group = ModelGroup::new(
            "g",
            vec![crate::core::router::deployment::Deployment::new(
                "d1",
                "g",
                serde_json::json!({}),
            )],
        )
        .unwrap();
        let cooldowns = CooldownManager::new(Arc::new(InMemoryStore::new()));
        cooldowns
            .mark(
                "d1",
                crate::core::router::cooldown::CooldownReason::Manual,
                std::time::Duration::from_secs(60),
            )
            .await
            .unwrap();
        let err = healthy_candidates(&group, &cooldowns).await;
        assert!(err.is_err());
    }

    #[tokio::test]
    async fn reported_unhealthy_deployment_is_excluded() {
        use crate::core::router::health::{HealthCheckResult, HealthStatus};

        let group = ModelGroup::new(
            "g",
            vec![
                crate::core::router::deployment::Deployment::new("d1", "g", serde_json::json!({})),
                crate::core::router::deployment::Deployment::new("d2", "g", serde_json::json!({})),
            ],
        )
        .unwrap();
        let store = Arc::new(InMemoryStore::new());
        store
            .set(
                &health_key("d1"),
                &HealthCheckResult {
                    status: HealthStatus::Unhealthy,
                    response_time_ms: 0,
                    checked_at_epoch_secs: 0.0,
                    error: Some("connection refused".to_string()),
                },
                std::time::Duration::from_secs(3600),
            )
            .await
            .unwrap();
        let cooldowns = CooldownManager::new(store);

        let candidates = healthy_candidates(&group, &cooldowns).await.unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].id, "d2");
    }

    #[tokio::test]
    async fn never_probed_deployment_is_still_a_candidate() {
        let group = ModelGroup::new(
            "g",
            vec![crate::core::router::deployment::Deployment::new(
                "d1",
                "g",
                serde_json::json!({}),
            )],
        )
        .unwrap();
        let cooldowns = CooldownManager::new(Arc::new(InMemoryStore::new()));
        let candidates = healthy_candidates(&group, &cooldowns).await.unwrap();
        assert_eq!(candidates.len(), 1);
    }
}
