//! Weighted-random selection, honoring a per-deployment `weight` hint in
//! `provider_params` (mirrors `litellm_params.weight` in the original
//! routing config; defaults to `1.0` when absent).

use super::{healthy_candidates, DeploymentSelector, SelectionContext, SelectionTrace};
use crate::core::router::cooldown::CooldownManager;
use crate::core::router::deployment::{Deployment, ModelGroup};
use crate::utils::error::Result;
use async_trait::async_trait;
use rand::distributions::{Distribution, WeightedIndex};
use std::sync::Arc;

/// Picks among healthy deployments with probability proportional to each
/// deployment's `weight` (default `1.0`).
#[derive(Debug, Default)]
pub struct Weighted;

/// `None` means the field was absent, so the default of `1.0` applies;
/// `Some(w)` is clamped to non-negative so an explicit `weight: 0` really
/// does mean "never pick this one", not "fall back to the default".
fn weight_of(deployment: &Deployment) -> f64 {
    match deployment.provider_params.get("weight").and_then(serde_json::Value::as_f64) {
        Some(w) => w.max(0.0),
        None => 1.0,
    }
}

#[async_trait]
impl DeploymentSelector for Weighted {
    async fn pick(
        &self,
        group: &ModelGroup,
        cooldowns: &CooldownManager,
        _ctx: SelectionContext,
    ) -> Result<(Arc<Deployment>, SelectionTrace)> {
        let candidates = healthy_candidates(group, cooldowns).await?;
        let weights: Vec<f64> = candidates.iter().map(|d| weight_of(d)).collect();
        // `WeightedIndex` requires at least one positive weight; if every
        // candidate is explicitly weighted to zero, fall back to a uniform
        // choice among them rather than panicking.
        let dist = WeightedIndex::new(&weights);
        let idx = match dist {
            Ok(dist) => dist.sample(&mut rand::thread_rng()),
            Err(_) => rand::random::<usize>() % candidates.len(),
        };
        Ok((candidates[idx].clone(), SelectionTrace::default()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::store::InMemoryStore;
    use std::sync::Arc as StdArc;

    #[tokio::test]
    async fn zero_weight_deployments_are_never_picked() {
        let group = ModelGroup::new(
            "g",
            vec![
                Deployment::new("d1", "g", serde_json::json!({"weight": 0.0})),
                Deployment::new("d2", "g", serde_json::json!({"weight": 5.0})),
            ],
        )
        .unwrap();
        let cooldowns = CooldownManager::new(StdArc::new(InMemoryStore::new()));
        for _ in 0..20 {
            let (picked, _) = Weighted
                .pick(&group, &cooldowns, SelectionContext::default())
                .await
                .unwrap();
            assert_eq!(picked.id, "d2");
        }
    }

    #[test]
    fn missing_weight_defaults_to_one() {
        let d = Deployment::new("d1", "g", serde_json::json!({}));
        assert_eq!(weight_of(&d), 1.0);
    }
}
