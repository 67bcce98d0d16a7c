//! Usage-based selection: prefers the deployment with the most remaining
//! tpm/rpm headroom this minute, falling back to shuffle among ties.

use super::{healthy_candidates, DeploymentSelector, SelectionContext, SelectionTrace};
use crate::core::router::cooldown::CooldownManager;
use crate::core::router::deployment::{Deployment, ModelGroup};
use crate::core::router::state::GroupStateMap;
use crate::core::store::{group_map_key, SharedStore, StoreExt};
use crate::utils::error::Result;
use async_trait::async_trait;
use rand::seq::SliceRandom;
use std::sync::Arc;

/// Picks the deployment with the most remaining tpm/rpm headroom.
#[derive(Debug)]
pub struct UsageBased {
    store: SharedStore,
}

impl UsageBased {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    fn headroom(&self, deployment: &Deployment, state: &GroupStateMap) -> f64 {
        let used = state.get(&deployment.id);
        let tpm_used = used.map(|s| s.minute.tpm as f64).unwrap_or(0.0);
        let rpm_used = used.map(|s| s.minute.rpm as f64).unwrap_or(0.0);
        let tpm_headroom = deployment.caps.tpm_limit() - tpm_used;
        let rpm_headroom = deployment.caps.rpm_limit() - rpm_used;
        tpm_headroom.min(rpm_headroom)
    }
}

#[async_trait]
impl DeploymentSelector for UsageBased {
    async fn pick(
        &self,
        group: &ModelGroup,
        cooldowns: &CooldownManager,
        _ctx: SelectionContext,
    ) -> Result<(Arc<Deployment>, SelectionTrace)> {
        let candidates = healthy_candidates(group, cooldowns).await?;
        let state: GroupStateMap = self
            .store
            .get(&group_map_key(&group.name))
            .await?
            .unwrap_or_default();

        let mut best_headroom = f64::NEG_INFINITY;
        let mut best: Vec<&Arc<Deployment>> = Vec::new();
        for candidate in &candidates {
            let headroom = self.headroom(candidate, &state);
            if headroom > best_headroom {
                best_headroom = headroom;
                best = vec![*candidate];
            } else if headroom == best_headroom {
                best.push(*candidate);
            }
        }
        let chosen = best
            .choose(&mut rand::thread_rng())
            .expect("at least one candidate survived healthy_candidates");
        Ok(((*chosen).clone(), SelectionTrace::default()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::router::state::{DeploymentState, MinuteCounters};
    use crate::core::router::deployment::DeploymentCaps;
    use crate::core::store::InMemoryStore;
    use std::time::Duration;

    #[tokio::test]
    async fn prefers_deployment_with_more_headroom() {
        let store = Arc::new(InMemoryStore::new());
        let group = ModelGroup::new(
            "g",
            vec![
                Deployment::new("busy", "g", serde_json::json!({}))
                    .with_caps(DeploymentCaps {
                        tpm: Some(1000),
                        rpm: Some(100),
                        max_parallel: None,
                    }),
                Deployment::new("idle", "g", serde_json::json!({}))
                    .with_caps(DeploymentCaps {
                        tpm: Some(1000),
                        rpm: Some(100),
                        max_parallel: None,
                    }),
            ],
        )
        .unwrap();

        let mut state = GroupStateMap::new();
        state.insert(
            "busy".to_string(),
            DeploymentState {
                minute: MinuteCounters { tpm: 900, rpm: 90 },
                ..DeploymentState::cold_start()
            },
        );
        store
            .set(&group_map_key("g"), &state, Duration::from_secs(3600))
            .await
            .unwrap();

        let cooldowns = CooldownManager::new(store.clone());
        let selector = UsageBased::new(store);
        let (picked, _) = selector
            .pick(&group, &cooldowns, SelectionContext::default())
            .await
            .unwrap();
        assert_eq!(picked.id, "idle");
    }
}
