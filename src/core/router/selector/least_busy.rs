//! Least-busy selection: prefers the deployment with the fewest requests
//! recorded in the current minute bucket.

use super::{healthy_candidates, DeploymentSelector, SelectionContext, SelectionTrace};
use crate::core::router::cooldown::CooldownManager;
use crate::core::router::deployment::ModelGroup;
use crate::core::router::state::GroupStateMap;
use crate::core::store::{group_map_key, SharedStore, StoreExt};
use crate::utils::error::Result;
use async_trait::async_trait;
use std::sync::Arc;

#[derive(Debug)]
pub struct LeastBusy {
    store: SharedStore,
}

impl LeastBusy {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl DeploymentSelector for LeastBusy {
    async fn pick(
        &self,
        group: &ModelGroup,
        cooldowns: &CooldownManager,
        _ctx: SelectionContext,
    ) -> Result<(Arc<crate::core::router::deployment::Deployment>, SelectionTrace)> {
        let candidates = healthy_candidates(group, cooldowns).await?;
        let state: GroupStateMap = self
            .store
            .get(&group_map_key(&group.name))
            .await?
            .unwrap_or_default();

        let least_busy = candidates
            .into_iter()
            .min_by_key(|d| state.get(&d.id).map(|s| s.minute.rpm).unwrap_or(0))
            .expect("healthy_candidates never returns empty");
        Ok((least_busy.clone(), SelectionTrace::default()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::router::deployment::Deployment;
    use crate::core::router::state::{DeploymentState, MinuteCounters};
    use crate::core::store::InMemoryStore;
    use std::time::Duration;

    #[tokio::test]
    async fn prefers_least_requests_this_minute() {
        let store = Arc::new(InMemoryStore::new());
        let group = ModelGroup::new(
            "g",
            vec![
                Deployment::new("busy", "g", serde_json::json!({})),
                Deployment::new("idle", "g", serde_json::json!({})),
            ],
        )
        .unwrap();

        let mut state = GroupStateMap::new();
        state.insert(
            "busy".to_string(),
            DeploymentState {
                minute: MinuteCounters { tpm: 0, rpm: 42 },
                ..DeploymentState::cold_start()
            },
        );
        store
            .set(&group_map_key("g"), &state, Duration::from_secs(3600))
            .await
            .unwrap();

        let cooldowns = CooldownManager::new(store.clone());
        let selector = LeastBusy::new(store);
        let (picked, _) = selector
            .pick(&group, &cooldowns, SelectionContext::default())
            .await
            .unwrap();
        assert_eq!(picked.id, "idle");
    }
}
