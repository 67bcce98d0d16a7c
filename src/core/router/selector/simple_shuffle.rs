//! Uniform random selection among healthy deployments.

use super::{healthy_candidates, DeploymentSelector, SelectionContext, SelectionTrace};
use crate::core::router::cooldown::CooldownManager;
use crate::core::router::deployment::{Deployment, ModelGroup};
use crate::utils::error::Result;
use async_trait::async_trait;
use rand::seq::SliceRandom;
use std::sync::Arc;

/// Picks uniformly at random among deployments not currently cooling down.
#[derive(Debug, Default)]
pub struct SimpleShuffle;

#[async_trait]
impl DeploymentSelector for SimpleShuffle {
    async fn pick(
        &self,
        group: &ModelGroup,
        cooldowns: &CooldownManager,
        _ctx: SelectionContext,
    ) -> Result<(Arc<Deployment>, SelectionTrace)> {
        let candidates = healthy_candidates(group, cooldowns).await?;
        let chosen = candidates
            .choose(&mut rand::thread_rng())
            .expect("healthy_candidates never returns empty");
        Ok(((*chosen).clone(), SelectionTrace::default()))
    }
}
