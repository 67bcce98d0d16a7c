//! Latency-based deployment selection
//!
//! Grounded line-for-line in
//! `router_strategy/lowest_latency.py`'s `_get_available_deployments`: sample
//! candidates in random order (tie-break against "all zero" cold starts),
//! filter by tpm/rpm headroom, score each by `robust_average` of its
//! rolling latency (or TTFT, for streamed requests, with latency as the
//! secondary sort key), sort, then pick uniformly at random among
//! candidates within `lowest_latency_buffer` of the best score.

use super::{CandidateScore, DeploymentSelector, SelectionContext, SelectionTrace};
use crate::core::clock::{system_clock, SharedClock};
use crate::core::router::cooldown::CooldownManager;
use crate::core::router::deployment::{Deployment, ModelGroup};
use crate::core::router::state::{DeploymentState, GroupStateMap};
use crate::core::store::{group_map_key, SharedStore, StoreExt};
use crate::utils::error::{GatewayError, Result};
use async_trait::async_trait;
use rand::seq::SliceRandom;
use std::sync::Arc;

/// Fraction of the best score that still counts as "tied".
pub const DEFAULT_LATENCY_BUFFER: f64 = 0.0;

/// `_robust_average`: median of `values`, falling back to the arithmetic
/// mean if a median can't be computed, and `+inf` for an empty slice so an
/// unscored deployment sorts last rather than first.
pub fn robust_average(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::INFINITY;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let len = sorted.len();
    let median = if len % 2 == 1 {
        sorted[len / 2]
    } else {
        (sorted[len / 2 - 1] + sorted[len / 2]) / 2.0
    };
    if median.is_finite() {
        median
    } else {
        sorted.iter().sum::<f64>() / len as f64
    }
}

/// Latency-based selection strategy.
pub struct LowestLatency {
    store: SharedStore,
    clock: SharedClock,
    buffer: f64,
}

impl LowestLatency {
    pub fn new(store: SharedStore) -> Self {
        Self {
            store,
            clock: system_clock(),
            buffer: DEFAULT_LATENCY_BUFFER,
        }
    }

    pub fn with_buffer(mut self, buffer: f64) -> Self {
        self.buffer = buffer;
        self
    }

    /// Override the clock used to decide whether a deployment's per-minute
    /// counters are still current. Tests inject a [`FakeClock`](crate::core::clock::FakeClock)
    /// here to advance past a minute boundary without sleeping.
    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }
}

impl std::fmt::Debug for LowestLatency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LowestLatency").field("buffer", &self.buffer).finish()
    }
}

struct Candidate<'a> {
    deployment: &'a Arc<Deployment>,
    sort_score: f64,
    secondary_score: f64,
}

#[async_trait]
impl DeploymentSelector for LowestLatency {
    async fn pick(
        &self,
        group: &ModelGroup,
        cooldowns: &CooldownManager,
        ctx: SelectionContext,
    ) -> Result<(Arc<Deployment>, SelectionTrace)> {
        let healthy = super::healthy_candidates(group, cooldowns).await?;

        let mut state: GroupStateMap = self
            .store
            .get(&group_map_key(&group.name))
            .await?
            .unwrap_or_default();

        // Cold-start any healthy deployment we've never scored, so it
        // participates instead of being treated as infinitely slow.
        for deployment in &healthy {
            state
                .entry(deployment.id.clone())
                .or_insert_with(DeploymentState::cold_start);
        }

        // Randomize iteration order so, when every score ties (e.g. every
        // candidate is still cold-start), the eventual tie-break below
        // isn't biased by list order.
        let mut shuffled = healthy.clone();
        shuffled.shuffle(&mut rand::thread_rng());

        let current_bucket = self.clock.minute_bucket();
        let mut trace = SelectionTrace::default();
        let mut scored = Vec::with_capacity(shuffled.len());

        for &deployment in &shuffled {
            let deployment_state = state
                .get(&deployment.id)
                .expect("cold-started above for every healthy deployment");

            let latency_score = robust_average(&deployment_state.latency);
            let ttft_score = robust_average(&deployment_state.ttft);

            let use_ttft = ctx.stream && !deployment_state.ttft.is_empty();
            let (sort_score, secondary_score) = if use_ttft {
                (ttft_score, latency_score)
            } else {
                (latency_score, ttft_score)
            };

            trace.candidate_scores.insert(
                deployment.id.clone(),
                CandidateScore {
                    latency: latency_score,
                    ttft: ttft_score.is_finite().then_some(ttft_score),
                },
            );

            // `deployment_state.minute` is only ever updated from the write
            // path (`MetricsRecorder::on_success`/`on_failure`), so a
            // deployment excluded here never gets another chance to roll
            // its bucket on its own. Re-derive freshness against `now`
            // instead of trusting the stored counters: a bucket from a
            // past minute reads as `(0, 0)`, exactly as a fresh
            // `roll_minute` call would leave it.
            let (tpm_used, rpm_used) = if deployment_state.minute_bucket == current_bucket {
                (deployment_state.minute.tpm as f64, deployment_state.minute.rpm as f64)
            } else {
                (0.0, 0.0)
            };
            if tpm_used + ctx.estimated_input_tokens as f64 > deployment.caps.tpm_limit()
                || rpm_used + 1.0 > deployment.caps.rpm_limit()
            {
                continue;
            }

            scored.push(Candidate {
                deployment,
                sort_score,
                secondary_score,
            });
        }

        if scored.is_empty() {
            return Err(GatewayError::no_deployments_available(
                &group.name,
                shuffled.len(),
            ));
        }

        scored.sort_by(|a, b| {
            a.sort_score
                .partial_cmp(&b.sort_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(
                    a.secondary_score
                        .partial_cmp(&b.secondary_score)
                        .unwrap_or(std::cmp::Ordering::Equal),
                )
        });

        let best_score = scored[0].sort_score;
        let buffer = self.buffer * best_score;
        let within_buffer: Vec<&Candidate> = scored
            .iter()
            .take_while(|c| c.sort_score <= best_score + buffer)
            .collect();
        let eligible = if within_buffer.is_empty() {
            scored.iter().collect::<Vec<_>>()
        } else {
            within_buffer
        };

        let chosen = eligible
            .choose(&mut rand::thread_rng())
            .expect("scored is non-empty and eligible derives from it");

        Ok(((*chosen.deployment).clone(), trace))
    }
}
