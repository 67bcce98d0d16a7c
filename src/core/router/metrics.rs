//! Per-deployment metrics recording
//!
//! Consumes completed/failed calls and folds them into the
//! [`DeploymentState`] held under a model group's `"{group}_map"` key,
//! through the [`Store`]'s atomic `update`. All arithmetic here is
//! zero-division-safe: a zero-token completion must never panic or
//! produce `NaN`/`inf` propagating into the selector's comparisons.

use crate::core::clock::SharedClock;
use crate::core::router::state::{DeploymentState, GroupStateMap};
use crate::core::store::{group_map_key, SharedStore, StoreExt};
use crate::utils::error::Result;
use std::time::Duration;

/// Clamp applied to a single latency-per-token sample before it enters the
/// rolling window, guarding against
/// one pathological sample dominating the median.
pub const DEFAULT_MAX_LATENCY_PER_TOKEN: f64 = 60.0;

/// Clamp applied to a single TTFT sample.
pub const DEFAULT_MAX_TTFT: f64 = 60.0;

/// Minimum `completion_tokens` before a sample is divided by token count at
/// all; below this, the raw elapsed seconds are recorded instead so a
/// handful of tokens can't produce an outlier per-token spike.
pub const DEFAULT_MIN_TOKENS_FOR_LATENCY: u64 = 5;

/// Penalty latency-per-token value appended on a transient failure, so a
/// flaky deployment's score degrades even before `CooldownManager` excludes
/// it outright. Large enough to sort last, not so large that median/mean
/// scoring overflows.
pub const FAILURE_PENALTY_SECONDS_PER_TOKEN: f64 = 1000.0;

/// Records successes and failures into per-deployment rolling state.
#[derive(Clone)]
pub struct MetricsRecorder {
    store: SharedStore,
    clock: SharedClock,
    window_size: usize,
    max_latency_per_token: f64,
    max_ttft: f64,
    min_tokens_for_latency: u64,
}

impl MetricsRecorder {
    pub fn new(store: SharedStore, clock: SharedClock) -> Self {
        Self {
            store,
            clock,
            window_size: crate::core::router::state::DEFAULT_WINDOW_SIZE,
            max_latency_per_token: DEFAULT_MAX_LATENCY_PER_TOKEN,
            max_ttft: DEFAULT_MAX_TTFT,
            min_tokens_for_latency: DEFAULT_MIN_TOKENS_FOR_LATENCY,
        }
    }

    pub fn with_window_size(mut self, window_size: usize) -> Self {
        self.window_size = window_size;
        self
    }

    pub fn with_min_tokens_for_latency(mut self, min_tokens_for_latency: u64) -> Self {
        self.min_tokens_for_latency = min_tokens_for_latency;
        self
    }

    pub fn with_max_latency_per_token(mut self, max_latency_per_token: f64) -> Self {
        self.max_latency_per_token = max_latency_per_token;
        self
    }

    pub fn with_max_ttft(mut self, max_ttft: f64) -> Self {
        self.max_ttft = max_ttft;
        self
    }

    /// Record a successful call. `completion_tokens` of `0` is handled by
    /// skipping the per-token latency sample entirely rather than dividing
    /// by zero.
    pub async fn on_success(
        &self,
        group: &str,
        deployment_id: &str,
        elapsed: Duration,
        completion_tokens: u64,
        ttft: Option<Duration>,
    ) -> Result<()> {
        let deployment_id = deployment_id.to_string();
        let bucket = self.clock.minute_bucket();
        let window_size = self.window_size;
        let max_latency_per_token = self.max_latency_per_token;
        let max_ttft = self.max_ttft;
        let min_tokens_for_latency = self.min_tokens_for_latency;
        let elapsed_secs = elapsed.as_secs_f64();

        self.store
            .update(
                &group_map_key(group),
                Duration::from_secs(3600),
                move |current: Option<GroupStateMap>| {
                    let mut map = current.unwrap_or_default();
                    let entry = map.entry(deployment_id.clone()).or_insert_with(DeploymentState::cold_start);

                    // Below the threshold (including zero tokens) a raw
                    // division would either divide by zero or let a tiny
                    // response's per-token latency spike unrealistically;
                    // record the elapsed time itself instead.
                    let per_token = if completion_tokens >= min_tokens_for_latency {
                        elapsed_secs / completion_tokens as f64
                    } else {
                        elapsed_secs
                    };
                    entry.push_latency(per_token.min(max_latency_per_token), window_size);

                    if let Some(ttft) = ttft {
                        entry.push_ttft(ttft.as_secs_f64().min(max_ttft), window_size);
                    }
                    entry.roll_minute(&bucket);
                    entry.minute.tpm += completion_tokens;
                    entry.minute.rpm += 1;
                    map
                },
            )
            .await?;
        Ok(())
    }

    /// Record a transient failure that should degrade (not necessarily
    /// cool down) the deployment's score.
    pub async fn on_failure(&self, group: &str, deployment_id: &str) -> Result<()> {
        let deployment_id = deployment_id.to_string();
        let bucket = self.clock.minute_bucket();
        let window_size = self.window_size;

        self.store
            .update(
                &group_map_key(group),
                Duration::from_secs(3600),
                move |current: Option<GroupStateMap>| {
                    let mut map = current.unwrap_or_default();
                    let entry = map.entry(deployment_id.clone()).or_insert_with(DeploymentState::cold_start);
                    entry.push_latency(FAILURE_PENALTY_SECONDS_PER_TOKEN, window_size);
                    entry.roll_minute(&bucket);
                    entry.minute.rpm += 1;
                    map
                },
            )
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::clock::system_clock;
    use crate::core::store::InMemoryStore;
    use std::sync::Arc;

    fn recorder() -> MetricsRecorder {
        MetricsRecorder::new(Arc::new(InMemoryStore::new()), system_clock())
    }

    #[tokio::test]
    async fn zero_completion_tokens_records_raw_elapsed_without_dividing() {
        let rec = recorder();
        rec.on_success("g", "d1", Duration::from_millis(500), 0, None)
            .await
            .unwrap();
        let map: GroupStateMap = rec.store.get(&group_map_key("g")).await.unwrap().unwrap();
        let state = &map["d1"];
        assert_eq!(state.latency, vec![0.5], "zero-token sample falls back to response_seconds");
        assert_eq!(state.minute.tpm, 0);
        assert_eq!(state.minute.rpm, 1);
    }

    #[tokio::test]
    async fn below_min_tokens_threshold_uses_raw_elapsed_not_per_token() {
        let rec = recorder();
        // 2 tokens is below the default min_tokens_for_latency (5); dividing
        // by 2 would produce an unrealistic per-token spike for a tiny
        // response, so the raw elapsed seconds are recorded instead.
        rec.on_success("g", "d1", Duration::from_millis(400), 2, None)
            .await
            .unwrap();
        let map: GroupStateMap = rec.store.get(&group_map_key("g")).await.unwrap().unwrap();
        assert_eq!(map["d1"].latency, vec![0.4]);
    }

    #[tokio::test]
    async fn at_or_above_min_tokens_threshold_divides_by_token_count() {
        let rec = recorder();
        rec.on_success("g", "d1", Duration::from_secs(3), 50, None)
            .await
            .unwrap();
        let map: GroupStateMap = rec.store.get(&group_map_key("g")).await.unwrap().unwrap();
        assert_eq!(map["d1"].latency, vec![0.06]);
    }

    #[tokio::test]
    async fn success_clamps_pathological_latency() {
        let rec = recorder();
        rec.on_success("g", "d1", Duration::from_secs(600), 1, None)
            .await
            .unwrap();
        let map: GroupStateMap = rec.store.get(&group_map_key("g")).await.unwrap().unwrap();
        assert_eq!(map["d1"].latency, vec![DEFAULT_MAX_LATENCY_PER_TOKEN]);
    }

    #[tokio::test]
    async fn failure_appends_penalty_sample() {
        let rec = recorder();
        rec.on_failure("g", "d1").await.unwrap();
        let map: GroupStateMap = rec.store.get(&group_map_key("g")).await.unwrap().unwrap();
        assert_eq!(map["d1"].latency, vec![FAILURE_PENALTY_SECONDS_PER_TOKEN]);
    }
}
