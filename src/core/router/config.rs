//! Router-tunable configuration
//!
//! Loading this from YAML/env is explicitly out of scope; the struct
//! itself — and its defaults — are part of the core, following the
//! familiar pattern of a plain `Deserialize + Default` settings struct
//! consumed by the rest of the module.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// `num_retries`: attempts across the primary group and fallbacks.
    pub num_retries: u32,
    /// `cooldown_time`: default cooldown duration in seconds.
    pub cooldown_time_seconds: u64,
    /// `default_timeout`: per-attempt provider-call timeout, in seconds,
    /// used by any deployment that doesn't set its own `timeout` override.
    /// Also bounds the overall wall-clock budget across every retry and
    /// fallback attempt for a single request.
    pub default_timeout_seconds: u64,
    /// `allowed_fails`: number of qualifying failures a deployment may
    /// accrue before a host-level policy layered on top of this crate
    /// should cool it down more aggressively than the per-failure cooldown
    /// already applied by `RetryFallbackEngine`. Carried through as a
    /// recognized option; see `DESIGN.md` for why it isn't consulted here.
    pub allowed_fails: u32,
    /// `health_check_interval`: seconds between background health probe
    /// rounds when `background_health_checks` is enabled.
    pub health_check_interval_seconds: u64,
    /// `background_health_checks`: run `HealthChecker::check_group` on a
    /// timer instead of only on-demand via `readiness()`/`health_check()`.
    pub background_health_checks: bool,
    /// `max_latency_list_size`: cap on the rolling latency/TTFT windows.
    pub max_latency_list_size: usize,
    /// `max_latency_seconds_per_token`.
    pub max_latency_seconds_per_token: f64,
    /// `max_ttft_seconds`.
    pub max_ttft_seconds: f64,
    /// `min_tokens_for_latency`: below this, a success sample records raw
    /// elapsed seconds instead of dividing by `completion_tokens`.
    pub min_tokens_for_latency: u64,
    /// `lowest_latency_buffer`.
    pub lowest_latency_buffer: f64,
    /// `max_concurrent_health_checks`.
    pub max_concurrent_health_checks: usize,
    /// `allow_requests_on_db_unavailable`.
    pub allow_requests_on_db_unavailable: bool,
    /// `turn_off_message_logging`.
    pub turn_off_message_logging: bool,
    /// cache wait timeout, in milliseconds, for a single-flight
    /// follower waiting on the in-flight leader.
    pub cache_wait_timeout_ms: u64,
    /// default TTL, in seconds, for store entries this router writes.
    pub store_entry_ttl_seconds: u64,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            num_retries: crate::core::router::retry::DEFAULT_MAX_ATTEMPTS,
            cooldown_time_seconds: crate::core::router::cooldown::DEFAULT_COOLDOWN.as_secs(),
            default_timeout_seconds: crate::core::router::retry::DEFAULT_TIMEOUT.as_secs(),
            allowed_fails: crate::core::router::cooldown::DEFAULT_ALLOWED_FAILS,
            health_check_interval_seconds: crate::core::router::health::DEFAULT_HEALTH_CHECK_INTERVAL.as_secs(),
            background_health_checks: false,
            max_latency_list_size: crate::core::router::state::DEFAULT_WINDOW_SIZE,
            max_latency_seconds_per_token: crate::core::router::metrics::DEFAULT_MAX_LATENCY_PER_TOKEN,
            max_ttft_seconds: crate::core::router::metrics::DEFAULT_MAX_TTFT,
            min_tokens_for_latency: crate::core::router::metrics::DEFAULT_MIN_TOKENS_FOR_LATENCY,
            lowest_latency_buffer: crate::core::router::selector::lowest_latency::DEFAULT_LATENCY_BUFFER,
            max_concurrent_health_checks: crate::core::router::health::DEFAULT_MAX_CONCURRENT_PROBES,
            allow_requests_on_db_unavailable: true,
            turn_off_message_logging: false,
            cache_wait_timeout_ms: 500,
            store_entry_ttl_seconds: 3600,
        }
    }
}
