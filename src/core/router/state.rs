//! Per-deployment runtime state: rolling latency/TTFT windows and the
//! current minute-bucket counters, held in the store under `"{group}_map"`.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Default cap on the rolling latency/TTFT windows.
pub const DEFAULT_WINDOW_SIZE: usize = 10;

/// Requests/tokens observed in the current minute bucket.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct MinuteCounters {
    pub tpm: u64,
    pub rpm: u64,
}

/// Rolling per-deployment metrics state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeploymentState {
    /// Bounded window of recent per-token latency samples (seconds/token).
    pub latency: Vec<f64>,
    /// Bounded window of recent time-to-first-token samples (seconds).
    pub ttft: Vec<f64>,
    /// The minute bucket `minute` was last observed/reset for.
    pub minute_bucket: String,
    pub minute: MinuteCounters,
}

impl DeploymentState {
    /// A freshly-seen deployment starts with a single zero latency sample
    /// so it participates in scoring instead of being skipped outright.
    pub fn cold_start() -> Self {
        Self {
            latency: vec![0.0],
            ttft: Vec::new(),
            minute_bucket: String::new(),
            minute: MinuteCounters::default(),
        }
    }

    /// Append `value` to the latency window, dropping the oldest sample(s)
    /// once the window exceeds `cap`.
    pub fn push_latency(&mut self, value: f64, cap: usize) {
        push_bounded(&mut self.latency, value, cap);
    }

    /// Append `value` to the TTFT window under the same bounded-window
    /// rule.
    pub fn push_ttft(&mut self, value: f64, cap: usize) {
        push_bounded(&mut self.ttft, value, cap);
    }

    /// Roll the minute-bucket counters over if `bucket` names a bucket we
    /// haven't seen yet.
    pub fn roll_minute(&mut self, bucket: &str) {
        if self.minute_bucket != bucket {
            self.minute_bucket = bucket.to_string();
            self.minute = MinuteCounters::default();
        }
    }
}

fn push_bounded(values: &mut Vec<f64>, value: f64, cap: usize) {
    values.push(value);
    if values.len() > cap {
        let excess = values.len() - cap;
        values.drain(0..excess);
    }
}

/// The value stored under `"{group}_map"`: per-deployment rolling state.
pub type GroupStateMap = HashMap<String, DeploymentState>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounded_window_drops_oldest() {
        let mut state = DeploymentState::default();
        for i in 0..15 {
            state.push_latency(i as f64, 10);
        }
        assert_eq!(state.latency.len(), 10);
        assert_eq!(state.latency, vec![5.0, 6.0, 7.0, 8.0, 9.0, 10.0, 11.0, 12.0, 13.0, 14.0]);
    }

    #[test]
    fn minute_rollover_resets_counters() {
        let mut state = DeploymentState::default();
        state.roll_minute("2026-01-01-00-00");
        state.minute.tpm = 100;
        state.minute.rpm = 5;
        state.roll_minute("2026-01-01-00-00");
        assert_eq!(state.minute.tpm, 100, "same bucket must not reset");
        state.roll_minute("2026-01-01-00-01");
        assert_eq!(state.minute.tpm, 0);
        assert_eq!(state.minute.rpm, 0);
    }

    #[test]
    fn cold_start_has_single_zero_sample() {
        let state = DeploymentState::cold_start();
        assert_eq!(state.latency, vec![0.0]);
        assert!(state.ttft.is_empty());
    }
}
