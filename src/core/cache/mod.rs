//! Request-level response cache with single-flight collapsing
//!
//! Maps `fingerprint -> response` with a single-flight guarantee:
//! at most one upstream call is ever in flight per fingerprint across
//! all tasks sharing a [`Cache`] instance. Concurrent callers racing on the
//! same fingerprint either win the race (and must eventually call
//! [`Cache::finalize`] or [`Cache::abort`]) or wait on the winner.

pub mod fingerprint;
pub mod memory;

pub use fingerprint::{fingerprint_audio, fingerprint_text, AudioInput, RequestFingerprint};
pub use memory::InMemoryCache;

use async_trait::async_trait;
use serde_json::Value;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

/// Outcome of [`Cache::lookup_or_claim`].
#[derive(Debug, Clone)]
pub enum LookupOutcome {
    /// A prior response is cached and ready to serve.
    Hit(Value),
    /// No entry existed; the caller has placed the in-progress sentinel and
    /// owns the obligation to call [`Cache::finalize`] or [`Cache::abort`].
    Claimed,
    /// Another caller already holds the sentinel for this fingerprint; we
    /// waited for it and it completed with `Some(value)`, or it aborted /
    /// the wait timed out (`None`, in which case the caller should treat
    /// this as a miss and issue the upstream call itself).
    WaitedForOther(Option<Value>),
}

/// Targets of an external invalidation signal.
#[derive(Debug, Clone)]
pub enum Invalidation {
    /// Purge only the listed fingerprints.
    Keys(Vec<RequestFingerprint>),
    /// Purge every cached entry.
    Wildcard,
}

/// Request-level cache contract. Backends may be in-process or remote
/// (e.g. Redis); only the in-process backend is implemented here, with
/// the trait boundary specified so a remote backend can be added later.
#[async_trait]
pub trait Cache: Send + Sync + Debug {
    /// Look up `fingerprint`. On a miss, atomically place an in-progress
    /// sentinel and return [`LookupOutcome::Claimed`]; on an existing
    /// sentinel, wait (bounded by `wait_timeout`) for the winner to finish.
    async fn lookup_or_claim(
        &self,
        fingerprint: &RequestFingerprint,
        wait_timeout: Duration,
    ) -> LookupOutcome;

    /// Store the final response and clear the in-progress sentinel, waking
    /// any waiters.
    async fn finalize(&self, fingerprint: &RequestFingerprint, value: Value, ttl: Duration);

    /// Clear the in-progress sentinel without storing a value (the upstream
    /// call failed, was cancelled, or the content was classified
    /// non-cacheable). Waiters observe this as `WaitedForOther(None)`.
    async fn abort(&self, fingerprint: &RequestFingerprint);

    /// Apply an external invalidation signal.
    async fn invalidate(&self, signal: Invalidation);
}

/// Shared, dynamically dispatched cache handle.
pub type SharedCache = Arc<dyn Cache>;
