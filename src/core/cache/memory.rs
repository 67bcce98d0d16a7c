//! In-process, single-flight [`Cache`] implementation
//!
//! Concurrency is cooperative, not a hard guarantee: two callers racing to
//! insert a sentinel for the same fingerprint might both observe a miss for
//! an instant, but `dashmap`'s per-shard locking means only one of them
//! actually wins the `entry()` call and becomes the claimant. The other
//! waits on a [`tokio::sync::Notify`] the claimant signals on completion.
//! This treats the cache as an optimization, not a correctness boundary.

use super::{Cache, Invalidation, LookupOutcome, RequestFingerprint};
use async_trait::async_trait;
use dashmap::mapref::entry::Entry as DashEntry;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Notify;

enum Slot {
    Ready {
        value: Value,
        expires_at: Instant,
    },
    InProgress {
        notify: Arc<Notify>,
        result: Arc<Mutex<Option<Value>>>,
    },
}

/// Single-process, single-flight response cache.
#[derive(Debug, Default)]
pub struct InMemoryCache {
    slots: DashMap<String, Slot>,
}

impl std::fmt::Debug for Slot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Slot::Ready { .. } => f.write_str("Slot::Ready"),
            Slot::InProgress { .. } => f.write_str("Slot::InProgress"),
        }
    }
}

impl InMemoryCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self {
            slots: DashMap::new(),
        }
    }
}

#[async_trait]
impl Cache for InMemoryCache {
    async fn lookup_or_claim(
        &self,
        fingerprint: &RequestFingerprint,
        wait_timeout: Duration,
    ) -> LookupOutcome {
        let key = fingerprint.as_str().to_string();
        let now = Instant::now();

        enum Next {
            Hit(Value),
            Claimed,
            Wait(Arc<Notify>, Arc<Mutex<Option<Value>>>),
        }

        let next = match self.slots.entry(key) {
            DashEntry::Occupied(mut occ) => match occ.get() {
                Slot::Ready { value, expires_at } if *expires_at > now => Next::Hit(value.clone()),
                Slot::Ready { .. } => {
                    let notify = Arc::new(Notify::new());
                    let result = Arc::new(Mutex::new(None));
                    occ.insert(Slot::InProgress {
                        notify: notify.clone(),
                        result: result.clone(),
                    });
                    Next::Claimed
                }
                Slot::InProgress { notify, result } => Next::Wait(notify.clone(), result.clone()),
            },
            DashEntry::Vacant(vac) => {
                let notify = Arc::new(Notify::new());
                let result = Arc::new(Mutex::new(None));
                vac.insert(Slot::InProgress {
                    notify: notify.clone(),
                    result: result.clone(),
                });
                Next::Claimed
            }
        };

        match next {
            Next::Hit(value) => LookupOutcome::Hit(value),
            Next::Claimed => LookupOutcome::Claimed,
            Next::Wait(notify, result) => {
                // The claimant may have already finished (and notified)
                // before we subscribed; check the stashed result first so
                // we don't wait on a notification that already fired.
                if let Some(value) = result.lock().clone() {
                    return LookupOutcome::WaitedForOther(Some(value));
                }
                let _ = tokio::time::timeout(wait_timeout, notify.notified()).await;
                LookupOutcome::WaitedForOther(result.lock().clone())
            }
        }
    }

    async fn finalize(&self, fingerprint: &RequestFingerprint, value: Value, ttl: Duration) {
        let key = fingerprint.as_str().to_string();
        let notify = match self.slots.get(&key) {
            Some(slot) => match slot.value() {
                Slot::InProgress { notify, result } => {
                    *result.lock() = Some(value.clone());
                    Some(notify.clone())
                }
                Slot::Ready { .. } => None,
            },
            None => None,
        };
        self.slots.insert(
            key,
            Slot::Ready {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
        if let Some(notify) = notify {
            notify.notify_waiters();
        }
    }

    async fn abort(&self, fingerprint: &RequestFingerprint) {
        let key = fingerprint.as_str().to_string();
        if let Some((_, Slot::InProgress { notify, .. })) = self.slots.remove(&key) {
            notify.notify_waiters();
        }
    }

    async fn invalidate(&self, signal: Invalidation) {
        match signal {
            Invalidation::Keys(fingerprints) => {
                for fp in fingerprints {
                    if let Some((_, Slot::InProgress { notify, .. })) =
                        self.slots.remove(fp.as_str())
                    {
                        notify.notify_waiters();
                    }
                }
            }
            Invalidation::Wildcard => {
                for entry in self.slots.iter() {
                    if let Slot::InProgress { notify, .. } = entry.value() {
                        notify.notify_waiters();
                    }
                }
                self.slots.clear();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::cache::fingerprint_text;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn miss_then_claim_then_hit() {
        let cache = InMemoryCache::new();
        let fp = fingerprint_text("g", &json!({"a": 1}));

        let outcome = cache.lookup_or_claim(&fp, Duration::from_millis(50)).await;
        assert!(matches!(outcome, LookupOutcome::Claimed));

        cache
            .finalize(&fp, json!({"resp": "ok"}), Duration::from_secs(60))
            .await;

        let outcome = cache.lookup_or_claim(&fp, Duration::from_millis(50)).await;
        match outcome {
            LookupOutcome::Hit(v) => assert_eq!(v, json!({"resp": "ok"})),
            other => panic!("expected hit, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn single_flight_collapses_concurrent_lookups() {
        let cache = Arc::new(InMemoryCache::new());
        let fp = fingerprint_text("g", &json!({"a": 1}));
        let upstream_calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = cache.clone();
            let fp = fp.clone();
            let upstream_calls = upstream_calls.clone();
            handles.push(tokio::spawn(async move {
                match cache.lookup_or_claim(&fp, Duration::from_millis(200)).await {
                    LookupOutcome::Claimed => {
                        upstream_calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        cache
                            .finalize(&fp, json!({"resp": "ok"}), Duration::from_secs(60))
                            .await;
                    }
                    LookupOutcome::WaitedForOther(Some(_)) => {}
                    other => panic!("unexpected outcome: {other:?}"),
                }
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(upstream_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn abort_releases_waiters_as_miss() {
        let cache = Arc::new(InMemoryCache::new());
        let fp = fingerprint_text("g", &json!({"a": 1}));

        let claimed = cache.lookup_or_claim(&fp, Duration::from_millis(50)).await;
        assert!(matches!(claimed, LookupOutcome::Claimed));

        let waiter_cache = cache.clone();
        let waiter_fp = fp.clone();
        let waiter = tokio::spawn(async move {
            waiter_cache
                .lookup_or_claim(&waiter_fp, Duration::from_millis(200))
                .await
        });

        tokio::time::sleep(Duration::from_millis(10)).await;
        cache.abort(&fp).await;

        let outcome = waiter.await.unwrap();
        assert!(matches!(outcome, LookupOutcome::WaitedForOther(None)));
    }

    #[tokio::test]
    async fn wildcard_invalidation_purges_everything() {
        let cache = InMemoryCache::new();
        let fp = fingerprint_text("g", &json!({"a": 1}));
        cache
            .finalize(&fp, json!({"resp": "ok"}), Duration::from_secs(60))
            .await;
        cache.invalidate(Invalidation::Wildcard).await;
        let outcome = cache.lookup_or_claim(&fp, Duration::from_millis(10)).await;
        assert!(matches!(outcome, LookupOutcome::Claimed));
    }
}
