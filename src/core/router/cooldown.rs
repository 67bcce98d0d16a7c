//! Deployment cooldown tracking
//!
//! Mirrors a `router::error::CooldownReason`-style taxonomy, but
//! carries the cooldown *state* itself through the [`Store`] rather than
//! an in-process map, so a Redis-backed deployment shares cooldowns across
//! processes.

use crate::core::providers::ErrorKind;
use crate::core::store::{cooldown_key, SharedStore, StoreExt};
use crate::utils::error::Result;
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime};

/// Why a deployment was placed into cooldown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CooldownReason {
    RateLimit,
    AuthError,
    NotFound,
    Timeout,
    ConnectionError,
    ServerError,
    ConsecutiveFailures,
    Manual,
}

impl CooldownReason {
    /// The qualifying-reason table: which [`ErrorKind`]s put a
    /// deployment in cooldown at all, and why. `None` means the error
    /// never qualifies (bad requests, content filtering, cancellation).
    pub fn from_error_kind(kind: &ErrorKind) -> Option<Self> {
        match kind {
            ErrorKind::RateLimited { .. } => Some(CooldownReason::RateLimit),
            ErrorKind::Unauthorized => Some(CooldownReason::AuthError),
            ErrorKind::NotFound => Some(CooldownReason::NotFound),
            ErrorKind::Timeout => Some(CooldownReason::Timeout),
            ErrorKind::ConnectionError => Some(CooldownReason::ConnectionError),
            ErrorKind::ServiceUnavailable | ErrorKind::InternalServerError => {
                Some(CooldownReason::ServerError)
            }
            ErrorKind::BadRequest
            | ErrorKind::ContextWindowExceeded { .. }
            | ErrorKind::ContentPolicyViolation
            | ErrorKind::Cancelled => None,
        }
    }
}

/// Persisted cooldown entry for one deployment.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CooldownEntry {
    reason: CooldownReason,
    until_epoch_secs: f64,
}

/// Default cooldown duration when a deployment doesn't override it.
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(60);

/// Default `allowed_fails`: how many qualifying failures a host-level
/// policy built on top of `CooldownManager` should tolerate before
/// escalating beyond the per-failure cooldown `mark` already applies. Not
/// consulted by `CooldownManager`/`RetryFallbackEngine` themselves (see
/// `DESIGN.md`); carried here only as the default for `RouterConfig`.
pub const DEFAULT_ALLOWED_FAILS: u32 = 3;

/// Tracks which deployments are currently cooling down, backed by a
/// [`Store`](crate::core::store::Store) so the state is shared across
/// processes when using the Redis backend.
#[derive(Debug, Clone)]
pub struct CooldownManager {
    store: SharedStore,
}

impl CooldownManager {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    /// The backing store, shared with whichever other component (health
    /// checker, selector) needs to read deployment state that isn't
    /// cooldown-specific.
    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    /// Place `deployment_id` into cooldown for `duration` for `reason`.
    pub async fn mark(
        &self,
        deployment_id: &str,
        reason: CooldownReason,
        duration: Duration,
    ) -> Result<()> {
        let until = SystemTime::now() + duration;
        let until_epoch_secs = until
            .duration_since(SystemTime::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs_f64();
        self.store
            .set(
                &cooldown_key(deployment_id),
                &CooldownEntry {
                    reason,
                    until_epoch_secs,
                },
                duration,
            )
            .await
    }

    /// True if `deployment_id` is currently cooling down.
    pub async fn is_cooling(&self, deployment_id: &str) -> Result<bool> {
        Ok(self.cooling_reason(deployment_id).await?.is_some())
    }

    /// The reason `deployment_id` is cooling down, if it is.
    pub async fn cooling_reason(&self, deployment_id: &str) -> Result<Option<CooldownReason>> {
        let entry: Option<CooldownEntry> = self.store.get(&cooldown_key(deployment_id)).await?;
        let now = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs_f64();
        Ok(entry
            .filter(|e| e.until_epoch_secs > now)
            .map(|e| e.reason))
    }

    /// Clear a deployment's cooldown early (e.g. after an operator action).
    pub async fn clear(&self, deployment_id: &str) -> Result<()> {
        self.store.delete(&cooldown_key(deployment_id)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::store::InMemoryStore;
    use std::sync::Arc;

    fn manager() -> CooldownManager {
        CooldownManager::new(Arc::new(InMemoryStore::new()))
    }

    #[tokio::test]
    async fn marking_then_checking_reports_cooling() {
        let mgr = manager();
        mgr.mark("d1", CooldownReason::RateLimit, Duration::from_secs(30))
            .await
            .unwrap();
        assert!(mgr.is_cooling("d1").await.unwrap());
        assert_eq!(
            mgr.cooling_reason("d1").await.unwrap(),
            Some(CooldownReason::RateLimit)
        );
    }

    #[tokio::test]
    async fn clearing_ends_cooldown() {
        let mgr = manager();
        mgr.mark("d1", CooldownReason::Manual, Duration::from_secs(30))
            .await
            .unwrap();
        mgr.clear("d1").await.unwrap();
        assert!(!mgr.is_cooling("d1").await.unwrap());
    }

    #[tokio::test]
    async fn unknown_deployment_is_not_cooling() {
        let mgr = manager();
        assert!(!mgr.is_cooling("missing").await.unwrap());
    }

    #[test]
    fn bad_request_never_qualifies_for_cooldown() {
        assert_eq!(CooldownReason::from_error_kind(&ErrorKind::BadRequest), None);
        assert_eq!(
            CooldownReason::from_error_kind(&ErrorKind::ContentPolicyViolation),
            None
        );
        assert_eq!(CooldownReason::from_error_kind(&ErrorKind::Cancelled), None);
    }

    #[test]
    fn rate_limit_qualifies_for_cooldown() {
        assert_eq!(
            CooldownReason::from_error_kind(&ErrorKind::RateLimited { retry_after: None }),
            Some(CooldownReason::RateLimit)
        );
    }
}
