//! Keyed, expirable state store with atomic compound updates
//!
//! This is the primary hot spot described in the concurrency model: every
//! deployment-state mutation goes through [`StoreExt::update`], which must
//! be atomic with respect to other concurrent `update` calls on the same
//! key. Two backends are provided: [`memory::InMemoryStore`] for
//! single-process deployments, and [`redis::RedisStore`] (behind the
//! `redis` feature) for multi-process deployments using optimistic
//! compare-and-set.
//!
//! [`Store`] itself is object-safe (it only ever moves `serde_json::Value`)
//! so it can be held as `Arc<dyn Store>`; the ergonomic, strongly-typed API
//! callers actually use is [`StoreExt`], a blanket extension trait that
//! (de)serializes through the raw methods.

pub mod memory;
#[cfg(feature = "redis")]
pub mod redis;

pub use memory::InMemoryStore;
#[cfg(feature = "redis")]
pub use self::redis::RedisStore;

use crate::utils::error::{GatewayError, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

/// Object-safe, JSON-valued keyed store. See the module docs for why this
/// layer is untyped and [`StoreExt`] is the typed surface callers use.
#[async_trait]
pub trait Store: Send + Sync + Debug {
    /// Non-blocking read. Returns `Ok(None)` on a cache miss; backends never
    /// fail the caller's in-flight request for a missing or unreadable key.
    async fn get_raw(&self, key: &str) -> Result<Option<Value>>;

    /// Overwrite a value. `ttl` is advisory but must be honored by every
    /// backend (the in-memory backend enforces it with a lazy sweep on
    /// read).
    async fn set_raw(&self, key: &str, value: Value, ttl: Duration) -> Result<()>;

    /// Atomic read-modify-write. `update_fn` receives the current raw value
    /// (or `None` on a miss) and returns the new value to persist. It must
    /// be a pure function of its input: remote-KV backends implement this
    /// with optimistic concurrency (version/CAS) and may invoke it more
    /// than once, re-applying it to whichever value actually won a race,
    /// retried a bounded number of times ([`DEFAULT_CAS_RETRIES`]); on
    /// exhaustion the update is dropped with a warning rather than failing
    /// the caller.
    async fn update_raw(
        &self,
        key: &str,
        ttl: Duration,
        update_fn: Box<dyn Fn(Option<Value>) -> Value + Send + Sync>,
    ) -> Result<Value>;

    /// Remove a key outright.
    async fn delete(&self, key: &str) -> Result<()>;
}

/// Shared, dynamically dispatched store handle.
pub type SharedStore = Arc<dyn Store>;

/// Typed convenience API layered over [`Store`]'s raw JSON methods.
///
/// Blanket-implemented for every `Store`, including `dyn Store`, so callers
/// never interact with `serde_json::Value` directly.
#[async_trait]
pub trait StoreExt: Store {
    /// Typed read; a stored value that fails to deserialize into `V` is
    /// treated as a miss rather than propagated as an error, matching the
    /// "read failures degrade gracefully" rule.
    async fn get<V>(&self, key: &str) -> Result<Option<V>>
    where
        V: DeserializeOwned + Send,
    {
        match self.get_raw(key).await? {
            Some(raw) => Ok(serde_json::from_value(raw).ok()),
            None => Ok(None),
        }
    }

    /// Typed overwrite.
    async fn set<V>(&self, key: &str, value: &V, ttl: Duration) -> Result<()>
    where
        V: Serialize + Sync,
    {
        let raw = serde_json::to_value(value).map_err(GatewayError::Serialization)?;
        self.set_raw(key, raw, ttl).await
    }

    /// Typed atomic read-modify-write.
    async fn update<V, F>(&self, key: &str, ttl: Duration, update_fn: F) -> Result<V>
    where
        V: Serialize + DeserializeOwned + Send + Sync + Clone + 'static,
        F: Fn(Option<V>) -> V + Send + Sync + 'static,
    {
        let raw = self
            .update_raw(
                key,
                ttl,
                Box::new(move |current: Option<Value>| {
                    let typed: Option<V> = current.and_then(|v| serde_json::from_value(v).ok());
                    let next = update_fn(typed);
                    serde_json::to_value(next).expect("value serializable by construction")
                }),
            )
            .await?;
        serde_json::from_value(raw).map_err(GatewayError::Serialization)
    }
}

impl<T: Store + ?Sized> StoreExt for T {}

/// Default bounded retry count for optimistic compare-and-set backends.
pub const DEFAULT_CAS_RETRIES: u32 = 3;

/// Store key for a model group's per-deployment state map.
pub fn group_map_key(group: &str) -> String {
    format!("{group}_map")
}

/// Store key for a deployment's latest health status.
pub fn health_key(deployment_id: &str) -> String {
    format!("health:{deployment_id}")
}

/// Store key for a deployment's cooldown entry.
pub fn cooldown_key(deployment_id: &str) -> String {
    format!("cooldown:{deployment_id}")
}
