//! In-process `Store` backed by a sharded concurrent map
//!
//! Atomicity of [`Store::update_raw`] comes from `dashmap`'s per-shard
//! locking: the read-modify-write closure runs while the shard's lock is
//! held, so two concurrent `update_raw` calls on the same key never
//! interleave. TTL is advisory and enforced lazily: an expired entry is
//! treated as absent on the next read and evicted at that point.

use super::Store;
use crate::utils::error::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use std::time::{Duration, Instant};

struct Entry {
    value: Value,
    expires_at: Instant,
}

/// In-memory, single-process [`Store`] implementation.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    map: DashMap<String, Entry>,
}

impl std::fmt::Debug for Entry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Entry").field("value", &self.value).finish()
    }
}

impl InMemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            map: DashMap::new(),
        }
    }

    /// Number of live (non-expired) entries. Intended for tests/diagnostics.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.map.iter().filter(|e| e.expires_at > now).count()
    }

    /// True when the store has no live entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn get_raw(&self, key: &str) -> Result<Option<Value>> {
        let now = Instant::now();
        match self.map.get(key) {
            Some(entry) if entry.expires_at > now => Ok(Some(entry.value.clone())),
            Some(_) => {
                self.map.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set_raw(&self, key: &str, value: Value, ttl: Duration) -> Result<()> {
        self.map.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn update_raw(
        &self,
        key: &str,
        ttl: Duration,
        update_fn: Box<dyn Fn(Option<Value>) -> Value + Send + Sync>,
    ) -> Result<Value> {
        let now = Instant::now();
        let mut slot = self.map.entry(key.to_string()).or_insert_with(|| Entry {
            value: Value::Null,
            expires_at: now,
        });

        let current = if slot.expires_at > now {
            Some(slot.value.clone())
        } else {
            None
        };
        let next = update_fn(current);
        slot.value = next.clone();
        slot.expires_at = now + ttl;
        Ok(next)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.map.remove(key);
        Ok(())
    }
}
