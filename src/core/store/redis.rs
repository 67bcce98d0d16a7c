//! Redis-backed [`Store`] for multi-process router deployments
//!
//! `update_raw` cannot rely on a client-held lock the way
//! [`super::memory::InMemoryStore`] does — other processes may be racing on
//! the same key — so it uses optimistic compare-and-set: read the current
//! value, compute the next one locally, then swap it in via a small Lua
//! script that only writes if the value hasn't changed since the read.
//! On a losing race the script returns the value that won; we retry against
//! that value up to [`super::DEFAULT_CAS_RETRIES`] times, then drop the
//! update with a warning rather than fail the caller's request.

use super::{Store, DEFAULT_CAS_RETRIES};
use crate::utils::error::{GatewayError, Result};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde_json::Value;
use std::time::Duration;
use tracing::warn;

/// Lua CAS script: writes `ARGV[2]` with TTL `ARGV[3]` seconds if the
/// current value equals `ARGV[1]` (empty string means "expect missing"),
/// and always returns the value now stored under the key.
const CAS_SCRIPT: &str = r#"
local current = redis.call('GET', KEYS[1])
local expected = ARGV[1]
local matches = false
if current == false then
    matches = (expected == '')
else
    matches = (current == expected)
end
if matches then
    redis.call('SET', KEYS[1], ARGV[2], 'EX', ARGV[3])
    return ARGV[2]
else
    return current
end
"#;

/// Redis-backed keyed store, using a connection manager for automatic
/// reconnection.
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore").finish_non_exhaustive()
    }
}

impl RedisStore {
    /// Connect to Redis at `url`, e.g. `redis://127.0.0.1:6379`.
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url).map_err(GatewayError::Redis)?;
        let conn = client
            .get_connection_manager()
            .await
            .map_err(GatewayError::Redis)?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl Store for RedisStore {
    async fn get_raw(&self, key: &str) -> Result<Option<Value>> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(key).await.map_err(GatewayError::Redis)?;
        Ok(raw.and_then(|s| serde_json::from_str(&s).ok()))
    }

    async fn set_raw(&self, key: &str, value: Value, ttl: Duration) -> Result<()> {
        let mut conn = self.conn.clone();
        let encoded = value.to_string();
        let ttl_secs = ttl.as_secs().max(1);
        let _: () = conn
            .set_ex(key, encoded, ttl_secs)
            .await
            .map_err(GatewayError::Redis)?;
        Ok(())
    }

    async fn update_raw(
        &self,
        key: &str,
        ttl: Duration,
        update_fn: Box<dyn Fn(Option<Value>) -> Value + Send + Sync>,
    ) -> Result<Value> {
        let mut conn = self.conn.clone();
        let ttl_secs = ttl.as_secs().max(1).to_string();
        let script = redis::Script::new(CAS_SCRIPT);

        // First read drives the first attempt's "expected" value; on a
        // losing race the script's return value (the value that actually
        // won) becomes the next attempt's baseline, so the retry loop never
        // needs a second round-trip GET before recomputing.
        let mut expected: Option<String> = conn.get(key).await.map_err(GatewayError::Redis)?;

        for attempt in 0..DEFAULT_CAS_RETRIES {
            let current_value: Option<Value> = expected
                .as_ref()
                .and_then(|s| serde_json::from_str(s).ok());
            let next_encoded = update_fn(current_value).to_string();
            let expected_arg = expected.clone().unwrap_or_default();

            let won: String = script
                .key(key)
                .arg(expected_arg)
                .arg(&next_encoded)
                .arg(&ttl_secs)
                .invoke_async(&mut conn)
                .await
                .map_err(GatewayError::Redis)?;

            if won == next_encoded {
                return serde_json::from_str(&won).map_err(GatewayError::Serialization);
            }

            expected = Some(won);
            if attempt + 1 == DEFAULT_CAS_RETRIES {
                warn!(key, "redis CAS exhausted retries, dropping update");
                return serde_json::from_str(expected.as_deref().unwrap_or("null"))
                    .map_err(GatewayError::Serialization);
            }
        }

        unreachable!("loop above always returns within DEFAULT_CAS_RETRIES iterations")
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.del(key).await.map_err(GatewayError::Redis)?;
        Ok(())
    }
}
