//! Redis-backed counter store.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};

use super::CounterStore;
use crate::error::Result;

/// Prefix for block flags, keeping them disjoint from counter keys.
const BLOCK_PREFIX: &str = "block:";

/// Redis implementation of [`CounterStore`].
///
/// All replicas of the service pointed at the same Redis observe the same
/// counters and block flags. Per-key atomicity comes from Redis itself:
/// `INCR` serializes concurrent increments, so no coordination happens in
/// this process.
pub struct RedisStore {
    connection: ConnectionManager,
}

impl RedisStore {
    /// Connect to Redis.
    ///
    /// The connection is established eagerly; an unreachable server fails
    /// here rather than on the first request.
    pub async fn connect(url: &str) -> Result<Self> {
        let client = Client::open(url)?;
        let connection = ConnectionManager::new(client).await?;
        Ok(Self { connection })
    }

    fn block_key(key: &str) -> String {
        format!("{}{}", BLOCK_PREFIX, key)
    }
}

#[async_trait]
impl CounterStore for RedisStore {
    async fn increment(&self, key: &str, expiry: Duration) -> Result<u64> {
        let mut conn = self.connection.clone();
        let count: u64 = conn.incr(key, 1u64).await?;

        // Only the increment that created the key anchors the window.
        if count == 1 {
            conn.expire::<_, ()>(key, expiry.as_secs() as i64).await?;
        }
        Ok(count)
    }

    async fn get(&self, key: &str) -> Result<u64> {
        let mut conn = self.connection.clone();
        let count: Option<u64> = conn.get(key).await?;
        Ok(count.unwrap_or(0))
    }

    async fn set_expiration(&self, key: &str, expiry: Duration) -> Result<()> {
        let mut conn = self.connection.clone();
        conn.expire::<_, ()>(key, expiry.as_secs() as i64).await?;
        Ok(())
    }

    async fn is_blocked(&self, key: &str) -> Result<bool> {
        let mut conn = self.connection.clone();
        let blocked: bool = conn.exists(Self::block_key(key)).await?;
        Ok(blocked)
    }

    async fn block(&self, key: &str, duration: Duration) -> Result<()> {
        let mut conn = self.connection.clone();
        conn.set_ex::<_, _, ()>(Self::block_key(key), "true", duration.as_secs())
            .await?;
        conn.del::<_, ()>(key).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_key_prefix() {
        assert_eq!(RedisStore::block_key("ip:10.0.0.1"), "block:ip:10.0.0.1");
        assert_eq!(RedisStore::block_key("token:abc"), "block:token:abc");
    }
}
