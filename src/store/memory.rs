//! In-memory counter store.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::RwLock;

use super::CounterStore;
use crate::error::Result;

/// A counter with its window expiry.
#[derive(Debug, Clone, Copy)]
struct CounterEntry {
    count: u64,
    expires_at: Instant,
}

/// In-process implementation of [`CounterStore`].
///
/// Counters and block flags live in separate maps, mirroring the disjoint
/// namespaces a networked store uses. Expiry is evaluated lazily on access;
/// an expired entry behaves exactly like an absent one.
///
/// Suitable for tests and single-node deployments. It cannot coordinate
/// limits across processes; use [`super::RedisStore`] for that.
#[derive(Debug, Default)]
pub struct MemoryStore {
    counters: RwLock<HashMap<String, CounterEntry>>,
    blocks: RwLock<HashMap<String, Instant>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CounterStore for MemoryStore {
    async fn increment(&self, key: &str, expiry: Duration) -> Result<u64> {
        let now = Instant::now();
        let mut counters = self.counters.write();

        let entry = counters.entry(key.to_string()).or_insert(CounterEntry {
            count: 0,
            expires_at: now + expiry,
        });

        // An expired counter is indistinguishable from an absent one: the
        // next increment starts a new window and is the only point where
        // the expiry is (re)set.
        if now >= entry.expires_at {
            *entry = CounterEntry {
                count: 0,
                expires_at: now + expiry,
            };
        }

        entry.count += 1;
        Ok(entry.count)
    }

    async fn get(&self, key: &str) -> Result<u64> {
        let counters = self.counters.read();
        let count = match counters.get(key) {
            Some(entry) if Instant::now() < entry.expires_at => entry.count,
            _ => 0,
        };
        Ok(count)
    }

    async fn set_expiration(&self, key: &str, expiry: Duration) -> Result<()> {
        let mut counters = self.counters.write();
        if let Some(entry) = counters.get_mut(key) {
            entry.expires_at = Instant::now() + expiry;
        }
        Ok(())
    }

    async fn is_blocked(&self, key: &str) -> Result<bool> {
        let now = Instant::now();

        {
            let blocks = self.blocks.read();
            match blocks.get(key) {
                Some(until) if now < *until => return Ok(true),
                Some(_) => {}
                None => return Ok(false),
            }
        }

        // The flag has expired; drop it so the map does not grow unbounded.
        let mut blocks = self.blocks.write();
        if blocks.get(key).map_or(false, |until| now >= *until) {
            blocks.remove(key);
        }
        Ok(false)
    }

    async fn block(&self, key: &str, duration: Duration) -> Result<()> {
        self.blocks
            .write()
            .insert(key.to_string(), Instant::now() + duration);
        self.counters.write().remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_increment_creates_at_one() {
        let store = MemoryStore::new();

        let count = store.increment("k", Duration::from_secs(60)).await.unwrap();
        assert_eq!(count, 1);
        assert_eq!(store.get("k").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_increment_counts_up() {
        let store = MemoryStore::new();

        for expected in 1..=5 {
            let count = store.increment("k", Duration::from_secs(60)).await.unwrap();
            assert_eq!(count, expected);
        }
    }

    #[tokio::test]
    async fn test_get_absent_key_is_zero() {
        let store = MemoryStore::new();
        assert_eq!(store.get("missing").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_expiry_set_only_on_first_increment() {
        let store = MemoryStore::new();
        let window = Duration::from_millis(100);

        store.increment("k", window).await.unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;

        // A second increment must not push the expiry out.
        store.increment("k", window).await.unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;

        // The window anchored at the first increment has now elapsed.
        assert_eq!(store.get("k").await.unwrap(), 0);
        let count = store.increment("k", window).await.unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_set_expiration_refreshes_window() {
        let store = MemoryStore::new();

        store.increment("k", Duration::from_millis(20)).await.unwrap();
        store
            .set_expiration("k", Duration::from_secs(60))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(store.get("k").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_block_deletes_counter() {
        let store = MemoryStore::new();

        store.increment("k", Duration::from_secs(60)).await.unwrap();
        store.increment("k", Duration::from_secs(60)).await.unwrap();
        store.block("k", Duration::from_secs(60)).await.unwrap();

        assert!(store.is_blocked("k").await.unwrap());
        assert_eq!(store.get("k").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_block_flag_expires() {
        let store = MemoryStore::new();

        store.block("k", Duration::from_millis(30)).await.unwrap();
        assert!(store.is_blocked("k").await.unwrap());

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!store.is_blocked("k").await.unwrap());
    }

    #[tokio::test]
    async fn test_block_and_counter_namespaces_are_disjoint() {
        let store = MemoryStore::new();

        store.increment("k", Duration::from_secs(60)).await.unwrap();
        assert!(!store.is_blocked("k").await.unwrap());

        store.block("other", Duration::from_secs(60)).await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), 1);
    }
}
