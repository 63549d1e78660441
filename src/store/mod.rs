//! Counter store contract and implementations.

mod memory;
mod redis;

pub use memory::MemoryStore;
pub use self::redis::RedisStore;

use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;

/// Trait for counter store implementations.
///
/// The store holds two disjoint namespaces per rate-limit key: a numeric
/// counter with a TTL, and a block flag with its own TTL. The atomicity of
/// [`increment`](CounterStore::increment) is the sole concurrency-safety
/// mechanism in the system; the decision engine performs no locking of its
/// own, so the same store can coordinate many processes at once.
///
/// Any connectivity failure surfaces as an error from every operation.
/// There is no retry layer here; a single failed call aborts the decision
/// in progress.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Atomically increment the counter for `key`, creating it at 1 if
    /// absent, and return the post-increment count.
    ///
    /// The key's expiry is set to `expiry` only on the transition from
    /// absent to 1. Later increments within the window leave the expiry
    /// untouched, which is what makes the window fixed rather than sliding.
    async fn increment(&self, key: &str, expiry: Duration) -> Result<u64>;

    /// Current count for `key`, or 0 if the key is absent.
    async fn get(&self, key: &str) -> Result<u64>;

    /// Explicitly refresh the TTL of `key`'s counter.
    ///
    /// Not part of the increment protocol; callers outside the hot path use
    /// this to extend a window.
    async fn set_expiration(&self, key: &str, expiry: Duration) -> Result<()>;

    /// Whether an unexpired block flag exists for `key`. Absence means not
    /// blocked, never an error.
    async fn is_blocked(&self, key: &str) -> Result<bool>;

    /// Set the block flag for `key` with TTL = `duration` and delete the
    /// key's counter, so the first request after the cooldown starts a
    /// fresh window at count 1.
    async fn block(&self, key: &str, duration: Duration) -> Result<()>;
}
