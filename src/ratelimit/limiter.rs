//! Core rate limiter implementation.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, trace};

use super::key::RateLimitKey;
use super::policy::{LimitPolicy, RateLimitOptions};
use crate::error::Result;
use crate::store::CounterStore;

/// Outcome of a rate limit check.
///
/// Store failures are not a decision; they surface as `Err` from
/// [`RateLimiter::check`] so the boundary can distinguish "denied" from
/// "could not decide".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Request is within its budget
    Allowed,
    /// Request is rejected
    Denied(DenyReason),
}

impl Decision {
    /// Whether the request may proceed.
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allowed)
    }
}

/// Why a request was denied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    /// The key is in cooldown from an earlier over-limit request
    Cooldown,
    /// This request pushed the key over its budget
    LimitExceeded,
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DenyReason::Cooldown => write!(f, "key is in cooldown"),
            DenyReason::LimitExceeded => write!(f, "limit exceeded"),
        }
    }
}

/// The decision engine: fixed-window counting with a cooldown state, both
/// delegated to a shared [`CounterStore`].
///
/// The engine holds no mutable state and takes no locks; concurrent
/// requests for the same key are serialized by the store's atomic
/// increment. That keeps the decision correct across every process sharing
/// the store, not just within this one.
pub struct RateLimiter {
    store: Arc<dyn CounterStore>,
    options: RateLimitOptions,
}

impl RateLimiter {
    /// Create a rate limiter over a counter store.
    ///
    /// Fails if any resolvable policy is misconfigured; a bad limit is a
    /// startup error, never a per-request condition.
    pub fn new(store: Arc<dyn CounterStore>, options: RateLimitOptions) -> Result<Self> {
        options.validate()?;
        Ok(Self { store, options })
    }

    /// Resolve the policy for `key` and run the rate limit check.
    pub async fn check(&self, key: &RateLimitKey) -> Result<Decision> {
        let policy = self.options.policy_for(key);
        self.allow(key, policy).await
    }

    /// Run one rate limit check for `key` under `policy`.
    ///
    /// While a key is in cooldown its requests are denied without touching
    /// the counter; cooldown requests neither extend nor shorten the block.
    /// Otherwise the counter is incremented first and the verdict derived
    /// from the post-increment count, so the request that exceeds the
    /// limit is both counted and rejected — it consumes the slot that
    /// triggers the cooldown. Blocking deletes the counter, and the next
    /// request after the cooldown starts a fresh window at count 1.
    pub async fn allow(&self, key: &RateLimitKey, policy: LimitPolicy) -> Result<Decision> {
        let storage_key = key.storage_key();

        trace!(key = %key, limit = policy.limit, window = ?policy.window, "Checking rate limit");

        if self.store.is_blocked(&storage_key).await? {
            debug!(key = %key, "Key is in cooldown");
            return Ok(Decision::Denied(DenyReason::Cooldown));
        }

        let count = self.store.increment(&storage_key, policy.window).await?;

        if count > policy.limit {
            debug!(key = %key, count, limit = policy.limit, "Rate limit exceeded, blocking key");
            self.store.block(&storage_key, policy.window).await?;
            return Ok(Decision::Denied(DenyReason::LimitExceeded));
        }

        Ok(Decision::Allowed)
    }
}
