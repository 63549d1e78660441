//! Limit policies and their resolution.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::key::{KeyType, RateLimitKey};
use crate::error::{FloodgateError, Result};

/// A resolved rate limit: how many requests fit in one window.
///
/// The window doubles as the cooldown length once the limit is exceeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimitPolicy {
    /// Maximum requests allowed in the window
    pub limit: u64,
    /// Window length, and cooldown length after an over-limit request
    pub window: Duration,
}

/// Per-token override for the default token policy.
///
/// Durations are integer seconds on the wire, matching the `TOKEN_LIMITS`
/// environment format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenLimitConfig {
    /// Maximum requests allowed in the window
    pub limit: u64,
    /// Window/cooldown length in seconds
    #[serde(rename = "block_duration")]
    pub block_duration_secs: u64,
}

impl TokenLimitConfig {
    /// Window duration for this override.
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.block_duration_secs)
    }
}

/// Rate limiting options: default policies per namespace plus per-token
/// overrides.
///
/// Loaded once at startup and immutable thereafter; resolution is a pure
/// function over this state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitOptions {
    /// Requests per window for IP keys
    #[serde(default = "default_rate_limit")]
    pub ip_rate_limit: u64,

    /// IP window/cooldown length in seconds
    #[serde(default = "default_block_duration_secs", rename = "ip_block_duration")]
    pub ip_block_duration_secs: u64,

    /// Default requests per window for token keys
    #[serde(default = "default_rate_limit")]
    pub token_rate_limit: u64,

    /// Default token window/cooldown length in seconds
    #[serde(
        default = "default_block_duration_secs",
        rename = "token_block_duration"
    )]
    pub token_block_duration_secs: u64,

    /// Per-token overrides, keyed by exact token value
    #[serde(default)]
    pub token_limits: HashMap<String, TokenLimitConfig>,
}

impl Default for RateLimitOptions {
    fn default() -> Self {
        Self {
            ip_rate_limit: default_rate_limit(),
            ip_block_duration_secs: default_block_duration_secs(),
            token_rate_limit: default_rate_limit(),
            token_block_duration_secs: default_block_duration_secs(),
            token_limits: HashMap::new(),
        }
    }
}

fn default_rate_limit() -> u64 {
    10
}

fn default_block_duration_secs() -> u64 {
    60
}

impl RateLimitOptions {
    /// Resolve the policy for a key.
    ///
    /// Token keys consult the override map first and fall back to the
    /// default token policy. IP keys always use the default IP policy;
    /// overrides never apply to them.
    pub fn policy_for(&self, key: &RateLimitKey) -> LimitPolicy {
        match key.key_type {
            KeyType::Token => match self.token_limits.get(&key.identity) {
                Some(config) => LimitPolicy {
                    limit: config.limit,
                    window: config.window(),
                },
                None => LimitPolicy {
                    limit: self.token_rate_limit,
                    window: Duration::from_secs(self.token_block_duration_secs),
                },
            },
            KeyType::Ip => LimitPolicy {
                limit: self.ip_rate_limit,
                window: Duration::from_secs(self.ip_block_duration_secs),
            },
        }
    }

    /// Validate every policy this configuration can resolve to.
    ///
    /// A limit below 1 or a zero window can never admit a request, so they
    /// are rejected at startup rather than surfacing per request.
    pub fn validate(&self) -> Result<()> {
        validate_policy("ip", self.ip_rate_limit, self.ip_block_duration_secs)?;
        validate_policy(
            "token",
            self.token_rate_limit,
            self.token_block_duration_secs,
        )?;
        for (token, config) in &self.token_limits {
            validate_policy(token, config.limit, config.block_duration_secs)?;
        }
        Ok(())
    }
}

fn validate_policy(name: &str, limit: u64, duration_secs: u64) -> Result<()> {
    if limit < 1 {
        return Err(FloodgateError::Config(format!(
            "rate limit for '{}' must be at least 1",
            name
        )));
    }
    if duration_secs == 0 {
        return Err(FloodgateError::Config(format!(
            "block duration for '{}' must be greater than zero",
            name
        )));
    }
    Ok(())
}
