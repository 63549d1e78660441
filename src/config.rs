//! Configuration management for Floodgate.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{FloodgateError, Result};
use crate::ratelimit::{RateLimitOptions, TokenLimitConfig};

/// Main configuration for the Floodgate service.
///
/// Loaded once at startup — optionally from a YAML file, then overridden
/// from the environment — and immutable thereafter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FloodgateConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Counter store configuration
    #[serde(default)]
    pub redis: RedisConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limit: RateLimitOptions,
}

impl Default for FloodgateConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            redis: RedisConfig::default(),
            rate_limit: RateLimitOptions::default(),
        }
    }
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP server address
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
        }
    }
}

fn default_bind_addr() -> SocketAddr {
    "0.0.0.0:8080".parse().unwrap()
}

/// Redis connection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Redis host:port
    #[serde(default = "default_redis_addr")]
    pub addr: String,

    /// Redis password, if the server requires one
    #[serde(default)]
    pub password: Option<String>,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            addr: default_redis_addr(),
            password: None,
        }
    }
}

fn default_redis_addr() -> String {
    "127.0.0.1:6379".to_string()
}

impl RedisConfig {
    /// Connection URL for the redis client.
    pub fn url(&self) -> String {
        match self.password.as_deref() {
            Some(password) if !password.is_empty() => {
                format!("redis://:{}@{}", password, self.addr)
            }
            _ => format!("redis://{}", self.addr),
        }
    }
}

impl FloodgateConfig {
    /// Load configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        serde_yaml::from_str(&contents).map_err(|e| FloodgateError::Config(e.to_string()))
    }

    /// Load configuration: the YAML file when given, defaults otherwise,
    /// with environment variables applied on top.
    pub fn load<P: AsRef<Path>>(path: Option<P>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Override configuration from the environment.
    ///
    /// Recognized variables: `PORT`, `REDIS_ADDR`, `REDIS_PASSWORD`,
    /// `IP_RATE_LIMIT`, `IP_BLOCK_DURATION`, `TOKEN_RATE_LIMIT`,
    /// `TOKEN_BLOCK_DURATION`, and `TOKEN_LIMITS` (a JSON map of token to
    /// `{"limit": n, "block_duration": seconds}`). Durations are integer
    /// seconds. An unparseable value is a configuration error.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Some(port) = env_parsed::<u16>("PORT")? {
            self.server.bind_addr.set_port(port);
        }
        if let Ok(addr) = std::env::var("REDIS_ADDR") {
            if !addr.is_empty() {
                self.redis.addr = addr;
            }
        }
        if let Ok(password) = std::env::var("REDIS_PASSWORD") {
            if !password.is_empty() {
                self.redis.password = Some(password);
            }
        }

        if let Some(limit) = env_parsed("IP_RATE_LIMIT")? {
            self.rate_limit.ip_rate_limit = limit;
        }
        if let Some(secs) = env_parsed("IP_BLOCK_DURATION")? {
            self.rate_limit.ip_block_duration_secs = secs;
        }
        if let Some(limit) = env_parsed("TOKEN_RATE_LIMIT")? {
            self.rate_limit.token_rate_limit = limit;
        }
        if let Some(secs) = env_parsed("TOKEN_BLOCK_DURATION")? {
            self.rate_limit.token_block_duration_secs = secs;
        }

        if let Ok(json) = std::env::var("TOKEN_LIMITS") {
            if !json.is_empty() {
                let limits: HashMap<String, TokenLimitConfig> = serde_json::from_str(&json)
                    .map_err(|e| {
                        FloodgateError::Config(format!("Error parsing TOKEN_LIMITS: {}", e))
                    })?;
                self.rate_limit.token_limits.extend(limits);
            }
        }

        Ok(())
    }
}

/// Read and parse an environment variable, treating unset or empty as
/// absent and a parse failure as a configuration error.
fn env_parsed<T: std::str::FromStr>(name: &str) -> Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(value) if !value.is_empty() => value.parse().map(Some).map_err(|e| {
            FloodgateError::Config(format!("Error parsing {}: {}", name, e))
        }),
        _ => Ok(None),
    }
}
