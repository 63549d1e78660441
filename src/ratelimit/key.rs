//! Rate-limit key resolution.

use std::fmt;
use std::net::IpAddr;

/// Namespace under which an identity is tracked.
///
/// A token and an IP with the same string identity are tracked
/// independently; the namespace is part of every storage key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyType {
    /// Client network address
    Ip,
    /// API token credential
    Token,
}

impl KeyType {
    /// Storage namespace prefix for this key type.
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyType::Ip => "ip",
            KeyType::Token => "token",
        }
    }
}

/// A key that uniquely identifies a rate-limited identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RateLimitKey {
    /// The string identity (token value or IP address)
    pub identity: String,
    /// The namespace the identity belongs to
    pub key_type: KeyType,
}

impl RateLimitKey {
    /// Create a token key.
    pub fn token(value: impl Into<String>) -> Self {
        Self {
            identity: value.into(),
            key_type: KeyType::Token,
        }
    }

    /// Create an IP key.
    pub fn ip(addr: IpAddr) -> Self {
        Self {
            identity: addr.to_string(),
            key_type: KeyType::Ip,
        }
    }

    /// Resolve the key for a request.
    ///
    /// A non-empty token credential wins; otherwise the client address is
    /// used. A well-formed request always has an address, so resolution
    /// cannot fail.
    pub fn resolve(token: Option<&str>, client_ip: IpAddr) -> Self {
        match token {
            Some(value) if !value.is_empty() => Self::token(value),
            _ => Self::ip(client_ip),
        }
    }

    /// The namespaced key under which this identity is stored.
    pub fn storage_key(&self) -> String {
        format!("{}:{}", self.key_type.as_str(), self.identity)
    }
}

impl fmt::Display for RateLimitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.key_type.as_str(), self.identity)
    }
}
