//! Rate limiting logic: key resolution, policies, and the decision engine.

mod key;
mod limiter;
mod policy;

pub use key::{KeyType, RateLimitKey};
pub use limiter::{Decision, DenyReason, RateLimiter};
pub use policy::{LimitPolicy, RateLimitOptions, TokenLimitConfig};
