//! Rate limiting middleware: the boundary between HTTP and the decision
//! engine.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, Request, State};
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tracing::{error, info};

use crate::ratelimit::{Decision, RateLimitKey, RateLimiter};

/// Header carrying the API token credential.
pub const TOKEN_HEADER: &str = "API_KEY";

/// Body of every rate-limit rejection.
pub const LIMIT_EXCEEDED_MESSAGE: &str =
    "you have reached the maximum number of requests or actions allowed within a certain time frame";

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Check the rate limit before letting a request through.
///
/// Maps the engine's three-way outcome onto HTTP: allowed requests
/// continue down the stack, denials answer 429 with the fixed message, and
/// a store failure answers 500 with the error text — a failure to decide
/// is never presented as a rate-limit rejection.
pub async fn rate_limit(
    State(limiter): State<Arc<RateLimiter>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    request: Request,
    next: Next,
) -> Response {
    let key = resolve_key(request.headers(), peer);

    match limiter.check(&key).await {
        Ok(Decision::Allowed) => next.run(request).await,
        Ok(Decision::Denied(reason)) => {
            info!(key = %key, %reason, "Request rate limited");
            (
                StatusCode::TOO_MANY_REQUESTS,
                Json(ErrorResponse {
                    error: LIMIT_EXCEEDED_MESSAGE.to_string(),
                }),
            )
                .into_response()
        }
        Err(e) => {
            error!(key = %key, error = %e, "Rate limit check failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: e.to_string(),
                }),
            )
                .into_response()
        }
    }
}

/// Resolve the rate-limit key for a request.
///
/// The token comes from the `API_KEY` header. The client address prefers
/// the first `X-Forwarded-For` entry, falling back to the peer socket
/// address when the service is not behind a proxy.
fn resolve_key(headers: &HeaderMap, peer: SocketAddr) -> RateLimitKey {
    let token = headers.get(TOKEN_HEADER).and_then(|v| v.to_str().ok());

    let client_ip = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or_else(|| peer.ip());

    RateLimitKey::resolve(token, client_ip)
}
