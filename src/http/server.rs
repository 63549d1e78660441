//! HTTP server implementation.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::get;
use axum::{middleware, Json, Router};
use serde::Serialize;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

use super::middleware::rate_limit;
use crate::error::Result;
use crate::ratelimit::RateLimiter;

/// HTTP server fronting the rate limiter.
///
/// Every route passes through the rate limit middleware before its
/// handler runs, so the service itself is protected the same way the
/// traffic it guards is.
pub struct HttpServer {
    /// Address to bind to
    addr: SocketAddr,
    /// The rate limiter instance
    limiter: Arc<RateLimiter>,
}

/// Ping response.
#[derive(Debug, Serialize)]
struct PingResponse {
    message: &'static str,
}

/// Health check response.
#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    service: &'static str,
    version: &'static str,
}

async fn ping() -> Json<PingResponse> {
    Json(PingResponse { message: "pong" })
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: "floodgate",
        version: env!("CARGO_PKG_VERSION"),
    })
}

impl HttpServer {
    /// Create a new HTTP server.
    pub fn new(addr: SocketAddr, limiter: Arc<RateLimiter>) -> Self {
        Self { addr, limiter }
    }

    /// Build the router with all routes and middleware.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/", get(ping))
            .route("/healthz", get(health))
            .layer(middleware::from_fn_with_state(
                self.limiter.clone(),
                rate_limit,
            ))
            .layer(TraceLayer::new_for_http())
    }

    /// Start the HTTP server with graceful shutdown.
    ///
    /// The server drains in-flight requests and stops once the provided
    /// signal resolves.
    pub async fn serve_with_shutdown<F>(self, signal: F) -> Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(self.addr).await?;

        info!(addr = %self.addr, "Starting HTTP server");

        axum::serve(
            listener,
            self.router()
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(signal)
        .await?;

        Ok(())
    }
}
