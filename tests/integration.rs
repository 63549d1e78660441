//! End-to-end tests over the in-memory store: engine scenarios and the
//! HTTP boundary.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{Request, StatusCode};
use tower::ServiceExt;

use floodgate::error::{FloodgateError, Result};
use floodgate::http::{HttpServer, LIMIT_EXCEEDED_MESSAGE, TOKEN_HEADER};
use floodgate::ratelimit::{
    Decision, DenyReason, RateLimitKey, RateLimitOptions, RateLimiter, TokenLimitConfig,
};
use floodgate::store::{CounterStore, MemoryStore};

fn limiter_with(options: RateLimitOptions) -> (Arc<RateLimiter>, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let limiter = Arc::new(RateLimiter::new(store.clone(), options).unwrap());
    (limiter, store)
}

fn options_with_token(token: &str, limit: u64, secs: u64) -> RateLimitOptions {
    let mut options = RateLimitOptions::default();
    options.token_limits.insert(
        token.to_string(),
        TokenLimitConfig {
            limit,
            block_duration_secs: secs,
        },
    );
    options
}

#[tokio::test]
async fn single_request_budget_runs_the_full_lifecycle() {
    // limit=1, window=1s, key="k".
    let (limiter, store) = limiter_with(options_with_token("k", 1, 1));
    let key = RateLimitKey::token("k");
    let storage_key = key.storage_key();

    // Request 1: allowed, count=1.
    assert_eq!(limiter.check(&key).await.unwrap(), Decision::Allowed);
    assert_eq!(store.get(&storage_key).await.unwrap(), 1);

    // Request 2: count reaches 2 > 1, denied, blocked, counter deleted.
    assert_eq!(
        limiter.check(&key).await.unwrap(),
        Decision::Denied(DenyReason::LimitExceeded)
    );
    assert!(store.is_blocked(&storage_key).await.unwrap());
    assert_eq!(store.get(&storage_key).await.unwrap(), 0);

    // Request 3: still within the cooldown, denied without incrementing.
    assert_eq!(
        limiter.check(&key).await.unwrap(),
        Decision::Denied(DenyReason::Cooldown)
    );
    assert_eq!(store.get(&storage_key).await.unwrap(), 0);

    // Request 4: cooldown elapsed, fresh window at count=1.
    tokio::time::sleep(Duration::from_millis(1100)).await;
    assert_eq!(limiter.check(&key).await.unwrap(), Decision::Allowed);
    assert_eq!(store.get(&storage_key).await.unwrap(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn overridden_token_admits_its_full_budget_concurrently() {
    let mut options = options_with_token("token10", 10_000, 1);
    options.token_rate_limit = 12;
    let (limiter, store) = limiter_with(options);
    let key = RateLimitKey::token("token10");

    let mut handles = Vec::with_capacity(10_000);
    for _ in 0..10_000 {
        let limiter = limiter.clone();
        let key = key.clone();
        handles.push(tokio::spawn(async move { limiter.check(&key).await }));
    }

    for handle in handles {
        let decision = handle.await.unwrap().unwrap();
        assert_eq!(decision, Decision::Allowed);
    }
    assert_eq!(store.get(&key.storage_key()).await.unwrap(), 10_000);

    // One more pushes it over and starts the cooldown.
    assert_eq!(
        limiter.check(&key).await.unwrap(),
        Decision::Denied(DenyReason::LimitExceeded)
    );

    tokio::time::sleep(Duration::from_millis(1100)).await;
    assert_eq!(limiter.check(&key).await.unwrap(), Decision::Allowed);
    assert_eq!(store.get(&key.storage_key()).await.unwrap(), 1);
}

#[tokio::test]
async fn window_boundary_admits_a_second_burst() {
    // Fixed window: a full budget just before expiry and another right
    // after is the documented trade-off.
    let (limiter, _store) = limiter_with(options_with_token("burst", 3, 1));
    let key = RateLimitKey::token("burst");

    for _ in 0..3 {
        assert!(limiter.check(&key).await.unwrap().is_allowed());
    }

    tokio::time::sleep(Duration::from_millis(1100)).await;

    for _ in 0..3 {
        assert!(limiter.check(&key).await.unwrap().is_allowed());
    }
}

mod boundary {
    use super::*;

    fn peer() -> SocketAddr {
        "10.1.2.3:40000".parse().unwrap()
    }

    fn app(limiter: Arc<RateLimiter>) -> axum::Router {
        let addr: SocketAddr = "127.0.0.1:8080".parse().unwrap();
        HttpServer::new(addr, limiter).router()
    }

    fn get_root(token: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri("/");
        if let Some(token) = token {
            builder = builder.header(TOKEN_HEADER, token);
        }
        builder
            .extension(ConnectInfo(peer()))
            .body(Body::empty())
            .unwrap()
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn allowed_request_reaches_the_handler() {
        let (limiter, _store) = limiter_with(RateLimitOptions::default());
        let app = app(limiter);

        let response = app.oneshot(get_root(None)).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["message"], "pong");
    }

    #[tokio::test]
    async fn denied_request_gets_429_with_the_fixed_message() {
        let options = RateLimitOptions {
            ip_rate_limit: 1,
            ..Default::default()
        };
        let (limiter, _store) = limiter_with(options);
        let app = app(limiter);

        let ok = app.clone().oneshot(get_root(None)).await.unwrap();
        assert_eq!(ok.status(), StatusCode::OK);

        let denied = app.oneshot(get_root(None)).await.unwrap();
        assert_eq!(denied.status(), StatusCode::TOO_MANY_REQUESTS);
        let body = body_json(denied).await;
        assert_eq!(body["error"], LIMIT_EXCEEDED_MESSAGE);
    }

    #[tokio::test]
    async fn token_budget_is_independent_of_the_ip_budget() {
        let options = RateLimitOptions {
            ip_rate_limit: 1,
            token_rate_limit: 1,
            ..Default::default()
        };
        let (limiter, _store) = limiter_with(options);
        let app = app(limiter);

        // Exhaust the IP budget.
        app.clone().oneshot(get_root(None)).await.unwrap();
        let denied = app.clone().oneshot(get_root(None)).await.unwrap();
        assert_eq!(denied.status(), StatusCode::TOO_MANY_REQUESTS);

        // The same client with a token is a different identity.
        let with_token = app.oneshot(get_root(Some("abc"))).await.unwrap();
        assert_eq!(with_token.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn store_failure_maps_to_500_not_429() {
        struct UnreachableStore;

        fn connection_refused() -> FloodgateError {
            let io =
                std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "connection refused");
            FloodgateError::Store(redis::RedisError::from(io))
        }

        #[async_trait]
        impl CounterStore for UnreachableStore {
            async fn increment(&self, _key: &str, _expiry: Duration) -> Result<u64> {
                Err(connection_refused())
            }
            async fn get(&self, _key: &str) -> Result<u64> {
                Err(connection_refused())
            }
            async fn set_expiration(&self, _key: &str, _expiry: Duration) -> Result<()> {
                Err(connection_refused())
            }
            async fn is_blocked(&self, _key: &str) -> Result<bool> {
                Err(connection_refused())
            }
            async fn block(&self, _key: &str, _duration: Duration) -> Result<()> {
                Err(connection_refused())
            }
        }

        let limiter = Arc::new(
            RateLimiter::new(Arc::new(UnreachableStore), RateLimitOptions::default()).unwrap(),
        );
        let app = app(limiter);

        let response = app.oneshot(get_root(None)).await.unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await;
        assert!(body["error"].as_str().unwrap().contains("connection refused"));
    }

    #[tokio::test]
    async fn health_endpoint_reports_healthy() {
        let (limiter, _store) = limiter_with(RateLimitOptions::default());
        let app = app(limiter);

        let request = Request::builder()
            .uri("/healthz")
            .extension(ConnectInfo(peer()))
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "healthy");
    }
}
