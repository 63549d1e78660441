use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::signal;
use tracing::{info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use floodgate::config::FloodgateConfig;
use floodgate::http::HttpServer;
use floodgate::ratelimit::RateLimiter;
use floodgate::store::RedisStore;

#[derive(Debug, Parser)]
#[command(name = "floodgate", version, about = "Shared-state request rate limiting service")]
struct Cli {
    /// Path to a YAML configuration file
    #[arg(long, short)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env file is fine; the environment may be set directly.
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(Level::INFO.into())
                .from_env_lossy(),
        )
        .init();

    let cli = Cli::parse();

    info!("Starting Floodgate Rate Limiting Service");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let config = FloodgateConfig::load(cli.config.as_deref())?;
    info!(
        bind_addr = %config.server.bind_addr,
        redis_addr = %config.redis.addr,
        ip_rate_limit = config.rate_limit.ip_rate_limit,
        token_rate_limit = config.rate_limit.token_rate_limit,
        token_overrides = config.rate_limit.token_limits.len(),
        "Configuration loaded"
    );

    // An unreachable store is fatal here rather than a 500 on every request.
    let store = RedisStore::connect(&config.redis.url())
        .await
        .with_context(|| format!("Error connecting to Redis at {}", config.redis.addr))?;
    info!(addr = %config.redis.addr, "Connected to Redis");

    let limiter = Arc::new(RateLimiter::new(Arc::new(store), config.rate_limit.clone())?);
    info!("Rate limiter initialized");

    let server = HttpServer::new(config.server.bind_addr, limiter);
    server.serve_with_shutdown(shutdown_signal()).await?;

    info!("Floodgate Rate Limiting Service stopped");
    Ok(())
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
