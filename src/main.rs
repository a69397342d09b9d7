//! event-scout — Binary entrypoint.
//! Wires configuration, durable dedup state, the Telegram publisher, the
//! health-check server, and the polling loop.

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use event_scout::api::{self, AppState};
use event_scout::feed::HttpFeedFetcher;
use event_scout::{Config, DuplicateGuard, Poller, PollerConfig, StateStore, TelegramPublisher};

const FEED_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("event_scout=info,warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env in local/dev; no-op elsewhere.
    let _ = dotenvy::dotenv();
    init_tracing();

    let config = Config::from_env()?;

    let store = StateStore::open(Path::new(&config.state_db_path))?;
    let guard = DuplicateGuard::load(
        store,
        config.dedup_window_secs,
        config.similarity_threshold,
    )?;

    let publisher = TelegramPublisher::new(&config.bot_token);
    let username = publisher
        .identity()
        .await
        .context("verifying bot credentials")?;
    tracing::info!(bot = %username, "bot connected");

    let fetcher = Arc::new(HttpFeedFetcher::new(FEED_HTTP_TIMEOUT)?);
    let poller = Poller::new(
        fetcher,
        Arc::new(publisher),
        guard,
        PollerConfig::from(&config),
    );

    let router = api::create_router(AppState {
        stats: poller.stats(),
    });
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port))
        .await
        .with_context(|| format!("binding health server to port {}", config.port))?;
    tracing::info!(port = config.port, "health server listening");
    let health_task = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router).await {
            tracing::error!(error = ?e, "health server exited");
        }
    });

    tokio::select! {
        _ = poller.run() => {}
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
        }
    }

    health_task.abort();
    tracing::info!("bot shut down");
    Ok(())
}
