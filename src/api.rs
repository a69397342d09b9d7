//! Health-check HTTP surface: two equivalent GET routes returning a plain
//! 200 status line. State is injected via the router, not read from a
//! process global.

use axum::{extract::State, routing::get, Router};
use std::sync::atomic::Ordering;
use std::sync::Arc;

use crate::poller::PollerStats;

#[derive(Clone)]
pub struct AppState {
    pub stats: Arc<PollerStats>,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(health))
        .route("/health", get(health))
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> String {
    format!(
        "Bot is running! Processed items: {}, published: {}",
        state.stats.processed.load(Ordering::Relaxed),
        state.stats.published.load(Ordering::Relaxed),
    )
}
