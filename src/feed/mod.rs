//! Feed fetching: one RSS document per configured Telegram channel,
//! proxied through a public RSS bridge.

pub mod rss;

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::time::Duration;

use crate::config::FeedSource;

/// One RSS entry, as fetched. Ephemeral; discarded after the cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedEntry {
    /// `"{channel}_{guid-or-link}"` — the at-most-once processing key.
    pub entry_id: String,
    pub title: String,
    pub html_body: String,
    pub link: String,
    /// Raw `pubDate` string; parsed only at formatting time.
    pub published: String,
    pub source_name: String,
    pub source_channel: String,
}

#[async_trait]
pub trait FeedFetcher: Send + Sync {
    /// Fetch and parse one feed. Errors are isolated per feed by the
    /// caller; a failed feed is simply skipped until the next cycle.
    async fn fetch(&self, source: &FeedSource) -> Result<Vec<FeedEntry>>;
}

pub struct HttpFeedFetcher {
    client: reqwest::Client,
}

impl HttpFeedFetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("building feed http client")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl FeedFetcher for HttpFeedFetcher {
    async fn fetch(&self, source: &FeedSource) -> Result<Vec<FeedEntry>> {
        let resp = self
            .client
            .get(&source.url)
            .send()
            .await
            .with_context(|| format!("fetching feed {}", source.name))?;
        let resp = resp
            .error_for_status()
            .with_context(|| format!("feed {} returned an error status", source.name))?;
        let body = resp
            .text()
            .await
            .with_context(|| format!("reading feed body for {}", source.name))?;
        rss::parse_feed(&body, source)
    }
}
