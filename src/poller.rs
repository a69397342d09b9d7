//! The fetch → detect → dedup → format → publish cycle.
//!
//! Feeds are fetched concurrently with failures isolated per feed;
//! everything after aggregation runs sequentially, which naturally rate
//! limits outbound sends together with the fixed publish gap. All durable
//! state is touched only from this task.

use chrono::Utc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;

use crate::config::{Config, FeedSource};
use crate::dedup::{normalize_title, DuplicateGuard};
use crate::detect::EventDetector;
use crate::feed::{FeedEntry, FeedFetcher};
use crate::message::MessageBuilder;
use crate::publish::Publisher;
use crate::render::OutputMode;

/// Only this many newest entries per feed are inspected each cycle.
pub const RECENT_ENTRIES_PER_FEED: usize = 10;

/// Counters shared with the health handler.
#[derive(Debug, Default)]
pub struct PollerStats {
    pub processed: AtomicUsize,
    pub published: AtomicUsize,
}

#[derive(Debug, Clone)]
pub struct PollerConfig {
    pub feeds: Vec<FeedSource>,
    pub target_channel: String,
    pub output_mode: OutputMode,
    pub poll_interval: Duration,
    pub publish_gap: Duration,
    pub warmup: Duration,
}

impl From<&Config> for PollerConfig {
    fn from(cfg: &Config) -> Self {
        Self {
            feeds: cfg.feeds.clone(),
            target_channel: cfg.target_channel.clone(),
            output_mode: cfg.output_mode,
            poll_interval: Duration::from_secs(cfg.poll_interval_secs),
            publish_gap: Duration::from_secs(cfg.publish_gap_secs),
            warmup: Duration::from_secs(cfg.warmup_secs),
        }
    }
}

pub struct Poller {
    fetcher: Arc<dyn FeedFetcher>,
    publisher: Arc<dyn Publisher>,
    guard: DuplicateGuard,
    detector: EventDetector,
    builder: MessageBuilder,
    cfg: PollerConfig,
    stats: Arc<PollerStats>,
}

impl Poller {
    pub fn new(
        fetcher: Arc<dyn FeedFetcher>,
        publisher: Arc<dyn Publisher>,
        guard: DuplicateGuard,
        cfg: PollerConfig,
    ) -> Self {
        let stats = Arc::new(PollerStats::default());
        stats
            .processed
            .store(guard.processed_count(), Ordering::Relaxed);
        Self {
            fetcher,
            publisher,
            guard,
            detector: EventDetector::new(),
            builder: MessageBuilder::new(cfg.output_mode),
            cfg,
            stats,
        }
    }

    pub fn stats(&self) -> Arc<PollerStats> {
        Arc::clone(&self.stats)
    }

    /// Run until the process is terminated.
    pub async fn run(mut self) {
        tokio::time::sleep(self.cfg.warmup).await;
        tracing::info!(feeds = self.cfg.feeds.len(), "feed monitoring started");
        loop {
            let published = self.run_cycle().await;
            tracing::info!(
                published,
                next_check_secs = self.cfg.poll_interval.as_secs(),
                "cycle finished"
            );
            tokio::time::sleep(self.cfg.poll_interval).await;
        }
    }

    /// One full cycle; returns the number of messages published.
    pub async fn run_cycle(&mut self) -> usize {
        let candidates = self.collect_candidates().await;
        if candidates.is_empty() {
            tracing::info!("no new events found in this cycle");
            return 0;
        }
        tracing::info!(count = candidates.len(), "found candidate events");

        let mut published = 0usize;
        for entry in candidates {
            let signature = normalize_title(&entry.title);
            match self.guard.is_duplicate_title(&signature, Utc::now()) {
                Ok(true) => {
                    tracing::info!(title = %entry.title, "suppressed near-duplicate title");
                    continue;
                }
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(error = ?e, "duplicate check failed; publishing anyway");
                }
            }

            let message = self.builder.build(&entry);
            if message.is_empty() {
                tracing::info!(source = %entry.source_name, "skipping content-less entry");
                continue;
            }

            match self
                .publisher
                .send(&self.cfg.target_channel, &message, self.builder.mode())
                .await
            {
                Ok(()) => {
                    published += 1;
                    self.stats.published.fetch_add(1, Ordering::Relaxed);
                    tracing::info!(title = %entry.title, source = %entry.source_name, "published event");
                    if let Err(e) = self.guard.record_published(&signature, Utc::now()) {
                        tracing::warn!(error = ?e, "failed to record title signature");
                    }
                    tokio::time::sleep(self.cfg.publish_gap).await;
                }
                Err(e) => {
                    tracing::warn!(error = ?e, title = %entry.title, "publish failed");
                }
            }
        }
        published
    }

    /// Fetch all feeds concurrently and keep the unseen entries that look
    /// like events. Every inspected id is marked seen immediately, match
    /// or not.
    async fn collect_candidates(&mut self) -> Vec<FeedEntry> {
        let mut tasks = JoinSet::new();
        for source in self.cfg.feeds.clone() {
            let fetcher = Arc::clone(&self.fetcher);
            tasks.spawn(async move {
                let result = fetcher.fetch(&source).await;
                (source, result)
            });
        }

        let mut candidates = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            let (source, result) = match joined {
                Ok(pair) => pair,
                Err(e) => {
                    tracing::error!(error = ?e, "feed task failed to join");
                    continue;
                }
            };
            let entries = match result {
                Ok(entries) => entries,
                Err(e) => {
                    tracing::warn!(error = ?e, feed = %source.name, "feed fetch failed; skipping until next cycle");
                    continue;
                }
            };
            tracing::info!(feed = %source.name, entries = entries.len(), "fetched feed");

            for entry in entries.into_iter().take(RECENT_ENTRIES_PER_FEED) {
                if self.guard.seen_entry(&entry.entry_id) {
                    continue;
                }
                if let Err(e) = self.guard.mark_entry_seen(&entry.entry_id, Utc::now()) {
                    tracing::warn!(error = ?e, entry = %entry.entry_id, "failed to persist seen id");
                }
                self.stats.processed.fetch_add(1, Ordering::Relaxed);
                if self.detector.detect(&entry.title, &entry.html_body) {
                    candidates.push(entry);
                }
            }
        }
        candidates
    }
}
