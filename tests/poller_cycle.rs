// End-to-end poller cycles against a stub fetcher and a recording
// publisher; durable state goes through a real on-disk SQLite file where
// restart behavior matters.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use event_scout::feed::{rss, FeedEntry, FeedFetcher};
use event_scout::{
    DuplicateGuard, FeedSource, OutputMode, Poller, PollerConfig, Publisher, StateStore,
};

const FEED_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0"><channel><title>testchan</title>
  <item>
    <title>وبینار آموزشی بیوانفورماتیک</title>
    <link>https://t.me/testchan/11</link>
    <guid isPermaLink="false">tg-11</guid>
    <pubDate>Mon, 26 May 2025 19:13:00 GMT</pubDate>
    <description><![CDATA[<p>برای حضور <b>ثبت نام</b> کنید</p>]]></description>
  </item>
  <item>
    <title>گزارش هفتگی</title>
    <link>https://t.me/testchan/10</link>
    <guid isPermaLink="false">tg-10</guid>
    <description><![CDATA[<p>خلاصه اخبار این هفته</p>]]></description>
  </item>
</channel></rss>"#;

struct StubFetcher {
    xml: String,
}

#[async_trait]
impl FeedFetcher for StubFetcher {
    async fn fetch(&self, source: &FeedSource) -> Result<Vec<FeedEntry>> {
        rss::parse_feed(&self.xml, source)
    }
}

/// Errors for the named channel, serves the fixture for everything else.
struct PartiallyBrokenFetcher {
    broken_channel: String,
}

#[async_trait]
impl FeedFetcher for PartiallyBrokenFetcher {
    async fn fetch(&self, source: &FeedSource) -> Result<Vec<FeedEntry>> {
        if source.channel == self.broken_channel {
            return Err(anyhow!("connection refused"));
        }
        rss::parse_feed(FEED_XML, source)
    }
}

#[derive(Default)]
struct RecordingPublisher {
    sent: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl Publisher for RecordingPublisher {
    async fn send(&self, chat: &str, text: &str, _mode: OutputMode) -> Result<()> {
        self.sent
            .lock()
            .unwrap()
            .push((chat.to_string(), text.to_string()));
        Ok(())
    }
}

struct FailingPublisher;

#[async_trait]
impl Publisher for FailingPublisher {
    async fn send(&self, _chat: &str, _text: &str, _mode: OutputMode) -> Result<()> {
        Err(anyhow!("429 Too Many Requests"))
    }
}

fn test_source(channel: &str) -> FeedSource {
    FeedSource {
        name: format!("{channel} display"),
        url: format!("https://rsshub.app/telegram/channel/{channel}"),
        channel: channel.to_string(),
    }
}

fn test_config(feeds: Vec<FeedSource>) -> PollerConfig {
    PollerConfig {
        feeds,
        target_channel: "@events".to_string(),
        output_mode: OutputMode::MarkdownV2,
        poll_interval: Duration::from_secs(600),
        publish_gap: Duration::from_millis(0),
        warmup: Duration::from_millis(0),
    }
}

fn fresh_guard() -> DuplicateGuard {
    DuplicateGuard::with_defaults(StateStore::open_in_memory().unwrap()).unwrap()
}

#[tokio::test]
async fn event_entry_is_published_once_across_cycles() {
    let fetcher = Arc::new(StubFetcher {
        xml: FEED_XML.to_string(),
    });
    let publisher = Arc::new(RecordingPublisher::default());
    let mut poller = Poller::new(
        fetcher,
        publisher.clone(),
        fresh_guard(),
        test_config(vec![test_source("testchan")]),
    );
    let stats = poller.stats();

    let published = poller.run_cycle().await;
    assert_eq!(published, 1);

    // Both entries were inspected and marked seen, event or not.
    assert_eq!(stats.processed.load(std::sync::atomic::Ordering::Relaxed), 2);

    let sent = publisher.sent.lock().unwrap().clone();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, "@events");
    assert!(sent[0].1.contains("وبینار آموزشی بیوانفورماتیک"));
    assert!(sent[0].1.contains("[testchan display](https://t.me/testchan)"));

    // Same feed content again: nothing re-enters the pipeline.
    let published = poller.run_cycle().await;
    assert_eq!(published, 0);
    assert_eq!(stats.processed.load(std::sync::atomic::Ordering::Relaxed), 2);
    assert_eq!(publisher.sent.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn seen_entries_survive_a_restart() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("state.db");
    let fetcher = Arc::new(StubFetcher {
        xml: FEED_XML.to_string(),
    });

    {
        let guard = DuplicateGuard::with_defaults(StateStore::open(&db).unwrap()).unwrap();
        let publisher = Arc::new(RecordingPublisher::default());
        let mut poller = Poller::new(
            fetcher.clone(),
            publisher.clone(),
            guard,
            test_config(vec![test_source("testchan")]),
        );
        assert_eq!(poller.run_cycle().await, 1);
    }

    // New process, same db, same feed content: entry id tg-11 is still
    // recognized as seen even though it is back in the feed's latest-N.
    let guard = DuplicateGuard::with_defaults(StateStore::open(&db).unwrap()).unwrap();
    let publisher = Arc::new(RecordingPublisher::default());
    let mut poller = Poller::new(
        fetcher,
        publisher.clone(),
        guard,
        test_config(vec![test_source("testchan")]),
    );
    assert_eq!(poller.run_cycle().await, 0);
    assert!(publisher.sent.lock().unwrap().is_empty());
}

#[tokio::test]
async fn a_failing_feed_does_not_block_the_others() {
    let fetcher = Arc::new(PartiallyBrokenFetcher {
        broken_channel: "deadchan".to_string(),
    });
    let publisher = Arc::new(RecordingPublisher::default());
    let mut poller = Poller::new(
        fetcher,
        publisher.clone(),
        fresh_guard(),
        test_config(vec![test_source("deadchan"), test_source("livechan")]),
    );

    assert_eq!(poller.run_cycle().await, 1);
    let sent = publisher.sent.lock().unwrap().clone();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].1.contains("[livechan display](https://t.me/livechan)"));
}

#[tokio::test]
async fn near_duplicate_title_from_another_channel_is_suppressed() {
    // Same announcement reposted by a second channel: each channel yields
    // its own entry id, so both pass the exact-id gate; only one may
    // survive the fuzzy title window.
    let publisher = Arc::new(RecordingPublisher::default());
    let fetcher = Arc::new(StubFetcher {
        xml: FEED_XML.to_string(),
    });
    let mut poller = Poller::new(
        fetcher,
        publisher.clone(),
        fresh_guard(),
        test_config(vec![test_source("chan_a"), test_source("chan_b")]),
    );

    assert_eq!(poller.run_cycle().await, 1);
    assert_eq!(publisher.sent.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn failed_publish_does_not_poison_the_title_window() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("state.db");

    {
        let guard = DuplicateGuard::with_defaults(StateStore::open(&db).unwrap()).unwrap();
        let mut poller = Poller::new(
            Arc::new(StubFetcher {
                xml: FEED_XML.to_string(),
            }),
            Arc::new(FailingPublisher),
            guard,
            test_config(vec![test_source("chan_a")]),
        );
        assert_eq!(poller.run_cycle().await, 0);
    }

    // The same event reposted under a fresh entry id (other channel) must
    // still go out: the failed attempt recorded no title signature.
    let guard = DuplicateGuard::with_defaults(StateStore::open(&db).unwrap()).unwrap();
    let publisher = Arc::new(RecordingPublisher::default());
    let mut poller = Poller::new(
        Arc::new(StubFetcher {
            xml: FEED_XML.to_string(),
        }),
        publisher.clone(),
        guard,
        test_config(vec![test_source("chan_b")]),
    );
    assert_eq!(poller.run_cycle().await, 1);
    assert_eq!(publisher.sent.lock().unwrap().len(), 1);
}
