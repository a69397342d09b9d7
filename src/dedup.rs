//! Duplicate suppression.
//!
//! Two layers, both durable:
//! - exact membership over every entry id ever inspected, guaranteeing
//!   at-most-once processing per entry across restarts;
//! - a bounded, time-windowed queue of normalized title signatures compared
//!   by fuzzy similarity, catching the same event re-posted with minor
//!   textual variation across channels.
//!
//! The SQLite store stays authoritative; in-memory structures are a full
//! reload of it at startup. The in-memory id trim is a memory bound only
//! and never touches the store.

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use once_cell::sync::OnceCell;
use regex::Regex;
use std::collections::{HashSet, VecDeque};

use crate::store::StateStore;

pub const DEFAULT_WINDOW_SECS: i64 = 48 * 3600;
pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.75;

/// Capacity of the title window; oldest signature evicted when full.
const TITLE_CAPACITY: usize = 100;
/// In-memory id set is rebuilt once it grows past this...
const ID_HIGH_WATER: usize = 1500;
/// ...keeping only this many of the most recently added ids.
const ID_KEEP: usize = 1000;

#[derive(Debug)]
struct TitleRecord {
    row_id: i64,
    title: String,
    recorded_at: DateTime<Utc>,
}

pub struct DuplicateGuard {
    store: StateStore,
    window: Duration,
    threshold: f64,
    titles: VecDeque<TitleRecord>,
    seen_ids: HashSet<String>,
    seen_order: VecDeque<String>,
}

impl DuplicateGuard {
    /// Load the guard from durable state, reloading the full id set and
    /// the title window into memory.
    pub fn load(store: StateStore, window_secs: i64, threshold: f64) -> Result<Self> {
        let ids = store.load_processed_ids()?;
        let titles = store
            .load_titles()?
            .into_iter()
            .map(|row| TitleRecord {
                row_id: row.id,
                title: row.title,
                recorded_at: DateTime::from_timestamp(row.published_at, 0).unwrap_or_default(),
            })
            .collect();

        let seen_order: VecDeque<String> = ids.into_iter().collect();
        let seen_ids = seen_order.iter().cloned().collect();

        Ok(Self {
            store,
            window: Duration::seconds(window_secs.max(1)),
            threshold: threshold.clamp(0.0, 1.0),
            titles,
            seen_ids,
            seen_order,
        })
    }

    pub fn with_defaults(store: StateStore) -> Result<Self> {
        Self::load(store, DEFAULT_WINDOW_SECS, DEFAULT_SIMILARITY_THRESHOLD)
    }

    pub fn seen_entry(&self, entry_id: &str) -> bool {
        self.seen_ids.contains(entry_id)
    }

    /// Record an inspected entry id, durably. Safe to call for ids already
    /// seen; those are ignored.
    pub fn mark_entry_seen(&mut self, entry_id: &str, now: DateTime<Utc>) -> Result<()> {
        if !self.seen_ids.insert(entry_id.to_string()) {
            return Ok(());
        }
        self.store.insert_processed(entry_id, now.timestamp())?;
        self.seen_order.push_back(entry_id.to_string());

        // Memory bound only; durable ids stay authoritative across restarts.
        if self.seen_ids.len() > ID_HIGH_WATER {
            while self.seen_order.len() > ID_KEEP {
                if let Some(old) = self.seen_order.pop_front() {
                    self.seen_ids.remove(&old);
                }
            }
        }
        Ok(())
    }

    /// True if a signature recorded inside the window is similar enough to
    /// the candidate. Evicts expired signatures (strictly older than the
    /// window — a signature aged exactly `window` is still compared) from
    /// memory and store first. An empty signature (a symbol-only title
    /// normalizes to nothing) never matches: two empty strings have
    /// similarity 1.0, which would suppress every later such event.
    pub fn is_duplicate_title(&mut self, normalized_title: &str, now: DateTime<Utc>) -> Result<bool> {
        self.evict_expired(now)?;
        if normalized_title.is_empty() {
            return Ok(false);
        }
        Ok(self.titles.iter().any(|rec| {
            strsim::normalized_levenshtein(normalized_title, &rec.title) >= self.threshold
        }))
    }

    /// Append a signature after a successful publish — never before, so a
    /// failed publish does not poison the window against a retry. Empty
    /// signatures are not recorded.
    pub fn record_published(&mut self, normalized_title: &str, now: DateTime<Utc>) -> Result<()> {
        if normalized_title.is_empty() {
            return Ok(());
        }
        if self.titles.len() >= TITLE_CAPACITY {
            if let Some(oldest) = self.titles.pop_front() {
                self.store.delete_title(oldest.row_id)?;
            }
        }
        let row_id = self.store.insert_title(normalized_title, now.timestamp())?;
        self.titles.push_back(TitleRecord {
            row_id,
            title: normalized_title.to_string(),
            recorded_at: now,
        });
        Ok(())
    }

    pub fn processed_count(&self) -> usize {
        self.seen_ids.len()
    }

    fn evict_expired(&mut self, now: DateTime<Utc>) -> Result<()> {
        while let Some(front) = self.titles.front() {
            if now.signed_duration_since(front.recorded_at) <= self.window {
                break;
            }
            let row_id = front.row_id;
            self.titles.pop_front();
            self.store.delete_title(row_id)?;
        }
        Ok(())
    }
}

/// Normalize a raw title into its dedup signature: strip the leading
/// emoji/symbol run, strip trailing sentence punctuation, lowercase, and
/// collapse whitespace.
pub fn normalize_title(raw: &str) -> String {
    static RE_WS: OnceCell<Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| Regex::new(r"\s+").unwrap());

    let stripped = raw
        .trim_start_matches(|c: char| !c.is_alphanumeric())
        .trim_end_matches(|c: char| c.is_whitespace() || matches!(c, '.' | ':' | '…' | '!' | '؟' | '?'));
    re_ws
        .replace_all(&stripped.to_lowercase(), " ")
        .trim()
        .to_string()
}
