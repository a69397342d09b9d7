//! Keyword heuristics for spotting event announcements (webinars,
//! workshops, seminars, ...) in feed entries. Pure substring containment
//! over a fixed bilingual vocabulary; no stemming, no scoring model.

use crate::render;

/// Broad vocabulary counted toward the hit floor.
const EVENT_KEYWORDS: &[&str] = &[
    "وبینار",
    "webinar",
    "کارگاه",
    "workshop",
    "سمینار",
    "seminar",
    "کنفرانس",
    "conference",
    "همایش",
    "congress",
    "نشست",
    "meeting",
    "دوره آموزشی",
    "course",
    "کلاس",
    "class",
    "ایونت",
    "event",
    "برگزار",
    "organize",
    "شرکت",
    "participate",
    "ثبت نام",
    "register",
    "رایگان",
    "free",
    "آنلاین",
    "online",
    "مجازی",
    "virtual",
    "آموزش",
    "training",
    "فراخوان",
    "call",
    "گواهی",
    "certificate",
    "مدرک",
    "certification",
    "لایو",
    "live",
];

/// Event nouns that make a title a match on their own.
const TITLE_STRONG: &[&str] = &[
    "وبینار",
    "کارگاه",
    "سمینار",
    "دوره",
    "کنفرانس",
    "همایش",
    "ایونت",
    "نشست",
    "webinar",
    "workshop",
    "seminar",
    "conference",
    "congress",
];

/// High-confidence substrings anywhere in title+body.
const HIGH_CONFIDENCE: &[&str] = &[
    "ثبت نام",
    "شرکت در",
    "دوره آنلاین",
    "لینک ثبت",
    "هزینه دوره",
    "register",
    "registration link",
    "course fee",
    "join",
];

/// Secondary keywords that qualify a title when nothing else fires.
const TITLE_SECONDARY: &[&str] = &["آموزش", "training", "فراخوان", "call", "لایو", "live"];

/// Minimum broad-keyword hits for a match without a stronger signal.
const KEYWORD_HIT_FLOOR: usize = 2;

#[derive(Debug, Clone, Copy, Default)]
pub struct EventDetector;

impl EventDetector {
    pub fn new() -> Self {
        Self
    }

    /// Decide whether an entry describes an event. Total function; broken
    /// HTML degrades to whatever text the parser can salvage.
    ///
    /// The forwarded-from attribution header is stripped before matching so
    /// source-channel names never count as keywords.
    pub fn detect(&self, title: &str, html_body: &str) -> bool {
        let title_lower = title.to_lowercase();
        if TITLE_STRONG.iter().any(|k| title_lower.contains(k)) {
            return true;
        }

        let body_lower = render::plain_text(html_body).to_lowercase();
        let text = format!("{title_lower} {body_lower}");

        if HIGH_CONFIDENCE.iter().any(|k| text.contains(k)) {
            return true;
        }
        let hits = EVENT_KEYWORDS.iter().filter(|k| text.contains(*k)).count();
        if hits >= KEYWORD_HIT_FLOOR {
            return true;
        }
        TITLE_SECONDARY.iter().any(|k| title_lower.contains(k))
    }
}
