//! Final message assembly: rendered body plus a metadata block (link,
//! source attribution, publish date), kept under the platform's 4096-char
//! ceiling. Over-length bodies are truncated on the pre-conversion plain
//! text and re-escaped, so emphasis and link markers are never cut open.

use time::format_description::well_known::Rfc2822;

use crate::dedup::normalize_title;
use crate::feed::FeedEntry;
use crate::render::{self, OutputMode, RLM};

pub const MAX_MESSAGE_CHARS: usize = 4096;
/// Semantic cap on the body before assembly.
const MAX_BODY_CHARS: usize = 2500;
/// How far back from the cut a sentence boundary is still preferred.
const SENTENCE_LOOKBACK: usize = 300;

#[derive(Debug, Clone, Copy)]
pub struct MessageBuilder {
    mode: OutputMode,
}

impl MessageBuilder {
    pub fn new(mode: OutputMode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> OutputMode {
        self.mode
    }

    /// Build the outgoing message for an entry. Returns an empty string
    /// when there is nothing worth publishing.
    pub fn build(&self, entry: &FeedEntry) -> String {
        let title = entry.title.trim();
        let mut plain = render::plain_text(&entry.html_body);
        let mut rich = render::convert(&entry.html_body, self.mode);

        // Bridge posts often repeat the title as the first body line.
        if let Some((p, r)) = collapse_leading_title_echo(title, &plain, &rich) {
            plain = p;
            rich = r;
        }

        let body = if plain.chars().count() > MAX_BODY_CHARS {
            let cut = truncate_at_sentence(&plain, MAX_BODY_CHARS);
            self.ellipsized(&cut)
        } else {
            rich
        };

        if title.is_empty() && body.is_empty() {
            return String::new();
        }

        let meta = self.metadata_block(entry);
        let mut message = self.assemble(title, &body, &meta);

        // Hard ceiling: shrink the body first, then the title itself.
        let mut body_keep = plain.chars().count().min(MAX_BODY_CHARS);
        let mut title_keep = title.chars().count();
        loop {
            let over = message.chars().count().saturating_sub(MAX_MESSAGE_CHARS);
            if over == 0 {
                break;
            }
            if body_keep > 0 {
                body_keep = body_keep.saturating_sub(over.max(1));
                let cut = truncate_chars(&plain, body_keep).trim_end();
                let body = self.ellipsized(cut);
                message = self.assemble(title, &body, &meta);
                continue;
            }
            if title_keep == 0 {
                message = self.assemble("", "", &meta);
                break;
            }
            title_keep = title_keep.saturating_sub(over.max(1));
            let short = truncate_chars(title, title_keep).trim_end();
            let shown = if short.is_empty() {
                String::new()
            } else {
                format!("{short}…")
            };
            message = self.assemble(&shown, "", &meta);
        }
        message
    }

    fn assemble(&self, title: &str, body: &str, meta: &str) -> String {
        let mut parts = Vec::new();
        if !title.is_empty() {
            parts.push(format!("{RLM}📝 {}", self.bold(&render::escape(title, self.mode))));
        }
        if !body.is_empty() {
            parts.push(format!("{RLM}{body}"));
        }
        if !meta.is_empty() {
            parts.push(meta.to_string());
        }
        parts.join("\n\n")
    }

    fn metadata_block(&self, entry: &FeedEntry) -> String {
        let mut lines = Vec::new();

        let link = entry.link.trim();
        if link.starts_with("http://") || link.starts_with("https://") {
            lines.push(format!(
                "{RLM}🔗 {}",
                self.link(&render::escape("مشاهده کامل رویداد", self.mode), link)
            ));
        }

        let source_label = self.bold(&render::escape("منبع:", self.mode));
        if entry.source_channel.trim().is_empty() {
            lines.push(format!(
                "{RLM}📢 {source_label} {}",
                render::escape(&entry.source_name, self.mode)
            ));
        } else {
            lines.push(format!(
                "{RLM}📢 {source_label} {}",
                self.link(
                    &render::escape(&entry.source_name, self.mode),
                    &format!("https://t.me/{}", entry.source_channel.trim()),
                )
            ));
        }

        if let Some(date) = format_published(&entry.published) {
            lines.push(format!(
                "{RLM}📅 {} {}",
                self.bold(&render::escape("انتشار:", self.mode)),
                render::escape(&date, self.mode)
            ));
        }

        lines.join("\n")
    }

    fn ellipsized(&self, plain_cut: &str) -> String {
        if plain_cut.is_empty() {
            return String::new();
        }
        format!("{}{RLM}…", render::escape(plain_cut, self.mode))
    }

    fn bold(&self, escaped: &str) -> String {
        match self.mode {
            OutputMode::MarkdownV2 => format!("*{escaped}*"),
            OutputMode::Html => format!("<b>{escaped}</b>"),
        }
    }

    fn link(&self, escaped_label: &str, url: &str) -> String {
        match self.mode {
            OutputMode::MarkdownV2 => {
                let url = url.replace('(', "%28").replace(')', "%29");
                format!("[{escaped_label}]({url})")
            }
            OutputMode::Html => format!(
                "<a href=\"{}\">{escaped_label}</a>",
                html_escape::encode_double_quoted_attribute(url)
            ),
        }
    }
}

/// Drop the body's first line when it merely repeats the title (equal
/// normalized forms, or one a meaningful prefix of the other).
fn collapse_leading_title_echo(title: &str, plain: &str, rich: &str) -> Option<(String, String)> {
    let title_sig = normalize_title(title);
    if title_sig.is_empty() {
        return None;
    }
    let line_sig = normalize_title(plain.lines().next().unwrap_or(""));
    if line_sig.is_empty() {
        return None;
    }

    let echo = title_sig == line_sig
        || (title_sig.chars().count() > 7 && line_sig.starts_with(&title_sig))
        || (line_sig.chars().count() > 7 && title_sig.starts_with(&line_sig));
    if !echo {
        return None;
    }
    Some((drop_first_line(plain), drop_first_line(rich)))
}

fn drop_first_line(s: &str) -> String {
    match s.split_once('\n') {
        Some((_, rest)) => rest.trim().to_string(),
        None => String::new(),
    }
}

fn truncate_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Cut to at most `max_chars`, preferring a sentence boundary close to
/// the cut point.
fn truncate_at_sentence(s: &str, max_chars: usize) -> String {
    let cut = truncate_chars(s, max_chars);
    if cut.len() == s.len() {
        return cut.to_string();
    }
    if let Some(pos) = cut.rfind('.') {
        if cut[pos..].chars().count() <= SENTENCE_LOOKBACK {
            return cut[..=pos].to_string();
        }
    }
    cut.trim_end().to_string()
}

/// Render the feed's RFC2822 `pubDate` as "26 May 2025 - 19:13 UTC";
/// unparseable strings are shown raw.
fn format_published(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    let fmt =
        time::macros::format_description!("[day] [month repr:short] [year] - [hour]:[minute] UTC");
    match time::OffsetDateTime::parse(raw, &Rfc2822) {
        Ok(dt) => Some(
            dt.to_offset(time::UtcOffset::UTC)
                .format(&fmt)
                .unwrap_or_else(|_| raw.to_string()),
        ),
        Err(_) => Some(raw.to_string()),
    }
}
