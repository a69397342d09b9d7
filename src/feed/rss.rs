//! RSS 2.0 parsing via serde derive over quick-xml.

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::config::FeedSource;
use crate::feed::FeedEntry;

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    items: Vec<Item>,
}

#[derive(Debug, Deserialize)]
struct Item {
    title: Option<String>,
    link: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    description: Option<String>,
    guid: Option<Guid>,
}

#[derive(Debug, Deserialize)]
struct Guid {
    #[serde(rename = "@isPermaLink")]
    _is_perma_link: Option<String>,
    #[serde(rename = "$text")]
    value: Option<String>,
}

/// Parse an RSS document into entries for `source`, newest first as they
/// appear in the feed. Entries with neither guid nor link are dropped:
/// without a stable id the at-most-once guarantee cannot hold.
pub fn parse_feed(xml: &str, source: &FeedSource) -> Result<Vec<FeedEntry>> {
    let cleaned = scrub_html_entities_for_xml(xml);
    let rss: Rss = quick_xml::de::from_str(&cleaned)
        .with_context(|| format!("parsing rss xml for {}", source.name))?;

    let mut out = Vec::with_capacity(rss.channel.items.len());
    for item in rss.channel.items {
        let link = item.link.unwrap_or_default();
        let native_id = item
            .guid
            .and_then(|g| g.value)
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| link.clone());
        if native_id.trim().is_empty() {
            continue;
        }
        out.push(FeedEntry {
            entry_id: format!("{}_{}", source.channel, native_id),
            title: item.title.unwrap_or_default().trim().to_string(),
            html_body: item.description.unwrap_or_default(),
            link,
            published: item.pub_date.unwrap_or_default(),
            source_name: source.name.clone(),
            source_channel: source.channel.clone(),
        });
    }
    Ok(out)
}

/// HTML names the XML parser does not know; seen in bridge output.
fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source() -> FeedSource {
        FeedSource {
            name: "Test Channel".into(),
            url: "https://rsshub.app/telegram/channel/testchan".into(),
            channel: "testchan".into(),
        }
    }

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
  <channel>
    <title>testchan</title>
    <item>
      <title>وبینار آموزشی</title>
      <link>https://t.me/testchan/101</link>
      <guid isPermaLink="false">tg-101</guid>
      <pubDate>Mon, 26 May 2025 19:13:00 GMT</pubDate>
      <description><![CDATA[<p>ثبت نام کنید</p>]]></description>
    </item>
    <item>
      <title>No guid item&nbsp;here</title>
      <link>https://t.me/testchan/100</link>
      <description>plain</description>
    </item>
  </channel>
</rss>"#;

    #[test]
    fn parses_items_with_guid_and_link_ids() {
        let entries = parse_feed(SAMPLE, &source()).unwrap();
        assert_eq!(entries.len(), 2);

        assert_eq!(entries[0].entry_id, "testchan_tg-101");
        assert_eq!(entries[0].title, "وبینار آموزشی");
        assert_eq!(entries[0].html_body, "<p>ثبت نام کنید</p>");
        assert_eq!(entries[0].published, "Mon, 26 May 2025 19:13:00 GMT");

        // Falls back to the link when no guid is present.
        assert_eq!(entries[1].entry_id, "testchan_https://t.me/testchan/100");
        assert_eq!(entries[1].title, "No guid item here");
    }

    #[test]
    fn empty_channel_yields_no_entries() {
        let xml = r#"<rss version="2.0"><channel><title>x</title></channel></rss>"#;
        assert!(parse_feed(xml, &source()).unwrap().is_empty());
    }

    #[test]
    fn identifier_less_items_are_dropped() {
        let xml = r#"<rss version="2.0"><channel>
            <item><title>nothing to key on</title></item>
        </channel></rss>"#;
        assert!(parse_feed(xml, &source()).unwrap().is_empty());
    }

    #[test]
    fn malformed_xml_is_an_error_not_a_panic() {
        assert!(parse_feed("<rss><channel><item>", &source()).is_err());
    }
}
