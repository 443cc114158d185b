use chrono::{DateTime, Utc};
use serde::Deserialize;
use thiserror::Error;

use crate::util::decode_entities;

/// Publication date layout accepted for entries (RFC 1123 with a numeric zone).
///
/// `Mon, 02 Jan 2006 15:04:05 -0700`. Named zones such as `GMT` are rejected.
pub const PUB_DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S %z";

#[derive(Debug, Error)]
pub enum ParseError {
    /// The document could not be decoded as an RSS 2.0 channel
    #[error("Malformed feed document: {0}")]
    Malformed(String),
}

// ============================================================================
// Wire Format
// ============================================================================

#[derive(Debug, Deserialize)]
struct RssDocument {
    channel: RssChannel,
}

// Element names are matched without their namespace prefix, so `<atom:link>` and
// `<media:description>` land in the same field as `<link>` and `<description>`.
// Every text field is a list and the first non-empty value wins.
#[derive(Debug, Deserialize)]
struct RssChannel {
    #[serde(default)]
    title: Vec<TextElement>,
    #[serde(default)]
    link: Vec<TextElement>,
    #[serde(default)]
    description: Vec<TextElement>,
    #[serde(rename = "item", default)]
    items: Vec<RssItem>,
}

#[derive(Debug, Deserialize)]
struct RssItem {
    #[serde(default)]
    title: Vec<TextElement>,
    #[serde(default)]
    link: Vec<TextElement>,
    #[serde(default)]
    description: Vec<TextElement>,
    #[serde(rename = "pubDate", default)]
    pub_date: Vec<TextElement>,
}

/// Text content of an element; attributes (`href`, `rel`, ...) are ignored.
#[derive(Debug, Default, Deserialize)]
struct TextElement {
    #[serde(rename = "$text", default)]
    text: String,
}

fn first_text(elements: &[TextElement]) -> &str {
    elements
        .iter()
        .map(|e| e.text.trim())
        .find(|t| !t.is_empty())
        .unwrap_or("")
}

// ============================================================================
// Normalized Output
// ============================================================================

/// Channel metadata plus its usable entries, in document order
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedFeed {
    pub title: String,
    pub link: String,
    pub description: String,
    pub entries: Vec<NormalizedEntry>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedEntry {
    pub title: String,
    pub link: String,
    pub description: String,
    pub published_at: DateTime<Utc>,
}

/// Result of parsing a feed with per-entry recovery.
///
/// `skipped` counts entries dropped for an unparsable date or a missing link.
#[derive(Debug)]
pub struct ParseResult {
    pub feed: NormalizedFeed,
    pub skipped: usize,
}

/// Parse an entry's `pubDate` in [`PUB_DATE_FORMAT`].
pub fn parse_pub_date(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_str(raw.trim(), PUB_DATE_FORMAT)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Decode an RSS 2.0 document into a [`NormalizedFeed`].
///
/// HTML entities in titles and descriptions are decoded. Entries that cannot
/// become posts are dropped individually and counted in
/// [`ParseResult::skipped`]; only a structurally broken document fails.
pub fn parse_feed(bytes: &[u8]) -> Result<ParseResult, ParseError> {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    let text = std::str::from_utf8(bytes).map_err(|e| ParseError::Malformed(e.to_string()))?;

    let document: RssDocument =
        quick_xml::de::from_str(text).map_err(|e| ParseError::Malformed(e.to_string()))?;
    let channel = document.channel;

    let total = channel.items.len();
    let entries: Vec<NormalizedEntry> = channel
        .items
        .iter()
        .filter_map(|item| {
            let title = first_text(&item.title);
            let link = first_text(&item.link);
            if link.is_empty() {
                tracing::warn!(title = %title, "Skipping entry without a link");
                return None;
            }
            let pub_date = first_text(&item.pub_date);
            let Some(published_at) = parse_pub_date(pub_date) else {
                tracing::warn!(
                    link = %link,
                    pub_date = %pub_date,
                    "Skipping entry with unparsable publication date"
                );
                return None;
            };
            Some(NormalizedEntry {
                title: decode_entities(title),
                link: link.to_string(),
                description: decode_entities(first_text(&item.description)),
                published_at,
            })
        })
        .collect();

    Ok(ParseResult {
        skipped: total - entries.len(),
        feed: NormalizedFeed {
            title: decode_entities(first_text(&channel.title)),
            link: first_text(&channel.link).to_string(),
            description: decode_entities(first_text(&channel.description)),
            entries,
        },
    })
}
