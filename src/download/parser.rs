use feed_rs::parser;

use crate::contract::{Entry, Feed, ParsedFeed};
use crate::error::ParseError;

pub const UNKNOWN_FEED: &str = "Unknown Feed";
pub const UNTITLED: &str = "Untitled";

/// Parse an Atom, RSS or JSON Feed document into normalized entries.
///
/// Document order is preserved. A missing publication time is not an error;
/// it is resolved later by the recency filter.
pub fn parse_feed(bytes: &[u8], feed: &Feed) -> Result<ParsedFeed, ParseError> {
    let document = parser::parse(bytes).map_err(|e| ParseError(e.to_string()))?;

    let display_name = feed
        .display_name
        .as_deref()
        .and_then(non_blank)
        .or_else(|| document.title.as_ref().and_then(|t| non_blank(&t.content)))
        .or_else(|| url_host(&feed.url))
        .unwrap_or_else(|| UNKNOWN_FEED.to_string());

    let entries = document
        .entries
        .into_iter()
        .map(|entry| {
            let title = entry
                .title
                .as_ref()
                .and_then(|t| non_blank(&t.content))
                .unwrap_or_else(|| UNTITLED.to_string());
            let author = entry
                .authors
                .first()
                .and_then(|p| non_blank(&p.name))
                .unwrap_or_else(|| display_name.clone());
            let raw_content = entry
                .content
                .and_then(|c| c.body)
                .filter(|body| !body.trim().is_empty())
                .or_else(|| entry.summary.map(|s| s.content))
                .unwrap_or_default();

            Entry {
                feed_title: display_name.clone(),
                title,
                author,
                published_at: entry.published.or(entry.updated),
                link: entry.links.first().map(|l| l.href.clone()),
                raw_content,
            }
        })
        .collect();

    Ok(ParsedFeed {
        display_name,
        entries,
    })
}

fn non_blank(s: &str) -> Option<String> {
    let trimmed = s.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn url_host(url: &str) -> Option<String> {
    url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
}
