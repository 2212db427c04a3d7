use std::path::Path;

use tracing::{error, info};

use crate::contract::Feed;

/// One feed per line: `URL` or `URL <whitespace> Display Name`.
/// Blank lines and `#` comments are skipped.
pub fn parse_feed_list(text: &str) -> Vec<Feed> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(|line| match line.split_once(char::is_whitespace) {
            Some((url, name)) if !name.trim().is_empty() => Feed::named(url, name.trim()),
            Some((url, _)) => Feed::new(url),
            None => Feed::new(line),
        })
        .collect()
}

/// Read the feed list from disk. A missing or unreadable file is logged and
/// treated as an empty list.
pub fn load_feed_list(path: &Path) -> Vec<Feed> {
    match std::fs::read_to_string(path) {
        Ok(text) => {
            let feeds = parse_feed_list(&text);
            info!(path = %path.display(), count = feeds.len(), "Loaded feed URLs");
            feeds
        }
        Err(e) => {
            error!(path = %path.display(), error = %e, "Feeds file not found or unreadable");
            Vec::new()
        }
    }
}
