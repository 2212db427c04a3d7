//! Feed retrieval: HTTP fetch, document parsing and the feed list.

pub mod feed_list;
pub mod fetcher;
pub mod parser;

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::contract::{Feed, FeedSource, ParsedFeed};
use crate::error::{FeedError, FetchError};

pub use feed_list::{load_feed_list, parse_feed_list};
pub use parser::parse_feed;

/// Production [`FeedSource`]: fetches over HTTP and parses with feed-rs.
pub struct HttpFeedSource {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpFeedSource {
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        Ok(Self {
            client: fetcher::build_client(timeout)?,
            timeout,
        })
    }
}

#[async_trait]
impl FeedSource for HttpFeedSource {
    async fn fetch(&self, feed: &Feed) -> Result<ParsedFeed, FeedError> {
        info!(url = %feed.url, "Fetching feed");
        let bytes = fetcher::fetch_bytes(&self.client, &feed.url, self.timeout).await?;
        debug!(url = %feed.url, size = bytes.len(), "Feed downloaded");
        let parsed = parse_feed(&bytes, feed)?;
        info!(
            url = %feed.url,
            feed = %parsed.display_name,
            entries = parsed.entries.len(),
            "Feed parsed"
        );
        Ok(parsed)
    }
}
