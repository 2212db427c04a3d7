//! # contract: data model and trait seams of the pipeline
//!
//! This module defines the plain data passed between stages and the two traits
//! the orchestrator depends on:
//!
//! - [`FeedSource`]: retrieves and parses one feed (HTTP in production).
//! - [`DeliveryClient`]: the capability set of the external delivery tool
//!   (`rmapi` in production, an in-memory fake in tests).
//!
//! ## Mocking & Testing
//! - Both traits are annotated for `mockall` so tests can generate mocks
//!   (enabled under `cfg(test)` and the default `test-export-mocks` feature).
//!
//! ## Outcomes
//! - Every entry that reaches rendering yields one [`DeliveryOutcome`]; every
//!   feed that fails to fetch or parse yields one [`FeedFailure`]. Both are
//!   folded into the [`RunSummary`], which derives the process exit status.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
#[cfg(any(test, feature = "test-export-mocks"))]
use mockall::automock;
use serde::Serialize;
use tracing::info;

use crate::error::{DeliveryError, FeedError};

/// A configured feed. `display_name` is the optional name given on the feed
/// list line; when absent the feed document's own title is used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Feed {
    pub url: String,
    pub display_name: Option<String>,
}

impl Feed {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            display_name: None,
        }
    }

    pub fn named(url: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            display_name: Some(display_name.into()),
        }
    }
}

/// One article/post of a feed, normalized across Atom and RSS.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    /// Effective display name of the feed this entry came from.
    pub feed_title: String,
    pub title: String,
    /// Defaults to the feed display name when the entry has no author.
    pub author: String,
    pub published_at: Option<DateTime<Utc>>,
    pub link: Option<String>,
    /// Body markup as found in the feed (content, falling back to summary).
    pub raw_content: String,
}

/// A parsed feed document.
#[derive(Debug, Clone)]
pub struct ParsedFeed {
    pub display_name: String,
    pub entries: Vec<Entry>,
}

/// An entry that passed the recency filter, with its resolved timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct RecentEntry {
    pub entry: Entry,
    pub published_at: DateTime<Utc>,
}

/// Output of the renderer, owned by the pipeline until it is persisted.
#[derive(Debug, Clone)]
pub struct RenderedDocument {
    pub entry_title: String,
    pub bytes: Vec<u8>,
    /// `"{MM-DD-YYYY} {title}.pdf"` before collision resolution.
    pub proposed_file_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DeliveryStatus {
    Delivered,
    SkippedDuplicate,
    /// Persisted locally in a render-only run.
    Rendered,
    Failed,
}

impl DeliveryStatus {
    pub fn is_success(self) -> bool {
        !matches!(self, DeliveryStatus::Failed)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DeliveryOutcome {
    pub feed: String,
    pub entry_title: String,
    pub local_path: Option<PathBuf>,
    pub status: DeliveryStatus,
    pub error_detail: Option<String>,
}

impl DeliveryOutcome {
    pub fn succeeded(
        feed: &str,
        entry_title: &str,
        local_path: PathBuf,
        status: DeliveryStatus,
    ) -> Self {
        Self {
            feed: feed.to_string(),
            entry_title: entry_title.to_string(),
            local_path: Some(local_path),
            status,
            error_detail: None,
        }
    }

    pub fn failed(
        feed: &str,
        entry_title: &str,
        local_path: Option<PathBuf>,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            feed: feed.to_string(),
            entry_title: entry_title.to_string(),
            local_path,
            status: DeliveryStatus::Failed,
            error_detail: Some(detail.into()),
        }
    }
}

/// A feed that could not be fetched or parsed. Counts as one failed unit.
#[derive(Debug, Clone, Serialize)]
pub struct FeedFailure {
    pub url: String,
    pub error: String,
}

/// Aggregate of one run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub succeeded: usize,
    pub failed: usize,
    pub total: usize,
    pub feeds_processed: usize,
    pub feeds_failed: usize,
    pub entries_found: usize,
    pub entries_recent: usize,
    pub documents_rendered: usize,
    pub delivered: usize,
    pub skipped_duplicates: usize,
    pub outcomes: Vec<DeliveryOutcome>,
    pub feed_failures: Vec<FeedFailure>,
}

impl RunSummary {
    pub fn record_outcome(&mut self, outcome: DeliveryOutcome) {
        match outcome.status {
            DeliveryStatus::Delivered => self.delivered += 1,
            DeliveryStatus::SkippedDuplicate => self.skipped_duplicates += 1,
            DeliveryStatus::Rendered | DeliveryStatus::Failed => {}
        }
        if outcome.local_path.is_some() {
            self.documents_rendered += 1;
        }
        if outcome.status.is_success() {
            self.succeeded += 1;
        } else {
            self.failed += 1;
        }
        self.total += 1;
        self.outcomes.push(outcome);
    }

    pub fn record_feed_failure(&mut self, failure: FeedFailure) {
        self.feeds_failed += 1;
        self.failed += 1;
        self.total += 1;
        self.feed_failures.push(failure);
    }

    /// `0` when nothing failed (including empty runs), `1` when nothing
    /// succeeded, `2` for a partial failure.
    pub fn exit_code(&self) -> i32 {
        if self.failed == 0 {
            0
        } else if self.succeeded == 0 {
            1
        } else {
            2
        }
    }

    pub fn trace_summary(&self) {
        info!("{}", "=".repeat(60));
        info!("PROCESSING SUMMARY:");
        info!(count = self.feeds_processed, "  Feeds processed");
        info!(count = self.feeds_failed, "  Feeds failed");
        info!(count = self.entries_found, "  Total entries found");
        info!(count = self.entries_recent, "  Recent entries");
        info!(count = self.documents_rendered, "  PDFs generated");
        info!(count = self.delivered, "  reMarkable uploaded");
        info!(count = self.skipped_duplicates, "  reMarkable skipped");
        info!(
            succeeded = self.succeeded,
            failed = self.failed,
            total = self.total,
            exit_code = self.exit_code(),
            "  Run outcome"
        );
        info!("{}", "=".repeat(60));
    }
}

/// Retrieves and parses a single feed.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait FeedSource: Send + Sync {
    /// Fetch the feed document and normalize its entries.
    ///
    /// Fails with [`FeedError::Fetch`] on network/timeout/status problems and
    /// with [`FeedError::Parse`] when the document itself is unparsable.
    async fn fetch(&self, feed: &Feed) -> Result<ParsedFeed, FeedError>;
}

/// Capability set of the external delivery tool.
///
/// Each call is a single bounded invocation; implementations report timeouts
/// and non-zero exits as [`DeliveryError`] carrying the tool's diagnostics.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait DeliveryClient: Send + Sync {
    /// Create `folder` if it does not exist. Idempotent.
    async fn ensure_folder(&self, folder: &str) -> Result<(), DeliveryError>;

    /// Names of the entries directly under `folder`.
    async fn list_folder(&self, folder: &str) -> Result<HashSet<String>, DeliveryError>;

    /// Upload a local file into `folder`.
    async fn upload(&self, local_path: &Path, folder: &str) -> Result<(), DeliveryError>;

    /// Tool version, used as the availability check at startup.
    async fn version(&self) -> Result<String, DeliveryError>;
}
