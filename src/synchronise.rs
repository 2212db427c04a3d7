//! High-level pipeline: orchestrates fetch → filter → render → persist → deliver
//! for every configured feed.
//!
//! # Responsibilities
//! - Drives each feed through the stages and records one
//!   [`DeliveryOutcome`] per entry that reached rendering.
//! - Isolates failures: a feed that cannot be fetched or parsed is recorded
//!   as one failed unit and the run moves on; a failing entry never stops the
//!   rest of its feed.
//! - Folds everything into a [`RunSummary`], which derives the exit status.
//!
//! # Concurrency
//! Feeds run through a bounded pool (`feed_concurrency`, default 1). Each
//! output directory gets one [`OutputAllocator`] per run behind an async lock,
//! so feeds that map to the same directory take turns and never claim the same
//! name. Each feed owns its remote listing.
//!
//! # Repeated runs
//! An entry whose document is already on disk from an earlier run is not
//! rendered again. The existing file is reused and the remote existence check
//! reports it as [`DeliveryStatus::SkippedDuplicate`] once it has been
//! uploaded.
//!
//! # Delivery
//! With no [`DeliveryClient`] the run is render-only and successful entries
//! are reported as [`DeliveryStatus::Rendered`]. Otherwise the remote folder
//! `{remote_folder}/{feed dir}` is ensured and listed once per feed, lazily,
//! right before the first upload.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, error, info, warn};

use crate::config::RunConfig;
use crate::contract::{
    DeliveryClient, DeliveryOutcome, DeliveryStatus, Feed, FeedFailure, FeedSource, RecentEntry,
    RunSummary,
};
use crate::error::{ConfigError, DeliveryError, FeedError};
use crate::output::{feed_directory_name, persist, OutputAllocator};
use crate::preprocess::Processor;
use crate::recency::filter_recent;
use crate::upload::{deliver, feed_folder};

/// Result of processing one feed, before it is folded into the summary.
#[derive(Debug)]
enum FeedReport {
    Failed(FeedFailure),
    Processed {
        entries_found: usize,
        entries_recent: usize,
        outcomes: Vec<DeliveryOutcome>,
    },
}

pub struct Synchroniser<S, D> {
    config: RunConfig,
    source: S,
    delivery: Option<D>,
    processor: Processor,
}

impl<S, D> Synchroniser<S, D>
where
    S: FeedSource,
    D: DeliveryClient,
{
    /// `delivery: None` makes the run render-only.
    pub fn new(config: RunConfig, source: S, delivery: Option<D>) -> Self {
        let processor = Processor::from_config(&config.render);
        Self {
            config,
            source,
            delivery,
            processor,
        }
    }

    pub fn with_processor(mut self, processor: Processor) -> Self {
        self.processor = processor;
        self
    }

    pub fn delivery(&self) -> Option<&D> {
        self.delivery.as_ref()
    }

    /// Startup checks for delivery: the credential file must exist and the
    /// tool must answer `version`. Returns the tool version, or `None` for a
    /// render-only run.
    pub async fn preflight(&self) -> Result<Option<String>, ConfigError> {
        let Some(client) = &self.delivery else {
            info!("[SYNC] Render-only run, skipping delivery checks");
            return Ok(None);
        };

        let credentials = self
            .config
            .delivery
            .credentials_file
            .as_ref()
            .ok_or(ConfigError::NoCredential)?;
        if !credentials.is_file() {
            error!(path = %credentials.display(), "[SYNC][ERROR] Delivery credential file not found");
            return Err(ConfigError::MissingCredential(credentials.clone()));
        }

        let version = client.version().await.map_err(|e| {
            error!(error = %e, "[SYNC][ERROR] Delivery tool unavailable");
            ConfigError::ToolUnavailable(e)
        })?;
        info!(version = %version, "[SYNC] rmapi available");
        Ok(Some(version))
    }

    /// Process every feed and aggregate the outcomes. `now` is the run start:
    /// the recency window is measured from it and it is stamped into every
    /// document as the generation time.
    pub async fn synchronise(&self, feeds: &[Feed], now: DateTime<Utc>) -> RunSummary {
        info!(
            feeds = feeds.len(),
            recent_hours = self.config.recent_hours,
            render_only = self.delivery.is_none(),
            "[SYNC] Starting synchronisation"
        );

        let directories = DirectoryAllocators::default();
        let reports: Vec<FeedReport> = stream::iter(feeds)
            .map(|feed| self.process_feed(feed, now, &directories))
            .buffer_unordered(self.config.feed_concurrency.max(1))
            .collect()
            .await;

        let mut summary = RunSummary::default();
        for report in reports {
            match report {
                FeedReport::Failed(failure) => summary.record_feed_failure(failure),
                FeedReport::Processed {
                    entries_found,
                    entries_recent,
                    outcomes,
                } => {
                    summary.feeds_processed += 1;
                    summary.entries_found += entries_found;
                    summary.entries_recent += entries_recent;
                    for outcome in outcomes {
                        summary.record_outcome(outcome);
                    }
                }
            }
        }

        summary.trace_summary();
        match serde_json::to_string_pretty(&summary) {
            Ok(json) => debug!(json = %json, "[SYNC][DEBUG] Run summary as JSON"),
            Err(e) => error!(error = ?e, "[SYNC][DEBUG] Failed to serialize run summary as JSON"),
        }
        summary
    }

    async fn process_feed(
        &self,
        feed: &Feed,
        now: DateTime<Utc>,
        directories: &DirectoryAllocators,
    ) -> FeedReport {
        info!(url = %feed.url, "[SYNC] Processing feed");
        let parsed = match with_retries(
            self.config.retry_attempts,
            "fetch",
            FeedError::is_retryable,
            move || self.source.fetch(feed),
        )
        .await
        {
            Ok(parsed) => parsed,
            Err(e) => {
                error!(url = %feed.url, error = %e, "[SYNC][ERROR] Feed failed");
                return FeedReport::Failed(FeedFailure {
                    url: feed.url.clone(),
                    error: e.to_string(),
                });
            }
        };

        let feed_name = parsed.display_name;
        let entries_found = parsed.entries.len();
        let recent = filter_recent(
            parsed.entries,
            now,
            self.config.window(),
            self.config.undated_policy,
        );
        info!(
            feed = %feed_name,
            entries = entries_found,
            recent = recent.len(),
            "[SYNC] Found recent entries"
        );

        let mut outcomes = Vec::with_capacity(recent.len());
        if !recent.is_empty() {
            let feed_dir = feed_directory_name(&feed_name);
            let local_dir = self.config.output_dir.join(&feed_dir);
            let mut allocator = directories.acquire(&local_dir).await;
            let mut destination = self.delivery.as_ref().map(|client| {
                FeedDestination::new(
                    client,
                    &self.config.delivery.remote_folder,
                    &feed_dir,
                    self.config.retry_attempts,
                )
            });

            for entry in &recent {
                let outcome = self
                    .process_entry(&feed_name, entry, now, &mut *allocator, destination.as_mut())
                    .await;
                outcomes.push(outcome);
            }
        }

        FeedReport::Processed {
            entries_found,
            entries_recent: recent.len(),
            outcomes,
        }
    }

    async fn process_entry(
        &self,
        feed_name: &str,
        recent: &RecentEntry,
        now: DateTime<Utc>,
        allocator: &mut OutputAllocator,
        destination: Option<&mut FeedDestination<'_, D>>,
    ) -> DeliveryOutcome {
        let title = recent.entry.title.as_str();

        let allocation = match allocator.allocate(recent.published_at, title) {
            Ok(allocation) => allocation,
            Err(e) => {
                error!(feed = %feed_name, title, dir = %allocator.dir().display(), error = %e, "[SYNC][ERROR] Could not check output directory");
                return DeliveryOutcome::failed(feed_name, title, None, e.to_string());
            }
        };
        let path = allocation.path;

        if allocation.existing {
            info!(path = %path.display(), "[SYNC] PDF already exists, reusing it");
            if destination.is_none() {
                return DeliveryOutcome::succeeded(
                    feed_name,
                    title,
                    path,
                    DeliveryStatus::SkippedDuplicate,
                );
            }
        } else {
            let document = match self.processor.render(recent, now) {
                Ok(document) => document,
                Err(e) => {
                    error!(feed = %feed_name, title, error = %e, "[SYNC][ERROR] Rendering failed");
                    return DeliveryOutcome::failed(feed_name, title, None, e.to_string());
                }
            };
            if let Err(e) = persist(&path, &document.bytes) {
                error!(path = %path.display(), error = %e, "[SYNC][ERROR] Could not write PDF");
                return DeliveryOutcome::failed(
                    feed_name,
                    title,
                    None,
                    format!("write {}: {e}", path.display()),
                );
            }
            info!(
                path = %path.display(),
                proposed = %document.proposed_file_name,
                size = document.bytes.len(),
                "[SYNC] Generated PDF"
            );
        }

        let Some(destination) = destination else {
            return DeliveryOutcome::succeeded(feed_name, title, path, DeliveryStatus::Rendered);
        };
        match destination.deliver(&path).await {
            Ok(status) => DeliveryOutcome::succeeded(feed_name, title, path, status),
            Err(e) => {
                error!(path = %path.display(), error = %e, "[SYNC][ERROR][UPLOAD] Delivery failed");
                DeliveryOutcome::failed(feed_name, title, Some(path), e.to_string())
            }
        }
    }
}

enum DestinationState {
    Pending,
    Ready(HashSet<String>),
    Unavailable(String),
}

/// Remote folder of one feed, prepared on first use.
struct FeedDestination<'a, D> {
    client: &'a D,
    root: &'a str,
    folder: String,
    attempts: u32,
    state: DestinationState,
}

impl<'a, D: DeliveryClient> FeedDestination<'a, D> {
    fn new(client: &'a D, root: &'a str, feed_dir: &str, attempts: u32) -> Self {
        Self {
            client,
            root,
            folder: feed_folder(root, feed_dir),
            attempts,
            state: DestinationState::Pending,
        }
    }

    async fn prepare(&self) -> DestinationState {
        for folder in [self.root, self.folder.as_str()] {
            let client = self.client;
            let ensured = with_retries(self.attempts, "mkdir", |_| true, move || {
                client.ensure_folder(folder)
            })
            .await;
            if let Err(e) = ensured {
                error!(folder, error = %e, "[SYNC][ERROR][UPLOAD] Could not ensure remote folder");
                return DestinationState::Unavailable(e.to_string());
            }
        }

        let client = self.client;
        let folder = self.folder.as_str();
        match with_retries(self.attempts, "ls", |_| true, move || client.list_folder(folder)).await {
            Ok(listing) => {
                debug!(folder, existing = listing.len(), "[SYNC][UPLOAD] Listed remote folder");
                DestinationState::Ready(listing)
            }
            Err(e) => {
                warn!(folder, error = %e, "[SYNC][UPLOAD] Could not list remote folder, assuming empty");
                DestinationState::Ready(HashSet::new())
            }
        }
    }

    async fn deliver(&mut self, path: &Path) -> Result<DeliveryStatus, DeliveryError> {
        if matches!(self.state, DestinationState::Pending) {
            self.state = self.prepare().await;
        }
        let listing = match &mut self.state {
            DestinationState::Ready(listing) => listing,
            DestinationState::Unavailable(diagnostic) => {
                return Err(DeliveryError::FolderUnavailable {
                    folder: self.folder.clone(),
                    diagnostic: diagnostic.clone(),
                });
            }
            DestinationState::Pending => {
                return Err(DeliveryError::FolderUnavailable {
                    folder: self.folder.clone(),
                    diagnostic: "folder was not prepared".to_string(),
                });
            }
        };

        let mut attempt = 1;
        loop {
            match deliver(self.client, path, &self.folder, listing).await {
                Err(e) if attempt < self.attempts => {
                    warn!(attempt, error = %e, "[SYNC][UPLOAD] Upload failed, retrying");
                    attempt += 1;
                }
                result => return result,
            }
        }
    }
}

/// Run `op` up to `attempts` times while the error is retryable.
async fn with_retries<T, E, F, Fut>(
    attempts: u32,
    operation: &str,
    retryable: impl Fn(&E) -> bool,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let attempts = attempts.max(1);
    let mut attempt = 1;
    loop {
        match op().await {
            Err(e) if attempt < attempts && retryable(&e) => {
                warn!(operation, attempt, error = %e, "[SYNC] Attempt failed, retrying");
                attempt += 1;
            }
            result => return result,
        }
    }
}

/// The run's allocator for each output directory, one async lock apiece.
#[derive(Default)]
struct DirectoryAllocators {
    inner: Mutex<HashMap<PathBuf, Arc<tokio::sync::Mutex<OutputAllocator>>>>,
}

impl DirectoryAllocators {
    async fn acquire(&self, dir: &Path) -> OwnedMutexGuard<OutputAllocator> {
        let allocator = {
            let mut allocators = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            allocators
                .entry(dir.to_path_buf())
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(OutputAllocator::new(dir))))
                .clone()
        };
        allocator.lock_owned().await
    }
}
