//! Recency filter: keeps entries published inside the look-back window.
//!
//! The filter is pure. `now` is supplied by the caller so the window can be
//! evaluated against a fixed run start.

use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use tracing::debug;

use crate::contract::{Entry, RecentEntry};

/// What to do with entries that carry no publication (or update) timestamp.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UndatedPolicy {
    /// Drop undated entries.
    #[default]
    Exclude,
    /// Keep undated entries, stamped with the run start.
    AssumeRunStart,
}

/// Retain entries with `published_at >= now - window`.
pub fn filter_recent(
    entries: Vec<Entry>,
    now: DateTime<Utc>,
    window: Duration,
    policy: UndatedPolicy,
) -> Vec<RecentEntry> {
    let cutoff = now - window;
    entries
        .into_iter()
        .filter_map(|entry| {
            let published_at = match (entry.published_at, policy) {
                (Some(at), _) => at,
                (None, UndatedPolicy::AssumeRunStart) => now,
                (None, UndatedPolicy::Exclude) => {
                    debug!(title = %entry.title, "No published date found for entry, skipping");
                    return None;
                }
            };
            (published_at >= cutoff).then_some(RecentEntry {
                entry,
                published_at,
            })
        })
        .collect()
}
