//! Collision-free local output naming and atomic persistence.
//!
//! Layout: `{output_root}/{feed dir}/{MM-DD-YYYY} {title}[ N].pdf`. Names
//! claimed during a run are tracked in memory so allocations within the run
//! never collide.

use std::collections::HashSet;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::debug;

pub const MAX_TITLE_CHARS: usize = 60;
pub const MAX_FEED_DIR_CHARS: usize = 50;

/// Keep alphanumerics, space, `-` and `_`; trim; truncate to `max_chars`.
pub fn safe_component(raw: &str, max_chars: usize) -> String {
    let kept: String = raw
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, ' ' | '-' | '_'))
        .collect();
    let truncated: String = kept.trim().chars().take(max_chars).collect();
    truncated.trim_end().to_string()
}

pub fn feed_directory_name(display_name: &str) -> String {
    let name = safe_component(display_name, MAX_FEED_DIR_CHARS);
    if name.is_empty() {
        "Unknown Feed".to_string()
    } else {
        name
    }
}

fn safe_title(title: &str) -> String {
    let name = safe_component(title, MAX_TITLE_CHARS);
    if name.is_empty() {
        "Untitled".to_string()
    } else {
        name
    }
}

pub fn date_prefix(published_at: DateTime<Utc>) -> String {
    published_at.format("%m-%d-%Y").to_string()
}

/// `"{MM-DD-YYYY} {title}.pdf"`, before collision resolution.
pub fn proposed_file_name(published_at: DateTime<Utc>, title: &str) -> String {
    format!("{} {}.pdf", date_prefix(published_at), safe_title(title))
}

/// A reserved output path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Allocation {
    pub path: PathBuf,
    /// A file of this name is already on disk from an earlier run.
    pub existing: bool,
}

/// Allocates file names inside one feed directory for one run.
///
/// Only names claimed during the run count as collisions. A file left by an
/// earlier run keeps its name, so the same entry maps to the same document
/// on every run inside the recency window.
#[derive(Debug)]
pub struct OutputAllocator {
    dir: PathBuf,
    claimed: HashSet<String>,
}

impl OutputAllocator {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self::with_claimed(dir, Vec::new())
    }

    /// Allocator with `names` already taken in this run.
    pub fn with_claimed(dir: impl Into<PathBuf>, names: impl IntoIterator<Item = String>) -> Self {
        Self {
            dir: dir.into(),
            claimed: names.into_iter().collect(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Reserve a path for an entry. The candidate `"{date} {title}.pdf"` is
    /// used when unclaimed, otherwise the smallest unclaimed
    /// `"{date} {title} N.pdf"` with `N >= 1`.
    pub fn allocate(&mut self, published_at: DateTime<Utc>, title: &str) -> io::Result<Allocation> {
        let stem = format!("{} {}", date_prefix(published_at), safe_title(title));

        let mut candidate = format!("{stem}.pdf");
        let mut n = 1u32;
        while self.claimed.contains(&candidate) {
            candidate = format!("{stem} {n}.pdf");
            n += 1;
        }
        let path = self.dir.join(&candidate);
        let existing = path.try_exists()?;
        debug!(path = %path.display(), existing, "Allocated output path");
        self.claimed.insert(candidate);
        Ok(Allocation { path, existing })
    }
}

/// Write `bytes` to `path` via a temp file in the same directory and a rename,
/// so a crash never leaves a truncated document behind.
pub fn persist(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let dir = path
        .parent()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "output path has no parent"))?;
    std::fs::create_dir_all(dir)?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn july_28() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 7, 28, 14, 0, 0).unwrap()
    }

    #[test]
    fn strips_unsafe_characters_and_truncates() {
        assert_eq!(safe_component("What's new: Rust 1.80?", 60), "Whats new Rust 180");
        assert_eq!(safe_component("  a/b\\c  ", 60), "abc");
        let long = "x".repeat(100);
        assert_eq!(safe_component(&long, MAX_TITLE_CHARS).chars().count(), 60);
        assert_eq!(feed_directory_name("???"), "Unknown Feed");
        assert_eq!(feed_directory_name("Real Python"), "Real Python");
    }

    #[test]
    fn proposes_date_prefixed_name() {
        assert_eq!(proposed_file_name(july_28(), "Intro"), "07-28-2025 Intro.pdf");
        assert_eq!(proposed_file_name(july_28(), "!!!"), "07-28-2025 Untitled.pdf");
    }

    #[test]
    fn collision_gets_smallest_free_suffix() {
        let dir = tempfile::tempdir().unwrap();
        let mut allocator = OutputAllocator::new(dir.path());
        let first = allocator.allocate(july_28(), "Intro").unwrap();
        let second = allocator.allocate(july_28(), "Intro").unwrap();
        assert_eq!(first.path.file_name().unwrap(), "07-28-2025 Intro.pdf");
        assert_eq!(second.path.file_name().unwrap(), "07-28-2025 Intro 1.pdf");
        assert!(!first.existing && !second.existing);
    }

    #[test]
    fn files_from_earlier_runs_keep_their_names() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("07-28-2025 Intro.pdf"), b"old").unwrap();
        let mut allocator = OutputAllocator::new(dir.path());
        let first = allocator.allocate(july_28(), "Intro").unwrap();
        assert_eq!(first.path.file_name().unwrap(), "07-28-2025 Intro.pdf");
        assert!(first.existing);

        let second = allocator.allocate(july_28(), "Intro").unwrap();
        assert_eq!(second.path.file_name().unwrap(), "07-28-2025 Intro 1.pdf");
        assert!(!second.existing);
    }

    #[test]
    fn gaps_are_filled_first() {
        let mut allocator = OutputAllocator::with_claimed(
            "out",
            ["07-28-2025 Intro.pdf".to_string(), "07-28-2025 Intro 2.pdf".to_string()],
        );
        let allocation = allocator.allocate(july_28(), "Intro").unwrap();
        assert_eq!(allocation.path, Path::new("out").join("07-28-2025 Intro 1.pdf"));
    }

    #[test]
    fn allocations_are_pairwise_distinct() {
        let mut allocator = OutputAllocator::new("out");
        let paths: Vec<_> = (0..25)
            .map(|i| {
                allocator
                    .allocate(july_28(), if i % 2 == 0 { "Intro" } else { "Other" })
                    .unwrap()
                    .path
            })
            .collect();
        let unique: HashSet<_> = paths.iter().collect();
        assert_eq!(unique.len(), paths.len());
    }

    #[test]
    fn missing_directory_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let mut allocator = OutputAllocator::new(dir.path().join("not-yet"));
        let allocation = allocator.allocate(july_28(), "Intro").unwrap();
        assert_eq!(allocation.path.file_name().unwrap(), "07-28-2025 Intro.pdf");
        assert!(!allocation.existing);
    }

    #[test]
    fn persist_creates_directory_and_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Real Python").join("07-28-2025 Intro.pdf");
        persist(&path, b"%PDF-1.3").unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"%PDF-1.3");
        let leftovers = std::fs::read_dir(path.parent().unwrap()).unwrap().count();
        assert_eq!(leftovers, 1);
    }
}
