//! Tracing setup: human-readable events on stdout, optionally mirrored to a
//! daily file in the log directory.

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

/// `{log_dir}/atom_processor_YYYYMMDD.log`.
pub fn log_file_path(log_dir: &Path, now: DateTime<Utc>) -> PathBuf {
    log_dir.join(format!("atom_processor_{}.log", now.format("%Y%m%d")))
}

fn filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

fn open_log_file(log_dir: &Path, now: DateTime<Utc>) -> Result<File> {
    fs::create_dir_all(log_dir)
        .with_context(|| format!("Failed to create log directory {}", log_dir.display()))?;
    let path = log_file_path(log_dir, now);
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("Failed to open log file {}", path.display()))
}

/// Install the global subscriber. `RUST_LOG` overrides the default `info`
/// level. Fails if a subscriber is already installed.
pub fn init(log_dir: Option<&Path>) -> Result<()> {
    let Some(log_dir) = log_dir else {
        return tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stdout)
                    .with_target(false),
            )
            .with(filter())
            .try_init()
            .context("Failed to install tracing subscriber");
    };

    let log_file = Arc::new(open_log_file(log_dir, Utc::now())?);
    let writer = std::io::stdout.and(log_file);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(false),
        )
        .with(filter())
        .try_init()
        .context("Failed to install tracing subscriber")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn daily_file_name() {
        let now = Utc.with_ymd_and_hms(2025, 7, 28, 23, 59, 0).unwrap();
        assert_eq!(
            log_file_path(Path::new("logs"), now),
            PathBuf::from("logs/atom_processor_20250728.log")
        );
    }

    #[test]
    fn log_file_is_created_and_appended() {
        let dir = tempfile::tempdir().unwrap();
        let logs = dir.path().join("nested/logs");
        let now = Utc.with_ymd_and_hms(2025, 7, 28, 8, 0, 0).unwrap();
        open_log_file(&logs, now).unwrap();
        assert!(log_file_path(&logs, now).is_file());
        open_log_file(&logs, now).unwrap();
    }
}
