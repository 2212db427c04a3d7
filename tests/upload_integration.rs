//! Exercises `RmapiClient` against a shell script standing in for `rmapi`.
//! The script keeps its "cloud" as directories under a temp state dir.
#![cfg(unix)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use atom2remarkable::config::RunConfig;
use atom2remarkable::contract::{DeliveryClient, DeliveryStatus, Entry, Feed, MockFeedSource, ParsedFeed};
use atom2remarkable::error::DeliveryError;
use atom2remarkable::synchronise::Synchroniser;
use atom2remarkable::upload::RmapiClient;
use chrono::{TimeZone, Utc};
use tempfile::{tempdir, TempDir};

const FAKE_RMAPI: &str = r#"#!/bin/sh
STATE="__STATE__"
echo "$@" >> "$STATE/calls.log"
case "$1" in
  version)
    echo "ReMarkable Cloud API Shell, version 0.0.25"
    echo "config=$RMAPI_CONFIG" >> "$STATE/calls.log"
    ;;
  ls)
    if [ ! -d "$STATE/remote/$2" ]; then
      echo "Error: directory doesn't exist" >&2
      exit 1
    fi
    for f in "$STATE/remote/$2"/*; do
      [ -e "$f" ] || continue
      if [ -d "$f" ]; then printf '[d]\t%s\n' "$(basename "$f")"; else printf '[f]\t%s\n' "$(basename "$f")"; fi
    done
    ;;
  mkdir)
    if [ -d "$STATE/remote/$2" ]; then
      echo "Error: entry already exists" >&2
      exit 1
    fi
    mkdir -p "$STATE/remote/$2"
    ;;
  put)
    if [ ! -d "$STATE/remote/$3" ]; then
      echo "Error: directory doesn't exist" >&2
      exit 1
    fi
    : > "$STATE/remote/$3/$(basename "$2" .pdf)"
    ;;
  *)
    echo "unknown command $1" >&2
    exit 2
    ;;
esac
"#;

struct FakeRmapi {
    state: TempDir,
    program: PathBuf,
}

impl FakeRmapi {
    fn install(script: &str) -> Self {
        let state = tempdir().unwrap();
        fs::create_dir_all(state.path().join("remote")).unwrap();
        let program = state.path().join("rmapi");
        fs::write(&program, script.replace("__STATE__", &state.path().display().to_string())).unwrap();
        fs::set_permissions(&program, fs::Permissions::from_mode(0o755)).unwrap();
        Self { state, program }
    }

    fn new() -> Self {
        Self::install(FAKE_RMAPI)
    }

    fn client(&self) -> RmapiClient {
        RmapiClient::new(&self.program)
    }

    fn remote(&self, folder: &str) -> PathBuf {
        self.state.path().join("remote").join(folder)
    }

    fn calls(&self) -> String {
        fs::read_to_string(self.state.path().join("calls.log")).unwrap_or_default()
    }
}

fn local_pdf(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, b"%PDF-1.3\n").unwrap();
    path
}

#[tokio::test]
async fn version_passes_credential_file() {
    let fake = FakeRmapi::new();
    let mut delivery = RunConfig::default().delivery;
    delivery.rmapi_path = fake.program.clone();
    delivery.credentials_file = Some(PathBuf::from("/tmp/token/rmapi.conf"));

    let version = RmapiClient::from_config(&delivery).version().await.unwrap();
    assert!(version.contains("0.0.25"));
    assert!(fake.calls().contains("config=/tmp/token/rmapi.conf"));
}

#[tokio::test]
async fn folders_are_created_once_and_listed() {
    let fake = FakeRmapi::new();
    let client = fake.client();

    client.ensure_folder("AtomFeeds").await.unwrap();
    client.ensure_folder("AtomFeeds/Real Python").await.unwrap();
    client.ensure_folder("AtomFeeds/Real Python").await.unwrap();
    assert!(fake.remote("AtomFeeds/Real Python").is_dir());
    assert_eq!(fake.calls().matches("mkdir").count(), 2);

    let local = tempdir().unwrap();
    let pdf = local_pdf(local.path(), "07-28-2025 Intro.pdf");
    client.upload(&pdf, "AtomFeeds/Real Python").await.unwrap();

    let listing = client.list_folder("AtomFeeds/Real Python").await.unwrap();
    assert!(listing.contains("07-28-2025 Intro"));
    let root = client.list_folder("AtomFeeds").await.unwrap();
    assert!(root.contains("Real Python"));
}

#[tokio::test]
async fn tool_errors_carry_diagnostics() {
    let fake = FakeRmapi::new();
    let local = tempdir().unwrap();
    let pdf = local_pdf(local.path(), "a.pdf");

    let err = fake.client().upload(&pdf, "Missing").await.unwrap_err();
    match err {
        DeliveryError::Failed { operation, diagnostic, .. } => {
            assert_eq!(operation, "put");
            assert!(diagnostic.contains("directory doesn't exist"));
        }
        other => panic!("unexpected error: {other:?}"),
    }

    let err = fake.client().list_folder("Missing").await.unwrap_err();
    assert!(err.to_string().contains("directory doesn't exist"));
}

#[tokio::test]
async fn slow_upload_times_out() {
    let fake = FakeRmapi::install("#!/bin/sh\nsleep 5\n");
    let client = fake
        .client()
        .with_timeouts(Duration::from_millis(200), Duration::from_millis(200));
    let local = tempdir().unwrap();
    let pdf = local_pdf(local.path(), "slow.pdf");

    let started = std::time::Instant::now();
    let err = client.upload(&pdf, "AtomFeeds").await.unwrap_err();
    assert!(matches!(err, DeliveryError::Timeout { .. }), "got {err:?}");
    assert!(started.elapsed() < Duration::from_secs(4));
}

#[tokio::test]
async fn pipeline_delivers_through_rmapi() {
    let fake = FakeRmapi::new();
    let out = tempdir().unwrap();
    let run_start = Utc.with_ymd_and_hms(2025, 7, 28, 18, 0, 0).unwrap();

    let mut source = MockFeedSource::new();
    source.expect_fetch().returning(move |_| {
        Ok(ParsedFeed {
            display_name: "Real Python".into(),
            entries: vec![Entry {
                feed_title: "Real Python".into(),
                title: "Intro".into(),
                author: "Real Python".into(),
                published_at: Some(run_start - chrono::Duration::hours(2)),
                link: None,
                raw_content: "<p>Hello</p>".into(),
            }],
        })
    });

    let config = RunConfig {
        output_dir: out.path().to_path_buf(),
        ..RunConfig::default()
    };
    let sync = Synchroniser::new(config, source, Some(fake.client()));
    let summary = sync
        .synchronise(&[Feed::new("https://realpython.com/atom.xml")], run_start)
        .await;

    assert_eq!(summary.outcomes[0].status, DeliveryStatus::Delivered);
    assert!(fake.remote("AtomFeeds/Real Python/07-28-2025 Intro").is_file());
    assert_eq!(summary.exit_code(), 0);
}
