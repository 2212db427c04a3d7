// atom2remarkable/src/config.rs

use std::path::PathBuf;
use std::time::Duration;

use tracing::{debug, info};

use crate::recency::UndatedPolicy;

pub const DEFAULT_REMOTE_FOLDER: &str = "AtomFeeds";
pub const USER_AGENT: &str = "atom2remarkable/1.0 (Feed to PDF Converter)";

/// Immutable configuration of one run. Built once at startup and passed
/// explicitly to every component that needs it.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub feeds_file: PathBuf,
    pub output_dir: PathBuf,
    pub recent_hours: u32,
    pub request_timeout: Duration,
    pub undated_policy: UndatedPolicy,
    /// Feeds processed at once. 1 keeps the run sequential.
    pub feed_concurrency: usize,
    /// Attempts per fetch/delivery call. 1 disables retries.
    pub retry_attempts: u32,
    pub render: RenderConfig,
    pub delivery: DeliveryConfig,
}

#[derive(Debug, Clone)]
pub struct RenderConfig {
    /// Maximum display width of embedded images, in CSS pixels.
    pub max_image_width: u32,
    /// Base font size, in CSS pixels.
    pub font_size: u32,
    pub template_file: Option<PathBuf>,
    pub css_file: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct DeliveryConfig {
    /// Root folder in reMarkable Cloud; each feed gets a subfolder.
    pub remote_folder: String,
    pub rmapi_path: PathBuf,
    /// rmapi's auth token file. Required unless `render_only`.
    pub credentials_file: Option<PathBuf>,
    pub render_only: bool,
    pub command_timeout: Duration,
    pub upload_timeout: Duration,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            feeds_file: PathBuf::from("feeds.txt"),
            output_dir: PathBuf::from("output"),
            recent_hours: 24,
            request_timeout: Duration::from_secs(30),
            undated_policy: UndatedPolicy::Exclude,
            feed_concurrency: 1,
            retry_attempts: 1,
            render: RenderConfig::default(),
            delivery: DeliveryConfig::default(),
        }
    }
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            max_image_width: 400,
            font_size: 13,
            template_file: None,
            css_file: None,
        }
    }
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            remote_folder: DEFAULT_REMOTE_FOLDER.to_string(),
            rmapi_path: PathBuf::from("rmapi"),
            credentials_file: None,
            render_only: false,
            command_timeout: Duration::from_secs(30),
            upload_timeout: Duration::from_secs(120),
        }
    }
}

impl RunConfig {
    pub fn window(&self) -> chrono::Duration {
        chrono::Duration::hours(i64::from(self.recent_hours))
    }

    pub fn trace_loaded(&self) {
        info!(
            feeds_file = %self.feeds_file.display(),
            output_dir = %self.output_dir.display(),
            recent_hours = self.recent_hours,
            remote_folder = %self.delivery.remote_folder,
            render_only = self.delivery.render_only,
            "Loaded RunConfig"
        );
        debug!(?self, "RunConfig loaded (full debug)");
    }
}
