//! Error taxonomy of the pipeline.
//!
//! Feed-scoped errors ([`FetchError`], [`ParseError`]) abort a single feed,
//! entry-scoped errors ([`RenderError`], [`DeliveryError`]) abort a single
//! entry, and [`ConfigError`] is the only kind that stops a run before any
//! feed is processed.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors retrieving a feed document over HTTP.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// HTTP response with non-2xx status code
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),
    #[error("Response larger than {0} bytes")]
    ResponseTooLarge(usize),
}

/// The feed document could not be parsed as Atom, RSS or JSON Feed.
#[derive(Debug, Error)]
#[error("Malformed feed document: {0}")]
pub struct ParseError(pub String);

/// Feed-scoped failure: either the retrieval or the parse failed.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Parse(#[from] ParseError),
}

impl FeedError {
    /// Only retrieval failures are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, FeedError::Fetch(_))
    }
}

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Template error: {0}")]
    Template(String),
    #[error("Stylesheet error: {0}")]
    Stylesheet(String),
    #[error("PDF generation failed: {0}")]
    Pdf(String),
}

/// Failure of a single delivery tool invocation. The message always carries
/// the diagnostic text the tool printed.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("Failed to launch {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{operation} timed out after {timeout:?}")]
    Timeout { operation: String, timeout: Duration },
    #[error("{operation} failed ({status}): {diagnostic}")]
    Failed {
        operation: String,
        status: String,
        diagnostic: String,
    },
    #[error("Remote folder {folder} unavailable: {diagnostic}")]
    FolderUnavailable { folder: String, diagnostic: String },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("No delivery credential file configured (set RMAPI_CONFIG or run with --render-only)")]
    NoCredential,
    #[error("Delivery credential file not found: {}", .0.display())]
    MissingCredential(PathBuf),
    #[error("Delivery tool unavailable: {0}")]
    ToolUnavailable(#[source] DeliveryError),
    #[error("Invalid value for {key}: {value:?}")]
    Invalid { key: String, value: String },
    #[error("Failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse config YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
}
