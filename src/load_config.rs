use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use anyhow::Result;
use serde::Deserialize;
use tracing::{debug, error, info};

use crate::config::RunConfig;
use crate::error::ConfigError;
use crate::recency::UndatedPolicy;

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileConfig {
    feeds_file: Option<PathBuf>,
    output_dir: Option<PathBuf>,
    recent_hours: Option<u32>,
    request_timeout_secs: Option<u64>,
    undated_policy: Option<UndatedPolicy>,
    feed_concurrency: Option<usize>,
    retry_attempts: Option<u32>,
    render: RenderSection,
    delivery: DeliverySection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RenderSection {
    max_image_width: Option<u32>,
    font_size: Option<u32>,
    template_file: Option<PathBuf>,
    css_file: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct DeliverySection {
    remote_folder: Option<String>,
    rmapi_path: Option<PathBuf>,
    credentials_file: Option<PathBuf>,
    render_only: Option<bool>,
    command_timeout_secs: Option<u64>,
    upload_timeout_secs: Option<u64>,
}

/// Build the run configuration: defaults, then the optional YAML file, then
/// environment variables. CLI flags are applied on top by the caller.
pub fn load_config(path: Option<&Path>) -> Result<RunConfig> {
    let mut config = RunConfig::default();

    if let Some(path) = path {
        info!(config_path = %path.display(), "Loading configuration from file");
        let content = fs::read_to_string(path).map_err(|source| {
            error!(error = %source, config_path = %path.display(), "Failed to read config file");
            ConfigError::Io {
                path: path.to_path_buf(),
                source,
            }
        })?;
        let file: FileConfig = if content.trim().is_empty() {
            FileConfig::default()
        } else {
            serde_yaml::from_str(&content).map_err(|e| {
                error!(error = %e, config_path = %path.display(), "Failed to parse config YAML");
                ConfigError::from(e)
            })?
        };
        apply_file(&mut config, file)?;
    }

    apply_env(&mut config, |key| std::env::var(key).ok())?;
    if config.delivery.credentials_file.is_none() {
        config.delivery.credentials_file = default_credentials_file(|key| std::env::var(key).ok());
    }

    info!(
        feeds_file = %config.feeds_file.display(),
        output_dir = %config.output_dir.display(),
        "Config loaded and merged successfully"
    );
    Ok(config)
}

fn apply_file(config: &mut RunConfig, file: FileConfig) -> Result<(), ConfigError> {
    if let Some(v) = file.feeds_file {
        config.feeds_file = v;
    }
    if let Some(v) = file.output_dir {
        config.output_dir = v;
    }
    if let Some(v) = file.recent_hours {
        config.recent_hours = positive("recent_hours", v)?;
    }
    if let Some(v) = file.request_timeout_secs {
        config.request_timeout = Duration::from_secs(positive("request_timeout_secs", v)?);
    }
    if let Some(v) = file.undated_policy {
        config.undated_policy = v;
    }
    if let Some(v) = file.feed_concurrency {
        config.feed_concurrency = positive("feed_concurrency", v)?;
    }
    if let Some(v) = file.retry_attempts {
        config.retry_attempts = positive("retry_attempts", v)?;
    }

    let render = file.render;
    if let Some(v) = render.max_image_width {
        config.render.max_image_width = positive("render.max_image_width", v)?;
    }
    if let Some(v) = render.font_size {
        config.render.font_size = positive("render.font_size", v)?;
    }
    if render.template_file.is_some() {
        config.render.template_file = render.template_file;
    }
    if render.css_file.is_some() {
        config.render.css_file = render.css_file;
    }

    let delivery = file.delivery;
    if let Some(v) = delivery.remote_folder {
        config.delivery.remote_folder = v;
    }
    if let Some(v) = delivery.rmapi_path {
        config.delivery.rmapi_path = v;
    }
    if delivery.credentials_file.is_some() {
        config.delivery.credentials_file = delivery.credentials_file;
    }
    if let Some(v) = delivery.render_only {
        config.delivery.render_only = v;
    }
    if let Some(v) = delivery.command_timeout_secs {
        config.delivery.command_timeout =
            Duration::from_secs(positive("delivery.command_timeout_secs", v)?);
    }
    if let Some(v) = delivery.upload_timeout_secs {
        config.delivery.upload_timeout =
            Duration::from_secs(positive("delivery.upload_timeout_secs", v)?);
    }
    Ok(())
}

/// Apply the documented environment overrides. `lookup` returns the value of
/// a variable, or `None` when it is unset.
pub fn apply_env(
    config: &mut RunConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<(), ConfigError> {
    let var = |key: &str| {
        lookup(key).filter(|v| !v.trim().is_empty()).map(|v| {
            debug!(key, "Environment override");
            v.trim().to_string()
        })
    };

    if let Some(v) = var("FEEDS_FILE") {
        config.feeds_file = v.into();
    }
    if let Some(v) = var("OUTPUT_DIR") {
        config.output_dir = v.into();
    }
    if let Some(v) = var("RECENT_HOURS") {
        config.recent_hours = positive("RECENT_HOURS", parse("RECENT_HOURS", &v)?)?;
    }
    if let Some(v) = var("REQUEST_TIMEOUT") {
        let secs: u64 = positive("REQUEST_TIMEOUT", parse("REQUEST_TIMEOUT", &v)?)?;
        config.request_timeout = Duration::from_secs(secs);
    }
    if let Some(v) = var("MAX_IMAGE_WIDTH") {
        config.render.max_image_width = positive("MAX_IMAGE_WIDTH", parse("MAX_IMAGE_WIDTH", &v)?)?;
    }
    if let Some(v) = var("PDF_FONT_SIZE") {
        config.render.font_size = positive("PDF_FONT_SIZE", parse("PDF_FONT_SIZE", &v)?)?;
    }
    if let Some(v) = var("TEMPLATE_FILE") {
        config.render.template_file = Some(v.into());
    }
    if let Some(v) = var("CSS_FILE") {
        config.render.css_file = Some(v.into());
    }
    if let Some(v) = var("REMARKABLE_FOLDER") {
        config.delivery.remote_folder = v;
    }
    if let Some(v) = var("RMAPI_PATH") {
        config.delivery.rmapi_path = v.into();
    }
    if let Some(v) = var("RMAPI_CONFIG") {
        config.delivery.credentials_file = Some(v.into());
    }
    if let Some(v) = var("RENDER_ONLY") {
        config.delivery.render_only = parse_bool("RENDER_ONLY", &v)?;
    }
    if let Some(v) = var("FEED_CONCURRENCY") {
        config.feed_concurrency = positive("FEED_CONCURRENCY", parse("FEED_CONCURRENCY", &v)?)?;
    }
    if let Some(v) = var("RETRY_ATTEMPTS") {
        config.retry_attempts = positive("RETRY_ATTEMPTS", parse("RETRY_ATTEMPTS", &v)?)?;
    }
    if let Some(v) = var("INCLUDE_UNDATED") {
        config.undated_policy = if parse_bool("INCLUDE_UNDATED", &v)? {
            UndatedPolicy::AssumeRunStart
        } else {
            UndatedPolicy::Exclude
        };
    }
    Ok(())
}

/// Where rmapi keeps its token when nothing is configured:
/// `$XDG_CONFIG_HOME/rmapi/rmapi.conf`, else `$HOME/.config/rmapi/rmapi.conf`.
pub fn default_credentials_file(lookup: impl Fn(&str) -> Option<String>) -> Option<PathBuf> {
    let non_empty = |key: &str| lookup(key).filter(|v| !v.is_empty());
    if let Some(xdg) = non_empty("XDG_CONFIG_HOME") {
        return Some(PathBuf::from(xdg).join("rmapi").join("rmapi.conf"));
    }
    non_empty("HOME").map(|home| {
        PathBuf::from(home)
            .join(".config")
            .join("rmapi")
            .join("rmapi.conf")
    })
}

fn parse<T: FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| invalid(key, value))
}

fn positive<T: PartialOrd + Default + ToString>(key: &str, value: T) -> Result<T, ConfigError> {
    if value > T::default() {
        Ok(value)
    } else {
        Err(invalid(key, &value.to_string()))
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(invalid(key, value)),
    }
}

fn invalid(key: &str, value: &str) -> ConfigError {
    error!(key, value, "Invalid configuration value");
    ConfigError::Invalid {
        key: key.to_string(),
        value: value.to_string(),
    }
}
