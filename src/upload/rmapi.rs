//! [`DeliveryClient`] backed by the `rmapi` command-line tool.
//!
//! Every operation is one bounded subprocess invocation. The child is killed
//! if its timeout elapses. Diagnostics are taken from stderr, falling back to
//! stdout.

use std::collections::HashSet;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::Output;
use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::config::DeliveryConfig;
use crate::contract::DeliveryClient;
use crate::error::DeliveryError;

static LISTING_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\[(?:f|d)\]\s+(.*)$").expect("valid listing regex"));

#[derive(Debug, Clone)]
pub struct RmapiClient {
    program: PathBuf,
    credentials_file: Option<PathBuf>,
    command_timeout: Duration,
    upload_timeout: Duration,
}

impl RmapiClient {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            credentials_file: None,
            command_timeout: Duration::from_secs(30),
            upload_timeout: Duration::from_secs(120),
        }
    }

    pub fn from_config(config: &DeliveryConfig) -> Self {
        Self {
            program: config.rmapi_path.clone(),
            credentials_file: config.credentials_file.clone(),
            command_timeout: config.command_timeout,
            upload_timeout: config.upload_timeout,
        }
    }

    pub fn with_timeouts(mut self, command_timeout: Duration, upload_timeout: Duration) -> Self {
        self.command_timeout = command_timeout;
        self.upload_timeout = upload_timeout;
        self
    }

    async fn invoke(
        &self,
        operation: &str,
        args: &[&OsStr],
        timeout: Duration,
    ) -> Result<Output, DeliveryError> {
        let mut command = Command::new(&self.program);
        command.args(args).kill_on_drop(true);
        if let Some(credentials) = &self.credentials_file {
            command.env("RMAPI_CONFIG", credentials);
        }
        debug!(program = %self.program.display(), operation, "Invoking delivery tool");

        let output = tokio::time::timeout(timeout, command.output())
            .await
            .map_err(|_| DeliveryError::Timeout {
                operation: operation.to_string(),
                timeout,
            })?
            .map_err(|source| DeliveryError::Spawn {
                program: self.program.display().to_string(),
                source,
            })?;
        Ok(output)
    }

    async fn run(
        &self,
        operation: &str,
        args: &[&OsStr],
        timeout: Duration,
    ) -> Result<String, DeliveryError> {
        let output = self.invoke(operation, args, timeout).await?;
        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).into_owned())
        } else {
            Err(failure(operation, &output))
        }
    }
}

fn failure(operation: &str, output: &Output) -> DeliveryError {
    DeliveryError::Failed {
        operation: operation.to_string(),
        status: output.status.to_string(),
        diagnostic: diagnostic(output),
    }
}

fn diagnostic(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let text = if stderr.trim().is_empty() {
        String::from_utf8_lossy(&output.stdout)
    } else {
        stderr
    };
    text.trim().to_string()
}

/// Entry names from `rmapi ls` output (`[f]\tname` / `[d]\tname`).
pub fn parse_listing(stdout: &str) -> HashSet<String> {
    stdout
        .lines()
        .filter_map(|line| LISTING_LINE.captures(line.trim_end()))
        .filter_map(|caps| caps.get(1).map(|m| m.as_str().to_string()))
        .filter(|name| !name.is_empty())
        .collect()
}

#[async_trait]
impl DeliveryClient for RmapiClient {
    async fn ensure_folder(&self, folder: &str) -> Result<(), DeliveryError> {
        if self
            .invoke("ls", &[OsStr::new("ls"), OsStr::new(folder)], self.command_timeout)
            .await?
            .status
            .success()
        {
            debug!(folder, "Remote folder already exists");
            return Ok(());
        }

        let output = self
            .invoke("mkdir", &[OsStr::new("mkdir"), OsStr::new(folder)], self.command_timeout)
            .await?;
        if output.status.success() {
            info!(folder, "Created remote folder");
            return Ok(());
        }
        let diagnostic = diagnostic(&output);
        if diagnostic.to_lowercase().contains("already exists") {
            debug!(folder, "Remote folder already exists");
            return Ok(());
        }
        warn!(folder, %diagnostic, "Failed to create remote folder");
        Err(failure("mkdir", &output))
    }

    async fn list_folder(&self, folder: &str) -> Result<HashSet<String>, DeliveryError> {
        let stdout = self
            .run("ls", &[OsStr::new("ls"), OsStr::new(folder)], self.command_timeout)
            .await?;
        Ok(parse_listing(&stdout))
    }

    async fn upload(&self, local_path: &Path, folder: &str) -> Result<(), DeliveryError> {
        self.run(
            "put",
            &[OsStr::new("put"), local_path.as_os_str(), OsStr::new(folder)],
            self.upload_timeout,
        )
        .await?;
        Ok(())
    }

    async fn version(&self) -> Result<String, DeliveryError> {
        let stdout = self
            .run("version", &[OsStr::new("version")], self.command_timeout)
            .await?;
        Ok(stdout.trim().to_string())
    }
}
