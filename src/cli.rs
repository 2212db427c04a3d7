use std::path::PathBuf;

use anyhow::Result;
use chrono::Utc;
use clap::{Args, Parser, Subcommand};

use crate::config::RunConfig;
use crate::download::{load_feed_list, HttpFeedSource};
use crate::load_config::load_config;
use crate::synchronise::Synchroniser;
use crate::upload::RmapiClient;

/// CLI for atom2remarkable: recent feed entries as PDFs on a reMarkable.
#[derive(Parser, Debug)]
#[clap(
    name = "atom2remarkable",
    version,
    about = "Fetch recent Atom/RSS entries, render them as PDFs and upload them to reMarkable Cloud"
)]
pub struct Cli {
    /// Path to an optional YAML config file
    #[clap(long, global = true)]
    pub config: Option<PathBuf>,

    /// Also write logs to a daily file in this directory
    #[clap(long, global = true, env = "LOG_DIR")]
    pub log_dir: Option<PathBuf>,

    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Process every configured feed once
    Run(RunArgs),
    /// Verify the delivery credential and the rmapi tool, then exit
    Check,
}

#[derive(Args, Debug, Default, Clone)]
pub struct RunArgs {
    /// File with one feed URL per line
    #[clap(long)]
    pub feeds_file: Option<PathBuf>,
    /// Directory that receives the rendered PDFs
    #[clap(long)]
    pub output_dir: Option<PathBuf>,
    /// Only entries published within this many hours are processed
    #[clap(long, value_parser = clap::value_parser!(u32).range(1..))]
    pub recent_hours: Option<u32>,
    /// Root folder in reMarkable Cloud
    #[clap(long)]
    pub remarkable_folder: Option<String>,
    /// Path to the rmapi executable
    #[clap(long)]
    pub rmapi_path: Option<PathBuf>,
    /// Render PDFs locally without uploading
    #[clap(long)]
    pub render_only: bool,
}

impl RunArgs {
    pub fn apply(&self, config: &mut RunConfig) {
        if let Some(v) = &self.feeds_file {
            config.feeds_file = v.clone();
        }
        if let Some(v) = &self.output_dir {
            config.output_dir = v.clone();
        }
        if let Some(v) = self.recent_hours {
            config.recent_hours = v;
        }
        if let Some(v) = &self.remarkable_folder {
            config.delivery.remote_folder = v.clone();
        }
        if let Some(v) = &self.rmapi_path {
            config.delivery.rmapi_path = v.clone();
        }
        if self.render_only {
            config.delivery.render_only = true;
        }
    }
}

/// File, environment and flag layers merged into one [`RunConfig`].
pub fn resolve_config(cli: &Cli) -> Result<RunConfig> {
    let mut config = load_config(cli.config.as_deref())?;
    if let Commands::Run(args) = &cli.command {
        args.apply(&mut config);
    }
    Ok(config)
}

/// Execute the parsed command and return the process exit status.
/// Startup failures surface as `Err`; the caller exits with status 1.
pub async fn run(cli: Cli, config: RunConfig) -> Result<i32> {
    match cli.command {
        Commands::Check => {
            let delivery = RmapiClient::from_config(&config.delivery);
            let source = HttpFeedSource::new(config.request_timeout)?;
            let sync = Synchroniser::new(config, source, Some(delivery));
            let version = sync.preflight().await?.unwrap_or_default();
            println!("rmapi available: {version}");
            Ok(0)
        }
        Commands::Run(_) => {
            let now = Utc::now();
            let feeds = load_feed_list(&config.feeds_file);
            let source = HttpFeedSource::new(config.request_timeout)?;
            let delivery = (!config.delivery.render_only)
                .then(|| RmapiClient::from_config(&config.delivery));
            let sync = Synchroniser::new(config, source, delivery);
            sync.preflight().await?;

            println!("Synchronise starting ({} feeds)...", feeds.len());
            let summary = sync.synchronise(&feeds, now).await;
            println!(
                "Synchronise complete: {} succeeded, {} failed, {} total",
                summary.succeeded, summary.failed, summary.total
            );
            Ok(summary.exit_code())
        }
    }
}
