use atom2remarkable::cli::{resolve_config, run, Cli};
use atom2remarkable::logging;
use clap::Parser;

#[tokio::main]
async fn main() {
    // Load environment
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    if let Err(e) = logging::init(cli.log_dir.as_deref()) {
        eprintln!("[ERROR] Logging setup failed: {e:#}");
        std::process::exit(1);
    }
    tracing::info!("CLI application startup: tracing initialised, environment loaded");

    let config = match resolve_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("[ERROR] Configuration failed: {e:#}");
            std::process::exit(1);
        }
    };
    config.trace_loaded();

    let code = match run(cli, config).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %e, "CLI exited with error");
            eprintln!("[ERROR] {e:#}");
            1
        }
    };
    tracing::info!(exit_code = code, "CLI completed");
    std::process::exit(code);
}
