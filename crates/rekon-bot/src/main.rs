//! Order book reconciliation bot - entry point.

use anyhow::Result;
use clap::Parser;
use tracing::info;

/// Keeps venue order books in line with what each strategy wants.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path (can also be set via REKON_CONFIG env var)
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    rekon_telemetry::init_logging()?;

    info!("Starting rekon v{}", env!("CARGO_PKG_VERSION"));

    let config_path = rekon_bot::AppConfig::resolve_path(args.config);
    info!(config_path = %config_path, "Loading configuration");

    let config = rekon_bot::AppConfig::from_file(&config_path)?;
    info!(
        accounts = config.accounts.len(),
        strategies = config.strategies.len(),
        "Configuration loaded"
    );

    let app = rekon_bot::Application::new(config)?;
    app.run().await?;

    Ok(())
}
