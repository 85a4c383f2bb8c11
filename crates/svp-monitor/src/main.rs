//! Spot-vs-perp confluence monitor - Entry Point

use anyhow::Result;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Spot-vs-perp order-flow confluence monitor
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path (can also be set via SVP_CONFIG env var)
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Must run before any WebSocket connection
    svp_feed::init_crypto();

    let args = Args::parse();

    svp_telemetry::init_logging()?;

    info!("Starting svp-monitor v{}", env!("CARGO_PKG_VERSION"));

    // CLI arg > SVP_CONFIG env var > default
    let config_path = args
        .config
        .or_else(|| std::env::var("SVP_CONFIG").ok())
        .unwrap_or_else(|| "config/default.toml".to_string());

    info!(config_path = %config_path, "Loading configuration");
    let config = svp_monitor::AppConfig::from_file(&config_path)?;
    info!(
        asset = %config.asset,
        markets = ?config.market_keys().iter().map(ToString::to_string).collect::<Vec<_>>(),
        "Configuration loaded"
    );

    let app = svp_monitor::Application::new(config)?;

    let shutdown = CancellationToken::new();
    let ctrl_c_token = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Shutdown signal received");
                ctrl_c_token.cancel();
            }
            Err(e) => warn!(error = %e, "Failed to listen for ctrl-c"),
        }
    });

    app.run(shutdown).await?;

    Ok(())
}
