//! alpha-mirror - Entry Point
//!
//! Read-only monitoring surface over an autonomous futures agent, plus the
//! operator close command.

use anyhow::Result;
use clap::Parser;
use mirror_app::config::DEFAULT_CONFIG_PATH;
use mirror_app::{AppConfig, Application};
use tracing::info;

/// alpha-mirror monitoring surface
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path (can also be set via MIRROR_CONFIG env var)
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // CLI arg > MIRROR_CONFIG env var > default; only the default may be absent
    let explicit = args.config.or_else(|| std::env::var("MIRROR_CONFIG").ok());
    let required = explicit.is_some();
    let config_path = explicit.unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());

    let config = AppConfig::load(&config_path, required)?;

    mirror_telemetry::init_logging(Some(&config.telemetry.log_filter))?;

    info!("Starting alpha-mirror v{}", env!("CARGO_PKG_VERSION"));
    info!(
        config_path = %config_path,
        store = %config.store.base_url,
        dashboard = config.dashboard.enabled,
        port = config.dashboard.port,
        "Configuration loaded"
    );

    let app = Application::new(config)?;
    app.run().await?;

    Ok(())
}
