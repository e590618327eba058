//! Up/down round decision engine - entry point.

use anyhow::Result;
use clap::Parser;
use tracing::info;

/// Paper-trading decision engine for binary up/down rounds
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long, env = "UPDOWN_CONFIG", default_value = "config/default.toml")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Must run before any TLS connection is opened
    updown_feed::init_crypto();

    let args = Args::parse();
    let config = updown_bot::AppConfig::from_file(&args.config)?;

    updown_telemetry::init_logging(&config.telemetry.log_level)?;
    info!(
        config_path = %args.config,
        "Starting updown-bot v{}",
        env!("CARGO_PKG_VERSION")
    );

    let app = updown_bot::Application::new(config)?;
    app.run().await?;

    Ok(())
}
