//! iris-train - Main Entry Point

use clap::Parser;
use iris_train::cli::{cmd_train, Cli};
use iris_train::config::TrackingConfig;

fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "iris_train=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let tracking = TrackingConfig::from_env()?;

    cmd_train(&cli, tracking)?;

    Ok(())
}
