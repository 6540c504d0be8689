//! Filestream agent entry point.
//!
//! Usage: `filestream-agent [FILE]...`
//!
//! Every file given on the command line is uploaded through the broker,
//! reconstructed from it and verified.

mod app;
mod config;

use std::path::PathBuf;

use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    // Initialize structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        "starting filestream agent"
    );

    let config = config::Config::load()?;
    tracing::info!(
        upload_dir = %config.upload_dir.display(),
        download_dir = %config.download_dir.display(),
        chunk_size = config.chunk_size,
        "configuration loaded"
    );

    let files: Vec<PathBuf> = std::env::args_os().skip(1).map(PathBuf::from).collect();

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(app::run(config, files))?;

    tracing::info!("agent shut down cleanly");
    Ok(())
}
