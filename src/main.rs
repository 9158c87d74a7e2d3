//! idxmngr API Server
//!
//! Run with: cargo run --bin idxmngr -- --config idxmngr.toml
//!
//! # Configuration
//!
//! Without `--config` the server looks in the user config directory,
//! `/etc/idxmngr/config.toml` and `./idxmngr.toml`, then falls back to
//! defaults. Environment variables override the file:
//! - `IDXMNGR_DATA_DIR`: Data directory (default: ./data)
//! - `IDXMNGR_API_HOST`: Host to bind to (default: 0.0.0.0)
//! - `IDXMNGR_API_PORT`: Port to listen on (default: 8083)
//! - `IDXMNGR_OPERATION_TIMEOUT_MS`: Per-operation deadline
//! - `IDXMNGR_LOG_LEVEL`, `IDXMNGR_LOG_FORMAT`: Logging
//! - `RUST_LOG`: Full filter directive, wins over the configured level

use anyhow::Context;
use clap::Parser;
use idxmngr::api::{serve, ApiConfig, AppState};
use idxmngr::config::{Config, LoggingConfig};
use idxmngr::service::IndexService;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{
    layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry,
};

#[derive(Parser)]
#[command(name = "idxmngr")]
#[command(about = "External index manager for blockchain transaction data", long_about = None)]
#[command(version)]
struct Args {
    /// Config file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the data directory
    #[arg(long)]
    data_dir: Option<String>,

    /// Override the listen port
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::load_with_env(path)?,
        None => Config::load_default(),
    };
    if let Some(data_dir) = args.data_dir {
        config.storage.data_dir = data_dir;
    }
    if let Some(port) = args.port {
        config.api.port = port;
    }

    init_logging(&config.logging)?;

    tracing::info!("Starting idxmngr v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        data_dir = %config.storage.data_dir,
        sync_mode = ?config.storage.sync_mode,
        "Storage configured"
    );

    let encoder = config.key_encoder().context("invalid key schema in config")?;
    tracing::info!(schemas = ?encoder.names(), "Key schemas registered");

    let service = Arc::new(
        IndexService::open(
            config.service_config().context("invalid filter in config")?,
            encoder,
        )
            .context("failed to open index service")?,
    );
    let (total, unavailable) = service.health().await;
    tracing::info!(indexes = total, unavailable, "Index service opened");

    let flush_handle = service.start_background_flush();

    let api_config = ApiConfig::from(&config.api);
    let state = AppState::new(Arc::clone(&service), api_config.clone());
    serve(state, &api_config).await?;

    tracing::info!("Flushing index counters...");
    service.shutdown().await?;
    flush_handle.abort();

    tracing::info!("idxmngr stopped");
    Ok(())
}

fn init_logging(config: &LoggingConfig) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "idxmngr={level},tower_http={level}",
            level = config.level
        ))
    });

    let (writer, ansi) = match &config.file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("failed to open log file {}", path))?;
            (BoxMakeWriter::new(Mutex::new(file)), false)
        }
        None => (BoxMakeWriter::new(std::io::stdout), true),
    };

    let fmt_layer: Box<dyn Layer<Registry> + Send + Sync> = match config.format.as_str() {
        "json" => tracing_subscriber::fmt::layer()
            .json()
            .with_writer(writer)
            .boxed(),
        "compact" => tracing_subscriber::fmt::layer()
            .compact()
            .with_ansi(ansi)
            .with_writer(writer)
            .boxed(),
        _ => tracing_subscriber::fmt::layer()
            .pretty()
            .with_ansi(ansi)
            .with_writer(writer)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(filter)
        .init();

    Ok(())
}
