//! Backup Viewer - browse and download from backup archives over HTTP.

mod config;
mod error;
mod routes;
mod state;
mod watcher;

use crate::config::AppConfig;
use crate::state::AppState;
use anyhow::Result;
use backup_reader::utils;
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (environment variables are used otherwise)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Port to listen on (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration
    let mut config = match &args.config {
        Some(path) => AppConfig::from_file(path)?,
        None => AppConfig::from_env(),
    };
    if let Some(port) = args.port {
        config.port = port;
    }

    // Initialize logging
    let log_level = args.log_level.as_deref().unwrap_or(&config.log_level);
    utils::logger::init(log_level)?;

    tracing::info!(
        "Starting backup-viewer v{} (backups: {})",
        env!("CARGO_PKG_VERSION"),
        config.reader.backup_dir.display()
    );
    if config.reader.passwords.is_empty() {
        tracing::warn!("No backup password configured; protected archives cannot be opened");
    }

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let state = Arc::new(AppState::new(config)?);

    // Warm the cache so the first request does not pay for the scan
    let warm_state = state.clone();
    tokio::task::spawn_blocking(move || {
        if let Err(e) = warm_state.backups.list_tree() {
            tracing::warn!("Initial backup scan failed: {}", e);
        }
    });

    let cancel = CancellationToken::new();
    let watcher = match watcher::spawn(state.clone(), cancel.clone()) {
        Ok(handle) => Some(handle),
        Err(e) => {
            tracing::warn!("File watcher unavailable, tree will not refresh: {}", e);
            None
        }
    };

    let app = routes::create_router(state.clone());
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(cancel.clone()))
        .await?;

    tracing::info!("Shutting down...");
    cancel.cancel();
    if let Some(handle) = watcher {
        if let Err(e) = handle.await {
            tracing::warn!("Watcher task ended abnormally: {}", e);
        }
    }
    tracing::info!("Server stopped");

    Ok(())
}

async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::warn!("Failed to listen for SIGINT: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received SIGINT"),
        _ = terminate => tracing::info!("Received SIGTERM"),
        _ = cancel.cancelled() => {}
    }

    cancel.cancel();
}
