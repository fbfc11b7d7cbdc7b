//! SurgeKV Server
//!
//! Main entry point for the SurgeKV key-value server.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use surge_common::ServerConfig;
use surge_protocol::server::serve_with_cancel;
use surge_server::{spawn_stats_reporter, RpcSurface};
use surge_txn::KvService;

/// SurgeKV - a sharded, transactional, in-memory key-value store
#[derive(Parser, Debug)]
#[command(name = "surge-server")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/surge.toml")]
    config: PathBuf,

    /// Port to run the server on
    #[arg(short, long)]
    port: Option<u16>,

    /// Override listen address
    #[arg(long)]
    listen: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = ServerConfig::load(&args.config)?;
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(listen) = &args.listen {
        config.listen_addr = listen.clone();
    }
    config.apply_env_overrides();

    let log_level = if args.verbose { "debug" } else { &config.log_level };
    let env_filter = tracing_subscriber::filter::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::filter::EnvFilter::try_new(log_level))
        .unwrap_or_else(|_| tracing_subscriber::filter::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    config.validate()?;

    let listener = TcpListener::bind(config.bind_addr()).await?;
    info!("Starting SurgeKV server on {}", config.bind_addr());

    let service = Arc::new(KvService::new());
    let surface = Arc::new(RpcSurface::new(service.clone()));
    let cancel_token = CancellationToken::new();

    let reporter = spawn_stats_reporter(service.clone(), config.stats_interval(), cancel_token.clone());

    // Graceful shutdown on SIGINT/SIGTERM.
    let shutdown_cancel = cancel_token.clone();
    tokio::spawn(async move {
        let ctrl_c = async {
            tokio::signal::ctrl_c()
                .await
                .expect("Failed to listen for ctrl+c");
        };

        #[cfg(unix)]
        let terminate = async {
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("Failed to listen for SIGTERM")
                .recv()
                .await;
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => info!("Received SIGINT, shutting down..."),
            _ = terminate => info!("Received SIGTERM, shutting down..."),
        }

        shutdown_cancel.cancel();
    });

    serve_with_cancel(listener, surface, config.max_connections, cancel_token).await;
    reporter.await.ok();

    info!("SurgeKV server stopped");
    Ok(())
}
