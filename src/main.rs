use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

use innledger::config::Config;
use innledger::engine::Ledger;
use innledger::http::{self, AppState};
use innledger::notify::NotifyHub;
use innledger::{observability, reaper};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env()?;
    observability::init(config.metrics_port)?;

    std::fs::create_dir_all(&config.data_dir)?;
    let ledger = Arc::new(Ledger::with_pricing(
        config.wal_path(),
        Arc::new(NotifyHub::new()),
        config.pricing,
    )?);

    if config.pending_ttl.is_zero() {
        info!("pending booking expiry disabled");
    } else {
        tokio::spawn(reaper::run_expirer(ledger.clone(), config.pending_ttl));
    }
    tokio::spawn(reaper::run_compactor(ledger.clone(), config.compact_threshold));

    let app = http::router(AppState { ledger }, config.max_connections);

    let addr = SocketAddr::new(config.bind, config.port);
    let listener = TcpListener::bind(addr).await?;
    info!("innledger listening on {addr}");
    info!("  data_dir: {}", config.data_dir.display());
    info!("  max_connections: {}", config.max_connections);
    info!(
        "  metrics: {}",
        config
            .metrics_port
            .map_or("disabled".to_string(), |p| format!("http://0.0.0.0:{p}/metrics"))
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("innledger stopped");
    Ok(())
}

/// Resolves on Ctrl-C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to register SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received, draining requests");
}
