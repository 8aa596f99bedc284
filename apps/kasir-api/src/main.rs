//! # Kasir API Server
//!
//! ## Startup
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  config ──► SQLite (migrations) ──► Redis (optional) ──► AppState      │
//! │                                                              │          │
//! │                      ┌───────────────────────────────────────┤          │
//! │                      ▼                                       ▼          │
//! │               sweep task (interval)                 axum on HTTP_PORT   │
//! │                      ▲                                       │          │
//! │                      └──── watch channel ◄── shutdown signal ┘          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use kasir_api::services::{LogSender, SweepService};
use kasir_api::{build_router, AppConfig, AppState};
use kasir_db::{Database, DbConfig};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // RUST_LOG overrides the defaults
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,kasir_api=debug,kasir_db=debug,sqlx=warn")),
        )
        .with_target(true)
        .init();

    info!("Starting Kasir API server...");

    let config = AppConfig::load().context("failed to load configuration")?;
    info!(
        port = config.http_port,
        db_url = %config.database_url.chars().take(30).collect::<String>(),
        redis = config.redis_url.is_some(),
        "Configuration loaded"
    );

    let db_config =
        DbConfig::from_url(&config.database_url).max_connections(config.database_max_connections);
    let db = Database::new(db_config)
        .await
        .context("failed to open database")?;
    info!("Database ready");

    // Redis only backs webhook idempotency; run without it if unavailable
    let redis = match config.redis_url.as_deref() {
        Some(url) => match redis::Client::open(url) {
            Ok(client) => {
                info!("Redis client configured");
                Some(client)
            }
            Err(e) => {
                warn!(?e, "Invalid Redis URL, continuing without it");
                None
            }
        },
        None => None,
    };

    let state = Arc::new(AppState::new(db.clone(), redis, config.clone()));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweep = SweepService::new(db.clone(), LogSender, &config.frontend_url);
    let sweep_task = tokio::spawn(sweep.run(
        Duration::from_secs(config.sweep_interval_secs),
        shutdown_rx,
    ));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.http_port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!(%addr, "Listening");

    axum::serve(
        listener,
        build_router(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    let _ = shutdown_tx.send(true);
    if let Err(e) = sweep_task.await {
        error!(?e, "Sweep task ended abnormally");
    }
    db.close().await;

    info!("Server shutdown complete");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM. A handler that cannot be installed is
/// logged and never fires.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(?e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(?e, "Failed to install SIGTERM handler");
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

    info!("Shutdown signal received, starting graceful shutdown...");
}
