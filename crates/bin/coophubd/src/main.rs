//! `coophubd` — coophub server binary.
//!
//! Composition root: loads configuration, connects storage, builds the
//! connection hub and schedule engine, starts the tick driver and serves the
//! HTTP and WebSocket API until SIGINT or SIGTERM.

mod config;
mod scheduler;

use std::sync::Arc;

use coophub_adapter_http_axum::router;
use coophub_adapter_http_axum::state::AppState;
use coophub_adapter_storage_sqlite_sqlx::{
    Config as StorageConfig, SqliteCommandRepository, SqliteDeviceRepository,
    SqliteExecutionRepository, SqliteScheduleRepository,
};
use coophub_app::hub::ConnectionHub;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

use crate::config::{Config, DEFAULT_LOG_FILTER};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;

    let filter = EnvFilter::try_new(&config.logging.filter)
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let db = StorageConfig {
        database_url: config.database_url().to_string(),
    }
    .build()
    .await?;
    let pool = db.pool().clone();

    let state = AppState::new(
        Arc::new(ConnectionHub::new(config.hub.queue_capacity)),
        SqliteScheduleRepository::new(pool.clone()),
        SqliteExecutionRepository::new(pool.clone()),
        SqliteCommandRepository::new(pool.clone()),
        SqliteDeviceRepository::new(pool),
        config.ws_settings(),
    );

    let (stop_tx, stop_rx) = watch::channel(false);
    let driver = if config.scheduler.enabled {
        Some(tokio::spawn(scheduler::run(
            Arc::clone(&state.engine),
            config.tick_interval(),
            stop_rx,
        )))
    } else {
        tracing::warn!("schedule driver disabled, rules only fire on demand");
        None
    };

    let app = router::build(state);
    let listener = TcpListener::bind(config.bind_addr()).await?;
    tracing::info!(addr = %listener.local_addr()?, "coophubd listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // A send error means the driver already exited.
    let _ = stop_tx.send(true);
    if let Some(driver) = driver {
        driver.await?;
    }
    tracing::info!("coophubd stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
    tracing::info!("shutdown signal received, draining connections");
}
