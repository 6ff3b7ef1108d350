//! Arbor server: application entry point.

mod config;

use std::process::ExitCode;
use std::sync::Arc;

use arbor_core::clock::SystemClock;
use arbor_core::error::{ArborError, ArborResult};
use arbor_db::{DbError, DbManager};
use arbor_engine::{ChannelTaskSink, Engine, PrivilegeRefreshWorker};
use tracing_subscriber::EnvFilter;

use crate::config::ServerConfig;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("arbor=info")),
        )
        .json()
        .init();

    tracing::info!("Starting Arbor server...");

    match run(ServerConfig::from_env()).await {
        Ok(()) => {
            tracing::info!("Arbor server stopped.");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "Arbor server failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: ServerConfig) -> ArborResult<()> {
    let manager = DbManager::connect(&config.db)
        .await
        .map_err(DbError::from)?;
    manager.migrate().await?;

    let (sink, rx) = ChannelTaskSink::channel(config.engine.refresh_queue_capacity);
    let engine = Engine::new(
        manager.store(),
        config.engine,
        Arc::new(SystemClock),
        Arc::new(sink),
    );
    engine.assignments.ensure_reserved_roles().await?;

    let worker = tokio::spawn(PrivilegeRefreshWorker::new(engine.privileges.clone(), rx).run());

    tokio::signal::ctrl_c()
        .await
        .map_err(|e| ArborError::Internal(format!("failed to listen for shutdown: {e}")))?;
    tracing::info!("Shutdown requested");

    // The worker's resolver holds a sender too, so the channel never
    // closes on its own.
    worker.abort();
    if let Err(e) = worker.await {
        if !e.is_cancelled() {
            return Err(ArborError::Internal(format!("refresh worker panicked: {e}")));
        }
    }
    Ok(())
}
