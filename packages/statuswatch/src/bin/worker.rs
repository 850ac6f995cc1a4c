//! Worker process entrypoint: claims leased `CheckJob` rows and runs them
//! under global and per-service concurrency caps.
//!
//! Concrete `Check` implementations (the hundreds of per-service endpoint
//! probes) are out of this crate's scope — they are instances of the
//! [`statuswatch::checker::Check`] trait registered into the
//! [`statuswatch::checker::CheckerRegistry`] by the deployment that owns
//! them. This binary boots with an empty registry; any job whose
//! `class_path` has no matching factory fails with `RegistryError` and is
//! retried per the usual backoff policy until an operator registers it.

use std::sync::Arc;

use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use statuswatch::checker::CheckerRegistry;
use statuswatch::worker::Worker;
use statuswatch::Config;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,statuswatch=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("starting statuswatch worker");

    let config = Config::from_env().context("failed to load configuration")?;

    let pool = PgPoolOptions::new()
        .max_connections(config.worker_concurrency as u32 + 5)
        .connect(&config.database_url)
        .await
        .context("failed to connect to database")?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("failed to run migrations")?;
    tracing::info!("migrations complete");

    let registry = CheckerRegistry::new();
    let worker = Arc::new(Worker::new(pool, config, registry).context("failed to build worker")?);

    let shutdown = CancellationToken::new();
    let shutdown_signal = shutdown.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("received shutdown signal");
        shutdown_signal.cancel();
    });

    worker.run(shutdown).await;

    Ok(())
}
