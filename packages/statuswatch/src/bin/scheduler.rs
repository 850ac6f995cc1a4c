//! Scheduler process entrypoint: ticks `scheduler_tick_seconds`, enqueueing
//! due `CheckJob` rows. Safe to run as N replicas — the idempotency-key
//! unique constraint and row-level skip-locked selects make duplicate
//! scheduling impossible even when two instances tick at once.

use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use statuswatch::{scheduler, Config};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,statuswatch=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("starting statuswatch scheduler");

    let config = Config::from_env().context("failed to load configuration")?;

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await
        .context("failed to connect to database")?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("failed to run migrations")?;
    tracing::info!("migrations complete");

    let shutdown = CancellationToken::new();
    let shutdown_signal = shutdown.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("received shutdown signal");
        shutdown_signal.cancel();
    });

    scheduler::run_loop(
        &pool,
        config.scheduler_tick_seconds,
        config.scheduler_batch_size,
        config.worker_max_attempts,
        shutdown,
    )
    .await;

    Ok(())
}
