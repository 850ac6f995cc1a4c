//! Environment-driven configuration, enumerated per the external-interfaces
//! contract: every tunable the scheduler and worker read is listed here, with
//! the defaults that keep a local run sane.

use anyhow::{Context, Result};
use std::env;
use std::time::Duration;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,

    /// Default per-request HTTP timeout when a check doesn't override it.
    pub default_http_timeout_seconds: u64,
    pub user_agent: String,

    pub scheduler_tick_seconds: u64,
    pub scheduler_batch_size: i64,

    pub worker_batch_size: i64,
    pub worker_lease_seconds: i64,
    pub worker_poll_seconds: u64,
    pub worker_max_attempts: i32,
    pub worker_concurrency: usize,
    pub per_service_concurrency: usize,
    pub checker_concurrency: usize,

    pub max_response_body_bytes: usize,
    pub max_json_response_body_bytes: usize,
}

impl Config {
    /// Load configuration from environment variables, loading a `.env` file
    /// first if present (development convenience only).
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();

        Ok(Self {
            database_url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,

            default_http_timeout_seconds: env_parse("DEFAULT_HTTP_TIMEOUT_SECONDS", 5)?,
            user_agent: env::var("USER_AGENT")
                .unwrap_or_else(|_| "statuswatch/1.0 (+health-checker)".to_string()),

            scheduler_tick_seconds: env_parse("SCHEDULER_TICK_SECONDS", 5)?,
            scheduler_batch_size: env_parse("SCHEDULER_BATCH_SIZE", 200)?,

            worker_batch_size: env_parse("WORKER_BATCH_SIZE", 20)?,
            worker_lease_seconds: env_parse("WORKER_LEASE_SECONDS", 60)?,
            worker_poll_seconds: env_parse("WORKER_POLL_SECONDS", 2)?,
            worker_max_attempts: env_parse("WORKER_MAX_ATTEMPTS", 5)?,
            worker_concurrency: env_parse("WORKER_CONCURRENCY", 50)?,
            per_service_concurrency: env_parse("PER_SERVICE_CONCURRENCY", 4)?,
            checker_concurrency: env_parse("CHECKER_CONCURRENCY", 8)?,

            max_response_body_bytes: env_parse("MAX_RESPONSE_BODY_BYTES", 1_000_000)?,
            max_json_response_body_bytes: env_parse("MAX_JSON_RESPONSE_BODY_BYTES", 2_000_000)?,
        })
    }

    pub fn scheduler_tick(&self) -> Duration {
        Duration::from_secs(self.scheduler_tick_seconds)
    }

    pub fn worker_poll_interval(&self) -> Duration {
        Duration::from_secs(self.worker_poll_seconds)
    }
}

fn env_parse<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse()
            .map_err(|e| anyhow::anyhow!("{key} must be a valid value: {e}")),
        Err(_) => Ok(default),
    }
}
