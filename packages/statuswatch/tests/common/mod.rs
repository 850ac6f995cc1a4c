//! Shared test infrastructure: a single Postgres container reused across all
//! integration tests, migrated once on first use.

use anyhow::{Context, Result};
use sqlx::PgPool;
use testcontainers::runners::AsyncRunner;
use testcontainers::ContainerAsync;
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

struct SharedInfra {
    pool: PgPool,
    _container: ContainerAsync<Postgres>,
}

static SHARED_INFRA: OnceCell<SharedInfra> = OnceCell::const_new();

async fn init() -> Result<SharedInfra> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();

    let container = Postgres::default()
        .start()
        .await
        .context("failed to start postgres container")?;

    let host = container.get_host().await?;
    let port = container.get_host_port_ipv4(5432).await?;
    let db_url = format!("postgres://postgres:postgres@{host}:{port}/postgres");

    let pool = PgPool::connect(&db_url)
        .await
        .context("failed to connect to test postgres")?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("failed to run migrations")?;

    Ok(SharedInfra {
        pool,
        _container: container,
    })
}

/// Returns the shared test pool, starting the container and running
/// migrations on first call. Tests share one database — each test truncates
/// the tables it touches rather than relying on isolation.
pub async fn pool() -> PgPool {
    SHARED_INFRA
        .get_or_init(|| async { init().await.expect("failed to init shared test infra") })
        .await
        .pool
        .clone()
}

pub async fn truncate_all(pool: &PgPool) {
    sqlx::query(
        "TRUNCATE TABLE incident_events, incidents, service_snapshots, check_runs, \
         check_jobs, service_checks, service_dependencies, services RESTART IDENTITY CASCADE",
    )
    .execute(pool)
    .await
    .expect("failed to truncate tables");
}

pub async fn insert_service(pool: &PgPool, slug: &str) -> statuswatch::id::ServiceId {
    let row: (uuid::Uuid,) = sqlx::query_as(
        "INSERT INTO services (slug, name) VALUES ($1, $1) RETURNING id",
    )
    .bind(slug)
    .fetch_one(pool)
    .await
    .expect("failed to insert service");
    statuswatch::id::ServiceId::from_uuid(row.0)
}

pub async fn insert_service_check(
    pool: &PgPool,
    service_id: statuswatch::id::ServiceId,
    check_key: &str,
    interval_seconds: i32,
    next_due_at: chrono::DateTime<chrono::Utc>,
) -> statuswatch::id::ServiceCheckId {
    insert_service_check_with_class(
        pool,
        service_id,
        check_key,
        "statuswatch.tests.Fixed",
        interval_seconds,
        next_due_at,
    )
    .await
}

pub async fn insert_service_check_with_class(
    pool: &PgPool,
    service_id: statuswatch::id::ServiceId,
    check_key: &str,
    class_path: &str,
    interval_seconds: i32,
    next_due_at: chrono::DateTime<chrono::Utc>,
) -> statuswatch::id::ServiceCheckId {
    let row: (uuid::Uuid,) = sqlx::query_as(
        r#"
        INSERT INTO service_checks
            (service_id, check_key, class_path, interval_seconds, timeout_seconds, weight, next_due_at)
        VALUES ($1, $2, $3, $4, 5, 1.0, $5)
        RETURNING id
        "#,
    )
    .bind(service_id)
    .bind(check_key)
    .bind(class_path)
    .bind(interval_seconds)
    .bind(next_due_at)
    .fetch_one(pool)
    .await
    .expect("failed to insert service check");
    statuswatch::id::ServiceCheckId::from_uuid(row.0)
}
