//! The durable job queue: atomic claim with skip-locked semantics, lease
//! expiry, and jittered retry backoff.

use anyhow::Result;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rand::Rng;
use sqlx::PgPool;

use crate::id::{CheckJobId, ServiceCheckId, ServiceId};
use crate::models::{CheckJob, CheckJobStatus};

/// `min(60, 2^(attempt-1)) + U(0, 0.5)` seconds. Jitter prevents thundering
/// herds when a fleet of workers restarts together.
pub fn backoff(attempt: i32) -> std::time::Duration {
    let base = 2f64.powi((attempt - 1).max(0)).min(60.0);
    let jitter = rand::thread_rng().gen_range(0.0..0.5);
    std::time::Duration::from_secs_f64(base + jitter)
}

/// Enqueue a job if its idempotency key hasn't been used. Conflicts are
/// ignored — at-most-once insertion across concurrent schedulers and restarts.
pub async fn enqueue(
    executor: impl sqlx::PgExecutor<'_>,
    service_id: ServiceId,
    check_id: ServiceCheckId,
    scheduled_for: DateTime<Utc>,
    max_attempts: i32,
) -> Result<bool> {
    let idempotency_key = CheckJob::idempotency_key(check_id, scheduled_for);
    let result = sqlx::query(
        r#"
        INSERT INTO check_jobs
            (service_id, check_id, scheduled_for, status, attempt, max_attempts, idempotency_key)
        VALUES ($1, $2, $3, 'queued', 0, $4, $5)
        ON CONFLICT (idempotency_key) DO NOTHING
        "#,
    )
    .bind(service_id)
    .bind(check_id)
    .bind(scheduled_for)
    .bind(max_attempts)
    .bind(idempotency_key)
    .execute(executor)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Claim up to `batch_size` jobs that are queued or whose lease has expired,
/// marking them leased to `worker_id`. Skips rows already locked by a
/// concurrent claimant so multiple workers can poll the same table safely.
pub async fn claim_jobs(
    pool: &PgPool,
    now: DateTime<Utc>,
    worker_id: &str,
    batch_size: i64,
    lease_seconds: i64,
) -> Result<Vec<CheckJob>> {
    let lease_expires_at = now + ChronoDuration::seconds(lease_seconds);

    let mut tx = pool.begin().await?;

    let candidates = sqlx::query_as::<_, CheckJob>(
        r#"
        SELECT * FROM check_jobs
        WHERE scheduled_for <= $1
          AND (status = 'queued' OR (status = 'leased' AND lease_expires_at < $1))
        ORDER BY scheduled_for ASC
        LIMIT $2
        FOR UPDATE SKIP LOCKED
        "#,
    )
    .bind(now)
    .bind(batch_size)
    .fetch_all(&mut *tx)
    .await?;

    let mut claimed = Vec::with_capacity(candidates.len());
    for job in candidates {
        let updated = sqlx::query_as::<_, CheckJob>(
            r#"
            UPDATE check_jobs
            SET status = 'leased',
                worker_id = $2,
                lease_expires_at = $3,
                attempt = attempt + 1,
                updated_at = now()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(job.id)
        .bind(worker_id)
        .bind(lease_expires_at)
        .fetch_one(&mut *tx)
        .await?;
        claimed.push(updated);
    }

    tx.commit().await?;
    Ok(claimed)
}

pub async fn mark_job_done(pool: &PgPool, job_id: CheckJobId) -> Result<()> {
    sqlx::query(
        "UPDATE check_jobs SET status = 'done', lease_expires_at = NULL, updated_at = now() WHERE id = $1",
    )
    .bind(job_id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Returns the job to `queued` with a jittered backoff delay, or moves it to
/// `failed` once `attempt >= max_attempts`.
pub async fn mark_job_retry_or_fail(
    pool: &PgPool,
    job_id: CheckJobId,
    now: DateTime<Utc>,
) -> Result<CheckJobStatus> {
    let mut tx = pool.begin().await?;

    let job = sqlx::query_as::<_, CheckJob>("SELECT * FROM check_jobs WHERE id = $1 FOR UPDATE")
        .bind(job_id)
        .fetch_one(&mut *tx)
        .await?;

    let new_status = if job.attempt >= job.max_attempts {
        sqlx::query(
            "UPDATE check_jobs SET status = 'failed', lease_expires_at = NULL, updated_at = now() WHERE id = $1",
        )
        .bind(job_id)
        .execute(&mut *tx)
        .await?;
        CheckJobStatus::Failed
    } else {
        let delay = backoff(job.attempt);
        let next_scheduled_for = now + ChronoDuration::from_std(delay)?;
        sqlx::query(
            r#"
            UPDATE check_jobs
            SET status = 'queued', worker_id = NULL, lease_expires_at = NULL,
                scheduled_for = $2, updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(job_id)
        .bind(next_scheduled_for)
        .execute(&mut *tx)
        .await?;
        CheckJobStatus::Queued
    };

    tx.commit().await?;
    Ok(new_status)
}
