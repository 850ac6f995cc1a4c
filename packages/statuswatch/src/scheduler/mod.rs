//! The durable scheduler: scans due `service_checks` rows, enqueues an
//! idempotent `CheckJob` for each, and advances `next_due_at` past `now` so
//! missed ticks collapse into a single catch-up job rather than replaying.

use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::{debug, error, info, warn};

use crate::id::{ServiceCheckId, ServiceId};
use crate::jobs;
use crate::models::ServiceCheck;

/// One `service_checks` row selected as due, locked for the duration of the tick.
#[derive(Debug)]
struct DueCheck {
    id: ServiceCheckId,
    service_id: ServiceId,
    interval_seconds: i32,
    next_due_at: DateTime<Utc>,
}

impl DueCheck {
    fn from_columns(
        id: ServiceCheckId,
        service_id: ServiceId,
        interval_seconds: i32,
        next_due_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            service_id,
            interval_seconds,
            next_due_at,
        }
    }
}

/// The first multiple of `interval_seconds` strictly greater than `now`,
/// counted from `previous_next_due_at` — so a check whose interval elapsed
/// many times while the scheduler was down re-enters the queue at most once.
fn advance_next_due_at(
    previous_next_due_at: DateTime<Utc>,
    interval_seconds: i32,
    now: DateTime<Utc>,
) -> DateTime<Utc> {
    let interval = interval_seconds.max(1) as i64;
    let elapsed_secs = (now - previous_next_due_at).num_seconds().max(0);
    let ticks_elapsed = elapsed_secs / interval;
    previous_next_due_at + chrono::Duration::seconds((ticks_elapsed + 1) * interval)
}

/// Runs one scheduler tick inside a single transaction: selects up to
/// `batch_size` due checks with `FOR UPDATE SKIP LOCKED`, inserts a
/// `CheckJob` per row (idempotency-key conflicts are ignored), and advances
/// each row's `next_due_at`. Returns the number of jobs actually inserted.
pub async fn run_tick(
    pool: &PgPool,
    now: DateTime<Utc>,
    batch_size: i64,
    max_attempts: i32,
) -> Result<u64> {
    let mut tx = pool.begin().await?;

    let rows: Vec<(ServiceCheckId, ServiceId, i32, DateTime<Utc>)> = sqlx::query_as(
        r#"
        SELECT sc.id, sc.service_id, sc.interval_seconds, sc.next_due_at
        FROM service_checks sc
        JOIN services s ON s.id = sc.service_id
        WHERE s.is_active = true
          AND sc.enabled = true
          AND sc.next_due_at <= $1
        ORDER BY sc.next_due_at ASC
        LIMIT $2
        FOR UPDATE OF sc SKIP LOCKED
        "#,
    )
    .bind(now)
    .bind(batch_size)
    .fetch_all(&mut *tx)
    .await?;

    let due: Vec<DueCheck> = rows
        .into_iter()
        .map(|(id, service_id, interval_seconds, next_due_at)| {
            DueCheck::from_columns(id, service_id, interval_seconds, next_due_at)
        })
        .collect();

    let mut inserted = 0u64;
    for check in &due {
        let did_insert = jobs::enqueue(
            &mut *tx,
            check.service_id,
            check.id,
            check.next_due_at,
            max_attempts,
        )
        .await?;
        if did_insert {
            inserted += 1;
        } else {
            debug!(check_id = %check.id, "idempotency collision on job insert, skipping");
        }

        let new_next_due_at = advance_next_due_at(check.next_due_at, check.interval_seconds, now);
        ServiceCheck::advance_next_due_at(&mut *tx, check.id, new_next_due_at).await?;
    }

    tx.commit().await?;

    if inserted > 0 {
        info!(jobs_inserted = inserted, checks_scanned = due.len(), "scheduler tick enqueued jobs");
    }

    Ok(inserted)
}

/// The control loop: ticks every `tick_seconds`, sleeping `tick_seconds -
/// elapsed` (floor 100ms) between ticks. Tick failures are logged and never
/// terminate the loop — the next tick retries automatically.
pub async fn run_loop(
    pool: &PgPool,
    tick_seconds: u64,
    batch_size: i64,
    max_attempts: i32,
    shutdown: tokio_util::sync::CancellationToken,
) {
    let tick_period = std::time::Duration::from_secs(tick_seconds.max(1));
    let min_sleep = std::time::Duration::from_millis(100);

    info!(tick_seconds, batch_size, "scheduler starting");

    loop {
        if shutdown.is_cancelled() {
            break;
        }

        let tick_started = std::time::Instant::now();
        match run_tick(pool, Utc::now(), batch_size, max_attempts).await {
            Ok(_) => {}
            Err(err) => {
                error!(error = %err, "scheduler tick failed");
            }
        }

        let elapsed = tick_started.elapsed();
        let sleep_for = tick_period.checked_sub(elapsed).unwrap_or(min_sleep).max(min_sleep);

        tokio::select! {
            _ = tokio::time::sleep(sleep_for) => {}
            _ = shutdown.cancelled() => break,
        }
    }

    warn!("scheduler stopped");
}
