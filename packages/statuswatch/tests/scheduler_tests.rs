mod common;

use chrono::Utc;
use statuswatch::scheduler;

/// Seed scenario (d): two concurrent scheduler ticks at the same `now`
/// must not produce duplicate `CheckJob` rows for the same `(check, tick)`.
#[tokio::test]
async fn concurrent_ticks_insert_exactly_one_job_per_due_check() {
    let pool = common::pool().await;
    common::truncate_all(&pool).await;

    let service_id = common::insert_service(&pool, "scheduler-idempotence").await;
    let now = Utc::now();
    common::insert_service_check(&pool, service_id, "ping", 60, now).await;

    let (a, b) = tokio::join!(
        scheduler::run_tick(&pool, now, 50, 5),
        scheduler::run_tick(&pool, now, 50, 5),
    );
    a.expect("first tick failed");
    b.expect("second tick failed");

    let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM check_jobs")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count.0, 1);
}

/// Re-running a tick at the same `now` produces zero additional jobs once the
/// first tick has already advanced `next_due_at` past `now`.
#[tokio::test]
async fn rerunning_tick_at_same_now_is_a_no_op() {
    let pool = common::pool().await;
    common::truncate_all(&pool).await;

    let service_id = common::insert_service(&pool, "scheduler-rerun").await;
    let now = Utc::now();
    common::insert_service_check(&pool, service_id, "ping", 60, now).await;

    let first = scheduler::run_tick(&pool, now, 50, 5).await.unwrap();
    assert_eq!(first, 1);

    let second = scheduler::run_tick(&pool, now, 50, 5).await.unwrap();
    assert_eq!(second, 0);
}

/// A check whose interval elapsed many times while the scheduler was "down"
/// (simulated by a stale `next_due_at`) re-enters the queue exactly once.
#[tokio::test]
async fn missed_ticks_collapse_into_a_single_job() {
    let pool = common::pool().await;
    common::truncate_all(&pool).await;

    let service_id = common::insert_service(&pool, "scheduler-catchup").await;
    let now = Utc::now();
    let stale_due = now - chrono::Duration::seconds(605);
    common::insert_service_check(&pool, service_id, "ping", 60, stale_due).await;

    let inserted = scheduler::run_tick(&pool, now, 50, 5).await.unwrap();
    assert_eq!(inserted, 1);

    let next_due_at: (chrono::DateTime<Utc>,) =
        sqlx::query_as("SELECT next_due_at FROM service_checks LIMIT 1")
            .fetch_one(&pool)
            .await
            .unwrap();
    assert!(next_due_at.0 > now);
}
