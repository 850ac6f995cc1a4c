mod common;

use chrono::Utc;
use statuswatch::jobs;

/// `mark_job_done` then `claim_jobs` does not reclaim the job.
#[tokio::test]
async fn done_jobs_are_never_reclaimed() {
    let pool = common::pool().await;
    common::truncate_all(&pool).await;

    let service_id = common::insert_service(&pool, "queue-done").await;
    let check_id = common::insert_service_check(&pool, service_id, "ping", 60, Utc::now()).await;

    let scheduled_for = Utc::now();
    jobs::enqueue(&pool, service_id, check_id, scheduled_for, 5)
        .await
        .unwrap();

    let claimed = jobs::claim_jobs(&pool, Utc::now(), "worker-a", 10, 60)
        .await
        .unwrap();
    assert_eq!(claimed.len(), 1);

    jobs::mark_job_done(&pool, claimed[0].id).await.unwrap();

    let reclaimed = jobs::claim_jobs(&pool, Utc::now(), "worker-b", 10, 60)
        .await
        .unwrap();
    assert!(reclaimed.is_empty());
}

/// A job whose lease has expired is reclaimable by a different worker.
#[tokio::test]
async fn expired_lease_is_reclaimed_by_another_worker() {
    let pool = common::pool().await;
    common::truncate_all(&pool).await;

    let service_id = common::insert_service(&pool, "queue-lease").await;
    let check_id = common::insert_service_check(&pool, service_id, "ping", 60, Utc::now()).await;

    jobs::enqueue(&pool, service_id, check_id, Utc::now(), 5)
        .await
        .unwrap();

    // Lease with a negative duration so it's already expired.
    let claimed = jobs::claim_jobs(&pool, Utc::now(), "worker-a", 10, -60)
        .await
        .unwrap();
    assert_eq!(claimed.len(), 1);

    let reclaimed = jobs::claim_jobs(&pool, Utc::now(), "worker-b", 10, 60)
        .await
        .unwrap();
    assert_eq!(reclaimed.len(), 1);
    assert_eq!(reclaimed[0].worker_id.as_deref(), Some("worker-b"));
    assert_eq!(reclaimed[0].attempt, 2);
}

/// Seed scenario (e): at `attempt = max_attempts` the job moves to `failed`
/// instead of being requeued.
#[tokio::test]
async fn retry_exhaustion_marks_job_failed() {
    let pool = common::pool().await;
    common::truncate_all(&pool).await;

    let service_id = common::insert_service(&pool, "queue-retry").await;
    let check_id = common::insert_service_check(&pool, service_id, "ping", 60, Utc::now()).await;

    // max_attempts=1: the single claim already brings attempt to 1, so the
    // first failure exhausts retries immediately (no backoff wait needed).
    jobs::enqueue(&pool, service_id, check_id, Utc::now(), 1)
        .await
        .unwrap();

    let claimed = jobs::claim_jobs(&pool, Utc::now(), "worker-a", 10, 60)
        .await
        .unwrap();
    let job = claimed.into_iter().next().expect("job should be claimable");
    assert_eq!(job.attempt, 1);

    let status = jobs::mark_job_retry_or_fail(&pool, job.id, Utc::now())
        .await
        .unwrap();
    assert_eq!(status, statuswatch::models::CheckJobStatus::Failed);

    let reloaded = statuswatch::models::CheckJob::find_by_id(&pool, job.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(reloaded.status, statuswatch::models::CheckJobStatus::Failed);

    // A second call beyond exhaustion is a no-op (status stays failed).
    let status = jobs::mark_job_retry_or_fail(&pool, job.id, Utc::now())
        .await
        .unwrap();
    assert_eq!(status, statuswatch::models::CheckJobStatus::Failed);
}

/// A job with one retry remaining is requeued with `scheduled_for` in the
/// jittered backoff window `[now + 1.0, now + 1.5]` seconds (attempt 1).
#[tokio::test]
async fn retry_requeues_with_jittered_backoff_window() {
    let pool = common::pool().await;
    common::truncate_all(&pool).await;

    let service_id = common::insert_service(&pool, "queue-backoff").await;
    let check_id = common::insert_service_check(&pool, service_id, "ping", 60, Utc::now()).await;

    jobs::enqueue(&pool, service_id, check_id, Utc::now(), 3)
        .await
        .unwrap();

    let claimed = jobs::claim_jobs(&pool, Utc::now(), "worker-a", 10, 60)
        .await
        .unwrap();
    let job = claimed.into_iter().next().unwrap();
    assert_eq!(job.attempt, 1);

    let now = Utc::now();
    let status = jobs::mark_job_retry_or_fail(&pool, job.id, now).await.unwrap();
    assert_eq!(status, statuswatch::models::CheckJobStatus::Queued);

    let reloaded = statuswatch::models::CheckJob::find_by_id(&pool, job.id)
        .await
        .unwrap()
        .unwrap();
    let delay = (reloaded.scheduled_for - now).num_milliseconds() as f64 / 1000.0;
    assert!((1.0..1.5).contains(&delay), "delay {delay} out of window");
    assert!(reloaded.worker_id.is_none());
}
