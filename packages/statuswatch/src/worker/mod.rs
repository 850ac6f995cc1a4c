//! The concurrent executor: claims leased jobs, runs checks under global and
//! per-service concurrency caps, records raw runs, recomputes snapshots and
//! incidents, and retries failures with jittered backoff.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use rand::Rng;
use sqlx::PgPool;
use tokio::sync::{Mutex, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::checker::{resolve_check_weights, BoundedHttpClient, CheckSpec, CheckerRegistry};
use crate::id::ServiceId;
use crate::jobs;
use crate::models::{CheckJob, CheckRun, IncidentEvent, IncidentEventType, ServiceCheck};
use crate::scoring;
use crate::Config;

/// Generates a stable `"{hostname}-{random12hex}"` identity for lease
/// ownership, held for the process lifetime.
pub fn generate_worker_id() -> String {
    let hostname = hostname_or_default();
    let suffix: String = {
        let mut rng = rand::thread_rng();
        (0..12)
            .map(|_| std::char::from_digit(rng.gen_range(0..16), 16).unwrap())
            .collect()
    };
    format!("{hostname}-{suffix}")
}

fn hostname_or_default() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "worker".to_string())
}

/// Process-level state shared across every job a worker processes: the
/// global + per-service semaphores, the shared HTTP client, the registry, and
/// this process's lease identity. Created once at process start.
pub struct Worker {
    pool: PgPool,
    config: Config,
    registry: Arc<CheckerRegistry>,
    http_client: BoundedHttpClient,
    worker_id: String,
    global_semaphore: Arc<Semaphore>,
    per_service_semaphores: Mutex<HashMap<ServiceId, Arc<Semaphore>>>,
}

impl Worker {
    pub fn new(pool: PgPool, config: Config, registry: CheckerRegistry) -> Result<Self> {
        let http_client = BoundedHttpClient::new(
            &config.user_agent,
            std::time::Duration::from_secs(config.default_http_timeout_seconds),
            config.max_response_body_bytes,
            config.max_json_response_body_bytes,
        )?;
        let global_semaphore = Arc::new(Semaphore::new(config.worker_concurrency));
        Ok(Self {
            worker_id: generate_worker_id(),
            pool,
            registry: Arc::new(registry),
            http_client,
            global_semaphore,
            per_service_semaphores: Mutex::new(HashMap::new()),
            config,
        })
    }

    async fn semaphore_for(&self, service_id: ServiceId) -> Arc<Semaphore> {
        let mut map = self.per_service_semaphores.lock().await;
        map.entry(service_id)
            .or_insert_with(|| Arc::new(Semaphore::new(self.config.per_service_concurrency)))
            .clone()
    }

    /// Runs the poll loop until `shutdown` is cancelled. Between empty
    /// batches, sleeps `worker_poll_seconds`; terminates at the next
    /// iteration boundary after cancellation, never mid-batch.
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        info!(worker_id = %self.worker_id, "worker starting");
        loop {
            if shutdown.is_cancelled() {
                break;
            }

            let claimed = match jobs::claim_jobs(
                &self.pool,
                Utc::now(),
                &self.worker_id,
                self.config.worker_batch_size,
                self.config.worker_lease_seconds,
            )
            .await
            {
                Ok(jobs) => jobs,
                Err(err) => {
                    error!(error = %err, "failed to claim jobs");
                    Vec::new()
                }
            };

            if claimed.is_empty() {
                tokio::select! {
                    _ = tokio::time::sleep(self.config.worker_poll_interval()) => {}
                    _ = shutdown.cancelled() => break,
                }
                continue;
            }

            let handles: Vec<_> = claimed
                .into_iter()
                .map(|job| {
                    let worker = Arc::clone(&self);
                    tokio::spawn(async move { worker.process_job(job).await })
                })
                .collect();

            for handle in handles {
                if let Err(join_err) = handle.await {
                    error!(error = %join_err, "job task panicked");
                }
            }
        }
        info!(worker_id = %self.worker_id, "worker stopped");
    }

    async fn process_job(&self, job: CheckJob) {
        let _global_permit = self.global_semaphore.acquire().await;
        let service_semaphore = self.semaphore_for(job.service_id).await;
        let _service_permit = service_semaphore.acquire().await;

        if let Err(err) = self.process_job_inner(&job).await {
            error!(job_id = %job.id, error = %err, "job processing failed, scheduling retry");
            if let Err(retry_err) = jobs::mark_job_retry_or_fail(&self.pool, job.id, Utc::now()).await
            {
                error!(job_id = %job.id, error = %retry_err, "failed to mark job for retry");
            }
        }
    }

    async fn process_job_inner(&self, job: &CheckJob) -> Result<()> {
        let check = ServiceCheck::find_by_id(&self.pool, job.check_id)
            .await
            .context("loading service check")?;

        let check = match check {
            Some(check) if check.enabled => check,
            _ => {
                jobs::mark_job_done(&self.pool, job.id).await?;
                return Ok(());
            }
        };

        let probe = self
            .registry
            .resolve(&check.class_path, check.check_key.clone(), check.timeout_seconds as u64)
            .context("resolving check implementation")?;

        let result = probe.execute(&self.http_client).await;

        let mut tx = self.pool.begin().await?;

        CheckRun::insert(
            &mut *tx,
            job.service_id,
            job.check_id,
            Some(job.id),
            result.status.into(),
            result.latency_ms,
            result.http_status,
            result.error_code.as_deref(),
            result.error_message.as_deref(),
            result.metadata.clone(),
            result.observed_at,
        )
        .await
        .context("inserting check run")?;

        // Every read from here on must go through `tx`, not `self.pool`: the
        // `CheckRun` just inserted above is only visible to this transaction
        // until it commits, and the scoring reducer needs to see it.
        self.recompute_snapshot_and_incident(&mut tx, job.service_id, result.observed_at)
            .await
            .context("recomputing snapshot")?;

        tx.commit().await?;

        jobs::mark_job_done(&self.pool, job.id)
            .await
            .context("marking job done")?;

        Ok(())
    }

    async fn recompute_snapshot_and_incident(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        service_id: ServiceId,
        observed_at: chrono::DateTime<Utc>,
    ) -> Result<()> {
        let enabled_checks =
            ServiceCheck::list_enabled_for_service(&mut **tx, service_id).await?;

        // Unspecified weights are only ever meaningful relative to the full
        // enabled set, so resolve across all of them before reading any runs.
        let resolved_weights = if enabled_checks.is_empty() {
            Vec::new()
        } else {
            let specs: Vec<CheckSpec> = enabled_checks
                .iter()
                .map(|check| CheckSpec {
                    check_key: check.check_key.clone(),
                    weight: check.weight,
                })
                .collect();
            resolve_check_weights(&specs)
                .with_context(|| format!("resolving check weights for service {service_id}"))?
        };

        let mut check_signals = Vec::new();
        for (check, resolved) in enabled_checks.iter().zip(resolved_weights.iter()) {
            if let Some(run) = CheckRun::latest_for_check(&mut **tx, check.id).await? {
                check_signals.push(scoring::CheckSignal {
                    status: run.status,
                    latency_ms: run.latency_ms,
                    weight: resolved.weight,
                });
            }
        }

        let dependencies =
            crate::models::ServiceDependency::list_for_service(&mut **tx, service_id).await?;
        let mut dependency_signals = Vec::new();
        for dep in &dependencies {
            if let Some(snapshot) = crate::models::ServiceSnapshot::latest_for_service(
                &mut **tx,
                dep.depends_on_service_id,
            )
            .await?
            {
                dependency_signals.push(scoring::DependencySignal {
                    dependency_service_id: dep.depends_on_service_id,
                    dependency_status: snapshot.status,
                    dependency_type: dep.dependency_type,
                    weight: dep.weight,
                });
            }
        }

        let outcome = scoring::compute_snapshot(&check_signals, &dependency_signals);

        crate::models::ServiceSnapshot::insert(
            &mut **tx,
            service_id,
            outcome.raw_score,
            outcome.effective_score,
            outcome.status,
            outcome.dependency_impacted,
            outcome.attribution_confidence,
            outcome.probable_root_service_id,
            observed_at,
        )
        .await?;

        self.apply_incident_transition(tx, service_id, &outcome, observed_at)
            .await
    }

    async fn apply_incident_transition(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        service_id: ServiceId,
        outcome: &scoring::SnapshotOutcome,
        observed_at: chrono::DateTime<Utc>,
    ) -> Result<()> {
        let open_incident =
            crate::models::Incident::find_open_for_service(&mut **tx, service_id).await?;
        let transition = scoring::next_transition(outcome.status, open_incident.is_some());

        match transition {
            scoring::IncidentTransition::NoOp => {}
            scoring::IncidentTransition::Resolve => {
                let incident = open_incident.expect("resolve implies an open incident");
                crate::models::Incident::resolve(&mut **tx, incident.id, observed_at).await?;
                IncidentEvent::insert(
                    &mut **tx,
                    incident.id,
                    IncidentEventType::Resolved,
                    serde_json::json!({ "resolved_at": observed_at }),
                )
                .await?;
            }
            scoring::IncidentTransition::Open { peak_severity } => {
                let incident = crate::models::Incident::open(
                    &mut **tx,
                    service_id,
                    observed_at,
                    peak_severity,
                    outcome.probable_root_service_id,
                    outcome.attribution_confidence,
                    &format!("Service entered {} state", outcome.status),
                )
                .await?;
                IncidentEvent::insert(
                    &mut **tx,
                    incident.id,
                    IncidentEventType::Opened,
                    serde_json::json!({ "status": outcome.status, "confidence": outcome.attribution_confidence }),
                )
                .await?;
            }
            scoring::IncidentTransition::Update { peak_severity } => {
                let incident = open_incident.expect("update implies an open incident");
                let new_peak = if peak_severity.rank() > incident.peak_severity.rank() {
                    peak_severity
                } else {
                    incident.peak_severity
                };
                crate::models::Incident::update_open(
                    &mut **tx,
                    incident.id,
                    new_peak,
                    outcome.probable_root_service_id,
                    outcome.attribution_confidence,
                )
                .await?;
                IncidentEvent::insert(
                    &mut **tx,
                    incident.id,
                    IncidentEventType::Updated,
                    serde_json::json!({ "status": outcome.status, "confidence": outcome.attribution_confidence }),
                )
                .await?;
            }
        }

        Ok(())
    }
}

