use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgExecutor;

use super::CheckStatus;
use crate::id::{CheckJobId, CheckRunId, ServiceCheckId, ServiceId};

/// Immutable outcome of executing one `CheckJob`. Rows are never updated or
/// deleted — "latest" is always a query, never a mutation.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct CheckRun {
    pub id: CheckRunId,
    pub service_id: ServiceId,
    pub check_id: ServiceCheckId,
    pub job_id: Option<CheckJobId>,
    pub status: CheckStatus,
    pub latency_ms: Option<i32>,
    pub http_status: Option<i32>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub metadata: serde_json::Value,
    pub observed_at: DateTime<Utc>,
}

impl CheckRun {
    #[allow(clippy::too_many_arguments)]
    pub async fn insert(
        executor: impl sqlx::PgExecutor<'_>,
        service_id: ServiceId,
        check_id: ServiceCheckId,
        job_id: Option<CheckJobId>,
        status: CheckStatus,
        latency_ms: Option<i32>,
        http_status: Option<i32>,
        error_code: Option<&str>,
        error_message: Option<&str>,
        metadata: serde_json::Value,
        observed_at: DateTime<Utc>,
    ) -> Result<Self> {
        let run = sqlx::query_as::<_, CheckRun>(
            r#"
            INSERT INTO check_runs
                (service_id, check_id, job_id, status, latency_ms, http_status,
                 error_code, error_message, metadata, observed_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING *
            "#,
        )
        .bind(service_id)
        .bind(check_id)
        .bind(job_id)
        .bind(status)
        .bind(latency_ms)
        .bind(http_status)
        .bind(error_code)
        .bind(error_message)
        .bind(metadata)
        .bind(observed_at)
        .fetch_one(executor)
        .await?;
        Ok(run)
    }

    /// Latest run per enabled check, tie-broken by greatest `id` at equal
    /// `observed_at` (per the spec's "latest result" semantics).
    pub async fn latest_for_check(
        executor: impl PgExecutor<'_>,
        check_id: ServiceCheckId,
    ) -> Result<Option<Self>> {
        let run = sqlx::query_as::<_, CheckRun>(
            r#"
            SELECT * FROM check_runs
            WHERE check_id = $1
            ORDER BY observed_at DESC, id DESC
            LIMIT 1
            "#,
        )
        .bind(check_id)
        .fetch_optional(executor)
        .await?;
        Ok(run)
    }
}
