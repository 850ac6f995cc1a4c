use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

use crate::id::{CheckJobId, ServiceCheckId, ServiceId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "check_job_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum CheckJobStatus {
    Queued,
    Leased,
    Done,
    Failed,
}

/// A durable work unit: "run this check at this scheduled time". The
/// queue-manipulation operations (`claim`, `mark_done`, `mark_retry_or_fail`)
/// live in [`crate::jobs`] since they require transaction-scoped row locks;
/// this type only carries the row shape and read-only lookups.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct CheckJob {
    pub id: CheckJobId,
    pub service_id: ServiceId,
    pub check_id: ServiceCheckId,
    pub scheduled_for: DateTime<Utc>,
    pub status: CheckJobStatus,
    pub lease_expires_at: Option<DateTime<Utc>>,
    pub worker_id: Option<String>,
    pub attempt: i32,
    pub max_attempts: i32,
    pub idempotency_key: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CheckJob {
    pub fn idempotency_key(check_id: ServiceCheckId, scheduled_for: DateTime<Utc>) -> String {
        format!("{check_id}:{}", scheduled_for.timestamp())
    }

    pub async fn find_by_id(pool: &PgPool, id: CheckJobId) -> Result<Option<Self>> {
        let job = sqlx::query_as::<_, CheckJob>("SELECT * FROM check_jobs WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await?;
        Ok(job)
    }
}
