use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgExecutor;

use crate::id::{ServiceCheckId, ServiceId};

/// One probe definition owned by a service. `weight` is nullable — unspecified
/// weights are resolved across a service's enabled checks by
/// [`crate::checker::resolve_check_weights`] before they're folded into a score.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ServiceCheck {
    pub id: ServiceCheckId,
    pub service_id: ServiceId,
    pub check_key: String,
    pub class_path: String,
    pub interval_seconds: i32,
    pub timeout_seconds: i32,
    pub weight: Option<f64>,
    pub enabled: bool,
    pub next_due_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ServiceCheck {
    pub async fn find_by_id(executor: impl PgExecutor<'_>, id: ServiceCheckId) -> Result<Option<Self>> {
        let check = sqlx::query_as::<_, ServiceCheck>("SELECT * FROM service_checks WHERE id = $1")
            .bind(id)
            .fetch_optional(executor)
            .await?;
        Ok(check)
    }

    pub async fn list_enabled_for_service(
        executor: impl PgExecutor<'_>,
        service_id: ServiceId,
    ) -> Result<Vec<Self>> {
        let checks = sqlx::query_as::<_, ServiceCheck>(
            "SELECT * FROM service_checks WHERE service_id = $1 AND enabled = true",
        )
        .bind(service_id)
        .fetch_all(executor)
        .await?;
        Ok(checks)
    }

    /// Rows due for scheduling: active service, enabled check, `next_due_at <= now`.
    /// Callers executing this inside the scheduler tick apply `FOR UPDATE SKIP LOCKED`
    /// themselves (see [`crate::scheduler`]) since that clause isn't expressible
    /// through a plain `fetch_all`.
    pub async fn advance_next_due_at(
        executor: impl PgExecutor<'_>,
        id: ServiceCheckId,
        next_due_at: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query("UPDATE service_checks SET next_due_at = $2, updated_at = now() WHERE id = $1")
            .bind(id)
            .bind(next_due_at)
            .execute(executor)
            .await?;
        Ok(())
    }
}
