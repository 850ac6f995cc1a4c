use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgExecutor;

use super::CheckStatus;
use crate::id::{ServiceId, ServiceSnapshotId};

/// Immutable derived record: one per service per worker write. Append-only —
/// readers always take the row with the greatest `observed_at`.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ServiceSnapshot {
    pub id: ServiceSnapshotId,
    pub service_id: ServiceId,
    pub raw_score: f64,
    pub effective_score: f64,
    pub status: CheckStatus,
    pub dependency_impacted: bool,
    pub attribution_confidence: f64,
    pub probable_root_service_id: Option<ServiceId>,
    pub observed_at: DateTime<Utc>,
}

impl ServiceSnapshot {
    #[allow(clippy::too_many_arguments)]
    pub async fn insert(
        executor: impl sqlx::PgExecutor<'_>,
        service_id: ServiceId,
        raw_score: f64,
        effective_score: f64,
        status: CheckStatus,
        dependency_impacted: bool,
        attribution_confidence: f64,
        probable_root_service_id: Option<ServiceId>,
        observed_at: DateTime<Utc>,
    ) -> Result<Self> {
        let snapshot = sqlx::query_as::<_, ServiceSnapshot>(
            r#"
            INSERT INTO service_snapshots
                (service_id, raw_score, effective_score, status, dependency_impacted,
                 attribution_confidence, probable_root_service_id, observed_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
            "#,
        )
        .bind(service_id)
        .bind(raw_score)
        .bind(effective_score)
        .bind(status)
        .bind(dependency_impacted)
        .bind(attribution_confidence)
        .bind(probable_root_service_id)
        .bind(observed_at)
        .fetch_one(executor)
        .await?;
        Ok(snapshot)
    }

    /// Latest snapshot for a service, used both by readers and by the scoring
    /// engine when resolving a dependency's current status.
    pub async fn latest_for_service(
        executor: impl PgExecutor<'_>,
        service_id: ServiceId,
    ) -> Result<Option<Self>> {
        let snapshot = sqlx::query_as::<_, ServiceSnapshot>(
            r#"
            SELECT * FROM service_snapshots
            WHERE service_id = $1
            ORDER BY observed_at DESC, id DESC
            LIMIT 1
            "#,
        )
        .bind(service_id)
        .fetch_optional(executor)
        .await?;
        Ok(snapshot)
    }
}
