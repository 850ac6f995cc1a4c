use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgExecutor;

use crate::id::{IncidentEventId, IncidentId, ServiceId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "incident_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum IncidentStatus {
    Open,
    Resolved,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "incident_severity", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum IncidentSeverity {
    Degraded,
    Down,
}

impl IncidentSeverity {
    pub fn rank(self) -> u8 {
        match self {
            IncidentSeverity::Degraded => 1,
            IncidentSeverity::Down => 2,
        }
    }

    /// `None` when the incoming status is `up` — up is never a peak severity.
    pub fn from_check_status(status: super::CheckStatus) -> Option<Self> {
        match status {
            super::CheckStatus::Up => None,
            super::CheckStatus::Degraded => Some(IncidentSeverity::Degraded),
            super::CheckStatus::Down => Some(IncidentSeverity::Down),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "incident_event_type", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum IncidentEventType {
    Opened,
    Updated,
    Resolved,
}

/// At most one row per service in status `open`; enforced by a partial
/// unique index on `(service_id) WHERE status = 'open'`.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Incident {
    pub id: IncidentId,
    pub service_id: ServiceId,
    pub status: IncidentStatus,
    pub started_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub peak_severity: IncidentSeverity,
    pub probable_root_service_id: Option<ServiceId>,
    pub confidence: f64,
    pub summary: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Incident {
    pub async fn find_open_for_service(
        executor: impl PgExecutor<'_>,
        service_id: ServiceId,
    ) -> Result<Option<Self>> {
        let incident = sqlx::query_as::<_, Incident>(
            "SELECT * FROM incidents WHERE service_id = $1 AND status = 'open' FOR UPDATE",
        )
        .bind(service_id)
        .fetch_optional(executor)
        .await?;
        Ok(incident)
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn open(
        executor: impl PgExecutor<'_>,
        service_id: ServiceId,
        started_at: DateTime<Utc>,
        peak_severity: IncidentSeverity,
        probable_root_service_id: Option<ServiceId>,
        confidence: f64,
        summary: &str,
    ) -> Result<Self> {
        let incident = sqlx::query_as::<_, Incident>(
            r#"
            INSERT INTO incidents
                (service_id, status, started_at, peak_severity,
                 probable_root_service_id, confidence, summary)
            VALUES ($1, 'open', $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(service_id)
        .bind(started_at)
        .bind(peak_severity)
        .bind(probable_root_service_id)
        .bind(confidence)
        .bind(summary)
        .fetch_one(executor)
        .await?;
        Ok(incident)
    }

    pub async fn update_open(
        executor: impl PgExecutor<'_>,
        id: IncidentId,
        peak_severity: IncidentSeverity,
        probable_root_service_id: Option<ServiceId>,
        confidence: f64,
    ) -> Result<Self> {
        let incident = sqlx::query_as::<_, Incident>(
            r#"
            UPDATE incidents
            SET peak_severity = $2,
                probable_root_service_id = $3,
                confidence = $4,
                updated_at = now()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(peak_severity)
        .bind(probable_root_service_id)
        .bind(confidence)
        .fetch_one(executor)
        .await?;
        Ok(incident)
    }

    pub async fn resolve(
        executor: impl PgExecutor<'_>,
        id: IncidentId,
        resolved_at: DateTime<Utc>,
    ) -> Result<Self> {
        let incident = sqlx::query_as::<_, Incident>(
            r#"
            UPDATE incidents
            SET status = 'resolved', resolved_at = $2, updated_at = now()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(resolved_at)
        .fetch_one(executor)
        .await?;
        Ok(incident)
    }
}

/// Append-only timeline entry for an incident.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct IncidentEvent {
    pub id: IncidentEventId,
    pub incident_id: IncidentId,
    pub event_type: IncidentEventType,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl IncidentEvent {
    pub async fn insert(
        executor: impl PgExecutor<'_>,
        incident_id: IncidentId,
        event_type: IncidentEventType,
        payload: serde_json::Value,
    ) -> Result<Self> {
        let event = sqlx::query_as::<_, IncidentEvent>(
            r#"
            INSERT INTO incident_events (incident_id, event_type, payload)
            VALUES ($1, $2, $3)
            RETURNING *
            "#,
        )
        .bind(incident_id)
        .bind(event_type)
        .bind(payload)
        .fetch_one(executor)
        .await?;
        Ok(event)
    }
}
