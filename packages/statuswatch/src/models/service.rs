use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgExecutor;

use crate::id::ServiceId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "dependency_type", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ServiceDependencyType {
    Soft,
    Hard,
}

/// A monitored third-party service. Created by registration, destroyed only
/// by cascade from an administrative delete.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Service {
    pub id: ServiceId,
    pub slug: String,
    pub name: String,
    pub is_active: bool,
    pub default_interval_seconds: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Service {
    pub async fn find_by_id(executor: impl PgExecutor<'_>, id: ServiceId) -> Result<Option<Self>> {
        let service = sqlx::query_as::<_, Service>("SELECT * FROM services WHERE id = $1")
            .bind(id)
            .fetch_optional(executor)
            .await?;
        Ok(service)
    }

    pub async fn find_by_slug(executor: impl PgExecutor<'_>, slug: &str) -> Result<Option<Self>> {
        let service = sqlx::query_as::<_, Service>("SELECT * FROM services WHERE slug = $1")
            .bind(slug)
            .fetch_optional(executor)
            .await?;
        Ok(service)
    }
}

/// A directed, weighted edge in the dependency graph. Attribution treats this
/// as a lookup relation — it never traverses more than one hop.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ServiceDependency {
    pub id: crate::id::ServiceDependencyId,
    pub service_id: ServiceId,
    pub depends_on_service_id: ServiceId,
    pub dependency_type: ServiceDependencyType,
    pub weight: f64,
    pub created_at: DateTime<Utc>,
}

impl ServiceDependency {
    pub async fn list_for_service(
        executor: impl PgExecutor<'_>,
        service_id: ServiceId,
    ) -> Result<Vec<Self>> {
        let deps = sqlx::query_as::<_, ServiceDependency>(
            "SELECT * FROM service_dependencies WHERE service_id = $1",
        )
        .bind(service_id)
        .fetch_all(executor)
        .await?;
        Ok(deps)
    }
}
