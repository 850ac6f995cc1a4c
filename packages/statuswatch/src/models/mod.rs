//! Row types and queries for every entity in the data model, one file per
//! table family. Every query lives here — nothing upstream hand-writes SQL.

mod check_job;
mod check_run;
mod incident;
mod service;
mod service_check;
mod snapshot;

pub use check_job::{CheckJob, CheckJobStatus};
pub use check_run::CheckRun;
pub use incident::{Incident, IncidentEvent, IncidentEventType, IncidentSeverity, IncidentStatus};
pub use service::{Service, ServiceDependency, ServiceDependencyType};
pub use service_check::ServiceCheck;
pub use snapshot::ServiceSnapshot;

/// Status shared by `CheckRun` and `ServiceSnapshot`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize, sqlx::Type)]
#[sqlx(type_name = "check_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Up,
    Degraded,
    Down,
}

impl std::fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CheckStatus::Up => "up",
            CheckStatus::Degraded => "degraded",
            CheckStatus::Down => "down",
        };
        f.write_str(s)
    }
}

impl CheckStatus {
    /// Ranking used for incident peak-severity comparisons (up is never a peak).
    pub fn severity_rank(self) -> u8 {
        match self {
            CheckStatus::Up => 0,
            CheckStatus::Degraded => 1,
            CheckStatus::Down => 2,
        }
    }
}
