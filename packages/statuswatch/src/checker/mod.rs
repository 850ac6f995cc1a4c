//! Probe primitives: a `Check` is one HTTP probe, a `ServiceChecker` is a
//! named service's ordered list of checks plus its declared dependencies.
//! Stateless and pure except for the HTTP client each check is handed.

mod http_client;
mod proxy;
mod registry;

pub use http_client::{BoundedHttpClient, BoundedResponse};
pub use proxy::{NoopProxyResolver, ProxyResolver};
pub use registry::CheckerRegistry;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Semaphore;

/// The in-memory outcome of one probe execution.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CheckResult {
    pub check_key: String,
    pub status: CheckOutcomeStatus,
    pub observed_at: DateTime<Utc>,
    pub latency_ms: Option<i32>,
    pub http_status: Option<i32>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub metadata: Value,
}

/// Mirrors [`crate::models::CheckStatus`] but lives in the checker layer so
/// this module has no dependency on the persistence layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckOutcomeStatus {
    Up,
    Degraded,
    Down,
}

impl From<CheckOutcomeStatus> for crate::models::CheckStatus {
    fn from(value: CheckOutcomeStatus) -> Self {
        match value {
            CheckOutcomeStatus::Up => crate::models::CheckStatus::Up,
            CheckOutcomeStatus::Degraded => crate::models::CheckStatus::Degraded,
            CheckOutcomeStatus::Down => crate::models::CheckStatus::Down,
        }
    }
}

pub const ERROR_CODE_TIMEOUT: &str = "TIMEOUT";
pub const ERROR_CODE_EXECUTION: &str = "CHECK_EXECUTION_ERROR";

/// One HTTP probe bound to a single endpoint.
#[async_trait]
pub trait Check: Send + Sync {
    fn check_key(&self) -> &str;
    fn timeout_seconds(&self) -> u64;

    /// The probe body. May return any status; may panic-free-error via
    /// `anyhow::Error` — the envelope converts failures, it never propagates them.
    async fn run(&self, client: &BoundedHttpClient) -> anyhow::Result<CheckResult>;

    /// Wraps `run` with a hard timeout. Never propagates a failure: timeouts
    /// and thrown errors both become a `down` `CheckResult`.
    async fn execute(&self, client: &BoundedHttpClient) -> CheckResult {
        let timeout = Duration::from_secs(self.timeout_seconds());
        match tokio::time::timeout(timeout, self.run(client)).await {
            Ok(Ok(mut result)) => {
                if result.check_key.is_empty() {
                    result.check_key = self.check_key().to_string();
                }
                result
            }
            Ok(Err(err)) => CheckResult {
                check_key: self.check_key().to_string(),
                status: CheckOutcomeStatus::Down,
                observed_at: Utc::now(),
                latency_ms: None,
                http_status: None,
                error_code: Some(ERROR_CODE_EXECUTION.to_string()),
                error_message: Some(err.to_string()),
                metadata: Value::Object(Default::default()),
            },
            Err(_) => CheckResult {
                check_key: self.check_key().to_string(),
                status: CheckOutcomeStatus::Down,
                observed_at: Utc::now(),
                latency_ms: None,
                http_status: None,
                error_code: Some(ERROR_CODE_TIMEOUT.to_string()),
                error_message: Some(format!(
                    "Check timed out after {}s",
                    self.timeout_seconds()
                )),
                metadata: Value::Object(Default::default()),
            },
        }
    }
}

/// Maps an HTTP status code to the default check status, per the fan-out
/// contract: `>= 500` is down, `[400, 500)` is degraded, everything else up.
pub fn status_from_http_code(status: u16) -> CheckOutcomeStatus {
    if status >= 500 {
        CheckOutcomeStatus::Down
    } else if status >= 400 {
        CheckOutcomeStatus::Degraded
    } else {
        CheckOutcomeStatus::Up
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum WeightError {
    #[error("weight {0} for check {1:?} is out of range (0, 1]")]
    OutOfRange(f64, String),
    #[error("sum of explicit weights {0} exceeds 1 + 1e-9")]
    SumExceedsOne(f64),
    #[error("checks omit weight but remaining mass {0} is not greater than 1e-9")]
    NoRemainingMass(f64),
    #[error("all checks specify weight but sum {0} does not equal 1 within 1e-9")]
    SumNotOne(f64),
}

const WEIGHT_TOLERANCE: f64 = 1e-9;

/// A single check's declared configuration, prior to weight resolution.
#[derive(Debug, Clone)]
pub struct CheckSpec {
    pub check_key: String,
    pub weight: Option<f64>,
}

/// Resolved form: every check carries a concrete weight, guaranteed to sum
/// to 1 across the input.
#[derive(Debug, Clone)]
pub struct ResolvedCheckWeight {
    pub check_key: String,
    pub weight: f64,
}

/// Validates and fills in check weights per the five-step algorithm: reject
/// out-of-range explicit weights, reject explicit sums over budget, spread
/// unspecified mass equally, and require an exact partition when every check
/// specifies its own weight.
pub fn resolve_check_weights(specs: &[CheckSpec]) -> Result<Vec<ResolvedCheckWeight>, WeightError> {
    for spec in specs {
        if let Some(w) = spec.weight {
            if !(w > 0.0 && w <= 1.0) {
                return Err(WeightError::OutOfRange(w, spec.check_key.clone()));
            }
        }
    }

    let explicit_sum: f64 = specs.iter().filter_map(|s| s.weight).sum();
    if explicit_sum > 1.0 + WEIGHT_TOLERANCE {
        return Err(WeightError::SumExceedsOne(explicit_sum));
    }

    let unspecified: Vec<&CheckSpec> = specs.iter().filter(|s| s.weight.is_none()).collect();

    if unspecified.is_empty() {
        if (explicit_sum - 1.0).abs() > WEIGHT_TOLERANCE {
            return Err(WeightError::SumNotOne(explicit_sum));
        }
        return Ok(specs
            .iter()
            .map(|s| ResolvedCheckWeight {
                check_key: s.check_key.clone(),
                weight: s.weight.expect("checked above"),
            })
            .collect());
    }

    let remainder = 1.0 - explicit_sum;
    if remainder <= WEIGHT_TOLERANCE {
        return Err(WeightError::NoRemainingMass(remainder));
    }
    let share = remainder / unspecified.len() as f64;

    Ok(specs
        .iter()
        .map(|s| ResolvedCheckWeight {
            check_key: s.check_key.clone(),
            weight: s.weight.unwrap_or(share),
        })
        .collect())
}

/// A named service's ordered checks and declared dependency keys. Dependency
/// resolution (looking up latest snapshot status) happens outside this type,
/// in [`crate::scoring`] — here dependencies are just an edge list.
pub struct ServiceChecker {
    pub service_key: String,
    pub checks: Vec<Box<dyn Check>>,
}

impl ServiceChecker {
    pub fn new(service_key: impl Into<String>, checks: Vec<Box<dyn Check>>) -> Self {
        Self {
            service_key: service_key.into(),
            checks,
        }
    }

    /// Executes every check concurrently against a single shared client,
    /// bounded by `checker_concurrency`. Individual failures are captured as
    /// `down` results (via [`Check::execute`]) and never abort peers.
    pub async fn run_all(
        &self,
        client: &BoundedHttpClient,
        checker_concurrency: usize,
    ) -> Vec<CheckResult> {
        let semaphore = Semaphore::new(checker_concurrency.max(1));
        let futures = self.checks.iter().map(|check| {
            let semaphore = &semaphore;
            async move {
                let _permit = semaphore.acquire().await.expect("semaphore not closed");
                check.execute(client).await
            }
        });
        join_all(futures).await
    }
}
