use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;

use super::Check;

/// A boxed constructor: given a check's declared weight (already resolved)
/// and key, produces a live `Check`. Registered once at process startup.
pub type CheckFactory = Arc<dyn Fn(String, u64) -> Box<dyn Check> + Send + Sync>;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("no check registered for class_path {0:?}")]
    UnknownClassPath(String),
}

/// Explicit, string-keyed factory map replacing dynamic class loading by
/// dotted path. Populated once via `register`, read many times via
/// `resolve` — the registry never instantiates on a caller's behalf, it
/// hands back a constructed `Check` from the factory the caller already
/// registered.
#[derive(Clone, Default)]
pub struct CheckerRegistry {
    factories: HashMap<String, CheckFactory>,
}

impl CheckerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, class_path: impl Into<String>, factory: CheckFactory) {
        self.factories.insert(class_path.into(), factory);
    }

    pub fn resolve(
        &self,
        class_path: &str,
        check_key: impl Into<String>,
        timeout_seconds: u64,
    ) -> Result<Box<dyn Check>, RegistryError> {
        let factory = self
            .factories
            .get(class_path)
            .ok_or_else(|| RegistryError::UnknownClassPath(class_path.to_string()))?;
        Ok(factory(check_key.into(), timeout_seconds))
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checker::{BoundedHttpClient, CheckOutcomeStatus, CheckResult};
    use async_trait::async_trait;
    use chrono::Utc;

    struct DummyCheck {
        key: String,
        timeout_seconds: u64,
    }

    #[async_trait]
    impl Check for DummyCheck {
        fn check_key(&self) -> &str {
            &self.key
        }

        fn timeout_seconds(&self) -> u64 {
            self.timeout_seconds
        }

        async fn run(&self, _client: &BoundedHttpClient) -> anyhow::Result<CheckResult> {
            Ok(CheckResult {
                check_key: self.key.clone(),
                status: CheckOutcomeStatus::Up,
                observed_at: Utc::now(),
                latency_ms: Some(10),
                http_status: Some(200),
                error_code: None,
                error_message: None,
                metadata: serde_json::json!({}),
            })
        }
    }

    #[test]
    fn resolve_unknown_class_path_errors() {
        let registry = CheckerRegistry::new();
        let err = registry.resolve("does.not.Exist", "k", 5).unwrap_err();
        assert!(matches!(err, RegistryError::UnknownClassPath(_)));
    }

    #[test]
    fn register_then_resolve_roundtrips() {
        let mut registry = CheckerRegistry::new();
        registry.register(
            "statuswatch.checks.Dummy",
            Arc::new(|key, timeout_seconds| {
                Box::new(DummyCheck {
                    key,
                    timeout_seconds,
                }) as Box<dyn Check>
            }),
        );
        let check = registry
            .resolve("statuswatch.checks.Dummy", "svc.ping", 5)
            .unwrap();
        assert_eq!(check.check_key(), "svc.ping");
    }
}
