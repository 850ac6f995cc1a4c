use anyhow::Result;
use url::Url;

/// Resolves a check's declared proxy setting (an opaque string stored on the
/// check definition) to a concrete forward-proxy URL. The concrete
/// implementation — typically backed by a secret manager — is an external
/// collaborator outside this crate; this trait is the seam it plugs into.
#[async_trait::async_trait]
pub trait ProxyResolver: Send + Sync {
    async fn resolve(&self, proxy_setting: &str) -> Result<Option<Url>>;
}

/// Resolves nothing. Used when a deployment has no proxy collaborator wired
/// up, or in tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopProxyResolver;

#[async_trait::async_trait]
impl ProxyResolver for NoopProxyResolver {
    async fn resolve(&self, _proxy_setting: &str) -> Result<Option<Url>> {
        Ok(None)
    }
}
