//! Resource registry: publish and resolve resource identifiers by logical
//! name so independently deployed components can find each other.
//!
//! Names are scoped per deployment (`/{scope}/{name}`). Writes are
//! unconditional upserts; the last publisher of a name wins.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use pipeline_storage::{ParameterRecord, PipelineStorage};

use crate::error::RegistryError;

/// Backoff for transient store failures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts including the first. `1` disables retries.
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub multiplier: u32,
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 3,
            initial_backoff_ms: 100,
            multiplier: 2,
            max_backoff_ms: 2_000,
        }
    }
}

impl RetryPolicy {
    /// Never retry.
    pub fn none() -> Self {
        RetryPolicy {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay before the attempt following failed attempt number `attempt`
    /// (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = u64::from(self.multiplier.max(1)).saturating_pow(attempt.saturating_sub(1));
        let ms = self
            .initial_backoff_ms
            .saturating_mul(factor)
            .min(self.max_backoff_ms);
        Duration::from_millis(ms)
    }
}

/// A published entry as seen from inside a scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegistryEntry {
    /// Logical name, without the scope prefix.
    pub name: String,
    pub value: String,
}

#[derive(Clone)]
pub struct ResourceRegistry {
    storage: Arc<dyn PipelineStorage>,
    scope: String,
}

impl ResourceRegistry {
    pub fn new(storage: Arc<dyn PipelineStorage>, scope: impl Into<String>) -> Self {
        ResourceRegistry {
            storage,
            scope: scope.into().trim_matches('/').to_string(),
        }
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    fn prefix(&self) -> String {
        if self.scope.is_empty() {
            "/".to_string()
        } else {
            format!("/{}/", self.scope)
        }
    }

    /// Fully qualified storage key for a logical name.
    pub fn qualify(&self, name: &str) -> Result<String, RegistryError> {
        let logical = name.trim_start_matches('/');
        if logical.is_empty() || logical.chars().any(char::is_whitespace) {
            return Err(RegistryError::InvalidName {
                name: name.to_string(),
            });
        }
        Ok(format!("{}{}", self.prefix(), logical))
    }

    /// Publish `value` under `name`, replacing any previous value.
    #[tracing::instrument(skip(self, value), fields(scope = %self.scope))]
    pub async fn publish(&self, name: &str, value: &str) -> Result<(), RegistryError> {
        let key = self.qualify(name)?;
        self.storage.put_parameter(&key, value).await?;
        debug!(key = %key, "resource published");
        Ok(())
    }

    /// Current value of `name`, or `None` if it was never published.
    pub async fn resolve(&self, name: &str) -> Result<Option<String>, RegistryError> {
        let key = self.qualify(name)?;
        Ok(self.storage.get_parameter(&key).await?)
    }

    /// Like [`resolve`](Self::resolve), but absence is an error.
    ///
    /// Use this where a missing entry means the producer has not been
    /// deployed yet; the caller should stop rather than wait.
    pub async fn require(&self, name: &str) -> Result<String, RegistryError> {
        self.resolve(name)
            .await?
            .ok_or_else(|| RegistryError::Unresolved {
                name: name.to_string(),
            })
    }

    /// Publish, retrying store unavailability per `policy`.
    pub async fn publish_with_retry(
        &self,
        name: &str,
        value: &str,
        policy: &RetryPolicy,
    ) -> Result<(), RegistryError> {
        retrying(name, policy, || self.publish(name, value)).await
    }

    /// Resolve, retrying store unavailability per `policy`. A missing entry
    /// is returned at once as `Ok(None)`; it is never retried.
    pub async fn resolve_with_retry(
        &self,
        name: &str,
        policy: &RetryPolicy,
    ) -> Result<Option<String>, RegistryError> {
        retrying(name, policy, || self.resolve(name)).await
    }

    /// Every entry published in this scope, ordered by name.
    pub async fn entries(&self) -> Result<Vec<RegistryEntry>, RegistryError> {
        let prefix = self.prefix();
        let records = self.storage.list_parameters(&prefix).await?;
        Ok(records
            .into_iter()
            .map(|ParameterRecord { name, value }| RegistryEntry {
                name: name[prefix.len()..].to_string(),
                value,
            })
            .collect())
    }
}

async fn retrying<T, F, Fut>(name: &str, policy: &RetryPolicy, op: F) -> Result<T, RegistryError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, RegistryError>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Err(e) if e.is_transient() && attempt < policy.max_attempts => {
                let delay = policy.backoff(attempt);
                warn!(
                    resource = name,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "registry store unavailable, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            other => return other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipeline_storage::{FlakyStorage, MemoryStorage};

    fn registry(scope: &str) -> ResourceRegistry {
        ResourceRegistry::new(Arc::new(MemoryStorage::new()), scope)
    }

    fn fast_retry(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_backoff_ms: 1,
            multiplier: 2,
            max_backoff_ms: 5,
        }
    }

    #[tokio::test]
    async fn resolve_before_publish_is_none() {
        let r = registry("prod");
        assert_eq!(r.resolve("landing-bucket").await.unwrap(), None);
    }

    #[tokio::test]
    async fn publish_then_resolve_last_write_wins() {
        let r = registry("prod");
        r.publish("etl-role", "arn:role/v1").await.unwrap();
        assert_eq!(
            r.resolve("etl-role").await.unwrap().as_deref(),
            Some("arn:role/v1")
        );
        r.publish("etl-role", "arn:role/v2").await.unwrap();
        assert_eq!(
            r.resolve("etl-role").await.unwrap().as_deref(),
            Some("arn:role/v2")
        );
    }

    #[tokio::test]
    async fn scopes_do_not_see_each_other() {
        let storage: Arc<dyn PipelineStorage> = Arc::new(MemoryStorage::new());
        let prod = ResourceRegistry::new(storage.clone(), "prod");
        let dev = ResourceRegistry::new(storage, "dev");
        prod.publish("layer", "arn:layer:7").await.unwrap();
        assert_eq!(dev.resolve("layer").await.unwrap(), None);
    }

    #[tokio::test]
    async fn require_reports_deploy_ordering_error() {
        let r = registry("prod");
        match r.require("catalog-db").await {
            Err(RegistryError::Unresolved { name }) => assert_eq!(name, "catalog-db"),
            other => panic!("expected Unresolved, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn invalid_names_are_rejected() {
        let r = registry("prod");
        assert!(matches!(
            r.publish("", "x").await,
            Err(RegistryError::InvalidName { .. })
        ));
        assert!(matches!(
            r.resolve("has space").await,
            Err(RegistryError::InvalidName { .. })
        ));
    }

    #[test]
    fn qualify_strips_leading_slashes() {
        let r = registry("/prod/");
        assert_eq!(r.qualify("/a/b").unwrap(), "/prod/a/b");
        let unscoped = registry("");
        assert_eq!(unscoped.qualify("a").unwrap(), "/a");
    }

    #[tokio::test]
    async fn entries_strip_scope_prefix() {
        let r = registry("prod");
        r.publish("b", "2").await.unwrap();
        r.publish("a", "1").await.unwrap();
        let entries = r.entries().await.unwrap();
        let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn unavailable_store_surfaces_as_transient_error() {
        let storage = FlakyStorage::new();
        storage.set_down(true);
        let r = ResourceRegistry::new(Arc::new(storage), "prod");
        let err = r.resolve("x").await.unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn resolve_with_retry_recovers_from_transient_failures() {
        let storage = FlakyStorage::new();
        let r = ResourceRegistry::new(Arc::new(storage.clone()), "prod");
        r.publish("bucket", "fsa-final").await.unwrap();

        storage.fail_next(2);
        let value = r.resolve_with_retry("bucket", &fast_retry(3)).await.unwrap();
        assert_eq!(value.as_deref(), Some("fsa-final"));
    }

    #[tokio::test]
    async fn resolve_with_retry_gives_up_after_max_attempts() {
        let storage = FlakyStorage::new();
        let r = ResourceRegistry::new(Arc::new(storage.clone()), "prod");
        storage.set_down(true);
        let before = storage.calls();
        let err = r.resolve_with_retry("bucket", &fast_retry(3)).await.unwrap_err();
        assert!(err.is_transient());
        assert_eq!(storage.calls() - before, 3);
    }

    #[tokio::test]
    async fn not_found_is_never_retried() {
        let storage = FlakyStorage::new();
        let r = ResourceRegistry::new(Arc::new(storage.clone()), "prod");
        let value = r.resolve_with_retry("missing", &fast_retry(5)).await.unwrap();
        assert_eq!(value, None);
        assert_eq!(storage.calls(), 1);
    }

    #[test]
    fn backoff_grows_and_caps() {
        let p = RetryPolicy {
            max_attempts: 10,
            initial_backoff_ms: 100,
            multiplier: 2,
            max_backoff_ms: 500,
        };
        assert_eq!(p.backoff(1), Duration::from_millis(100));
        assert_eq!(p.backoff(2), Duration::from_millis(200));
        assert_eq!(p.backoff(3), Duration::from_millis(400));
        assert_eq!(p.backoff(4), Duration::from_millis(500));
    }
}
