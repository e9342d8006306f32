// Cache Module
// Fingerprinting, lookup and recording of reusable container executions

pub mod client;
pub mod fingerprint;

pub use client::{CacheClient, CacheEntry, MemoryCache};
pub use fingerprint::{to_canonical_json, CacheKey, ContainerKey, InputArtifactKey};

use crate::error::{DriverError, DriverResult, ResultExt};
use crate::options::Options;
use crate::spec::ExecutorInput;

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::debug;

/// Key under which a pipeline's cache entries are indexed
pub fn pipeline_cache_key(pipeline_name: &str) -> String {
    format!("pipeline/{}", pipeline_name)
}

/// Cache operations used by the container driver
#[derive(Clone)]
pub struct CacheEngine {
    client: Arc<dyn CacheClient>,
}

impl CacheEngine {
    pub fn new(client: Arc<dyn CacheClient>) -> Self {
        Self { client }
    }

    pub fn with_memory_cache() -> Self {
        Self::new(Arc::new(MemoryCache::new()))
    }

    pub fn client(&self) -> &Arc<dyn CacheClient> {
        &self.client
    }

    pub fn fingerprint(&self, options: &Options, executor_input: &ExecutorInput) -> DriverResult<String> {
        fingerprint::fingerprint(options, executor_input)
            .context("failure while getting fingerPrint")
    }

    /// Id of a previous execution with the same fingerprint; a miss is `None`
    pub async fn lookup(
        &self,
        fingerprint: &str,
        pipeline_name: &str,
        namespace: &str,
    ) -> DriverResult<Option<i64>> {
        let cached = self
            .client
            .get_execution_cache(fingerprint, &pipeline_cache_key(pipeline_name), namespace)
            .await
            .context("failure while getting executionCache")?;
        debug!(fingerprint, cached_execution_id = ?cached, "cache lookup");
        Ok(cached)
    }

    /// Index a finished execution under its fingerprint.
    /// Called by the launcher once the task succeeds; the driver only reads entries.
    pub async fn record(
        &self,
        options: &Options,
        execution_id: i64,
        fingerprint: &str,
        start: DateTime<Utc>,
    ) -> DriverResult<()> {
        if execution_id == 0 {
            return Err(DriverError::validation(
                "cannot record cache entry: execution id is required",
            ));
        }
        let entry = CacheEntry {
            pipeline_name: pipeline_cache_key(&options.pipeline_name),
            namespace: options.namespace.clone(),
            run_id: options.run_id.clone(),
            execution_id,
            created_at: start,
            finished_at: Utc::now(),
            fingerprint: fingerprint.to_string(),
        };
        self.client
            .create_execution_cache(entry)
            .await
            .context("failed to create task in the cache")
    }
}

impl Default for CacheEngine {
    fn default() -> Self {
        Self::with_memory_cache()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    fn options() -> Options {
        Options {
            pipeline_name: "train".to_string(),
            run_id: "run-1".to_string(),
            namespace: "kubeflow".to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_record_then_lookup() {
        let cache = Arc::new(MemoryCache::new());
        let engine = CacheEngine::new(cache.clone());
        let opts = options();
        let start = Utc::now();

        assert_eq!(engine.lookup("fp", "train", "kubeflow").await.unwrap(), None);
        engine.record(&opts, 42, "fp", start).await.unwrap();
        assert_eq!(
            engine.lookup("fp", "train", "kubeflow").await.unwrap(),
            Some(42)
        );

        let entries = cache.entries().await;
        assert_eq!(entries[0].pipeline_name, "pipeline/train");
        assert_eq!(entries[0].run_id, "run-1");
        assert_eq!(entries[0].created_at, start);
        assert!(entries[0].finished_at >= start);
    }

    #[tokio::test]
    async fn test_record_rejects_missing_execution_id() {
        let engine = CacheEngine::with_memory_cache();
        let err = engine
            .record(&options(), 0, "fp", Utc::now())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("execution id is required"));
    }

    struct BrokenCache;

    #[async_trait]
    impl CacheClient for BrokenCache {
        async fn get_execution_cache(&self, _: &str, _: &str, _: &str) -> DriverResult<Option<i64>> {
            Err(DriverError::infrastructure("connection refused"))
        }

        async fn create_execution_cache(&self, _: CacheEntry) -> DriverResult<()> {
            Err(DriverError::infrastructure("connection refused"))
        }
    }

    #[tokio::test]
    async fn test_client_failures_propagate() {
        let engine = CacheEngine::new(Arc::new(BrokenCache));
        let err = engine.lookup("fp", "train", "kubeflow").await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "failure while getting executionCache: connection refused"
        );
        let err = engine
            .record(&options(), 1, "fp", Utc::now())
            .await
            .unwrap_err();
        assert!(err.to_string().starts_with("failed to create task in the cache"));
    }
}
