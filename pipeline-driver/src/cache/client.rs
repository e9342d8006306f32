// Cache Client
// Fingerprint index of finished executions, keyed by pipeline and namespace

use crate::error::DriverResult;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// One recorded (fingerprint -> execution) mapping
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// `pipeline/<name>`
    pub pipeline_name: String,
    pub namespace: String,
    pub run_id: String,
    pub execution_id: i64,
    pub created_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub fingerprint: String,
}

/// Remote cache index
#[async_trait]
pub trait CacheClient: Send + Sync {
    /// Execution id previously recorded for the fingerprint, if any
    async fn get_execution_cache(
        &self,
        fingerprint: &str,
        pipeline_name: &str,
        namespace: &str,
    ) -> DriverResult<Option<i64>>;

    async fn create_execution_cache(&self, entry: CacheEntry) -> DriverResult<()>;
}

type CacheIndexKey = (String, String, String);

/// In-process cache index
#[derive(Debug, Clone, Default)]
pub struct MemoryCache {
    entries: Arc<RwLock<HashMap<CacheIndexKey, CacheEntry>>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn entries(&self) -> Vec<CacheEntry> {
        let entries = self.entries.read().await;
        let mut all: Vec<CacheEntry> = entries.values().cloned().collect();
        all.sort_by_key(|e| e.execution_id);
        all
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl CacheClient for MemoryCache {
    async fn get_execution_cache(
        &self,
        fingerprint: &str,
        pipeline_name: &str,
        namespace: &str,
    ) -> DriverResult<Option<i64>> {
        let entries = self.entries.read().await;
        let key = (
            fingerprint.to_string(),
            pipeline_name.to_string(),
            namespace.to_string(),
        );
        Ok(entries.get(&key).map(|e| e.execution_id))
    }

    async fn create_execution_cache(&self, entry: CacheEntry) -> DriverResult<()> {
        let key = (
            entry.fingerprint.clone(),
            entry.pipeline_name.clone(),
            entry.namespace.clone(),
        );
        // Latest finished execution wins
        self.entries.write().await.insert(key, entry);
        Ok(())
    }
}
