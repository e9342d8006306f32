// Provider Registry
// Named factories for run-registration providers, built once at startup

use crate::error::{DriverError, DriverResult};
use crate::metadata::run::{MemoryRunRegistry, RunRegistration};

use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Builds a run-registration client from provider-specific config
pub type ProviderFactory =
    Arc<dyn Fn(&Value) -> DriverResult<Arc<dyn RunRegistration>> + Send + Sync>;

/// Name of the built-in in-memory provider
pub const MEMORY_PROVIDER: &str = "memory";

/// Explicit provider registry, passed to whoever needs to instantiate a provider
#[derive(Clone)]
pub struct ProviderRegistry {
    factories: BTreeMap<String, ProviderFactory>,
}

impl ProviderRegistry {
    /// Registry containing only the built-in providers
    pub fn new() -> Self {
        Self::empty().with_provider(MEMORY_PROVIDER, |_config| {
            Ok(Arc::new(MemoryRunRegistry::new()) as Arc<dyn RunRegistration>)
        })
    }

    pub fn empty() -> Self {
        Self {
            factories: BTreeMap::new(),
        }
    }

    /// Register a provider, replacing any previous one with the same name
    pub fn with_provider<F>(mut self, name: impl Into<String>, factory: F) -> Self
    where
        F: Fn(&Value) -> DriverResult<Arc<dyn RunRegistration>> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Arc::new(factory));
        self
    }

    pub fn lookup(&self, name: &str) -> Option<&ProviderFactory> {
        self.factories.get(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }

    pub fn create(&self, name: &str, config: &Value) -> DriverResult<Arc<dyn RunRegistration>> {
        let factory = self.lookup(name).ok_or_else(|| {
            DriverError::validation(format!("unsupported metadata provider: {}", name))
        })?;
        factory(config)
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.names())
            .finish()
    }
}
