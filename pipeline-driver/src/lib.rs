// Pipeline Driver Library
// Decides, for each node of a compiled pipeline DAG, what to record and what to launch

pub mod cache;
pub mod config;
pub mod driver;
pub mod error;
pub mod execution;
pub mod expression;
pub mod metadata;
pub mod options;
pub mod podspec;
pub mod resolver;
pub mod spec;

// Re-export commonly used types
pub use error::{DriverError, DriverResult, ErrorKind};

// Re-export driver types
pub use driver::{Driver, LoggingPlatformOps, PlatformOpHandler};
pub use execution::Execution;
pub use options::{DriverType, Options, ProxyConfig};

// Re-export configuration types
pub use config::{DriverConfig, LauncherConfig, LauncherConfigSource, MountedConfigMap};

// Re-export metadata types
pub use metadata::{
    ExecutionRecord, ExecutionState, MemoryRunRegistry, MemoryStore, MetadataStore,
    ProviderRegistry, RunRegistration,
};

// Re-export cache types
pub use cache::{CacheClient, CacheEngine, MemoryCache};

// Re-export pipeline IR types
pub use spec::{ComponentSpec, ContainerSpec, ExecutorInput, RuntimeConfig, TaskSpec};
