// Config Module
// Process configuration, launcher config map access and store session info

pub mod launcher;
pub mod session;

pub use launcher::{
    LauncherConfig, LauncherConfigSource, MountedConfigMap, StaticLauncherConfig,
    DEFAULT_PIPELINE_ROOT,
};
pub use session::{
    store_session_info, AuthConfig, BucketConfig, BucketProviders, ProviderConfig, SecretRef,
    SessionInfo,
};

use crate::error::{DriverError, DriverResult};
use crate::metadata::MEMORY_PROVIDER;
use crate::options::ProxyConfig;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_LAUNCHER_PATH: &str = "/kfp-launcher/launch";
pub const DEFAULT_LAUNCHER_CONFIG_DIR: &str = "/etc/kfp-launcher";
pub const DEFAULT_NAMESPACE_FILE: &str = "/var/run/secrets/kubernetes.io/serviceaccount/namespace";

/// Images that stand for platform-only operations with no user container
pub fn default_dummy_images() -> Vec<String> {
    vec![
        "argostub/createpvc".to_string(),
        "argostub/deletepvc".to_string(),
    ]
}

/// Driver process configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    pub port: u16,
    pub launcher_path: String,
    pub dummy_images: Vec<String>,
    pub launcher_config_dir: PathBuf,
    pub namespace_file: PathBuf,
    pub run_registration_provider: String,
    pub proxy: ProxyConfig,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            launcher_path: DEFAULT_LAUNCHER_PATH.to_string(),
            dummy_images: default_dummy_images(),
            launcher_config_dir: PathBuf::from(DEFAULT_LAUNCHER_CONFIG_DIR),
            namespace_file: PathBuf::from(DEFAULT_NAMESPACE_FILE),
            run_registration_provider: MEMORY_PROVIDER.to_string(),
            proxy: ProxyConfig::default(),
        }
    }
}

impl DriverConfig {
    /// Load from a YAML file; absent keys keep their defaults
    pub fn from_file(path: impl AsRef<Path>) -> DriverResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            DriverError::infrastructure(format!(
                "failed to read driver config {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> DriverResult<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(content)?)
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_launcher_path(mut self, path: impl Into<String>) -> Self {
        self.launcher_path = path.into();
        self
    }

    pub fn with_dummy_images(mut self, images: Vec<String>) -> Self {
        self.dummy_images = images;
        self
    }

    pub fn with_launcher_config_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.launcher_config_dir = dir.into();
        self
    }

    pub fn with_namespace_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.namespace_file = path.into();
        self
    }

    pub fn with_run_registration_provider(mut self, provider: impl Into<String>) -> Self {
        self.run_registration_provider = provider.into();
        self
    }

    pub fn with_proxy(mut self, proxy: ProxyConfig) -> Self {
        self.proxy = proxy;
        self
    }

    pub fn is_dummy_image(&self, image: &str) -> bool {
        self.dummy_images.iter().any(|i| i == image)
    }

    pub fn launcher_config_source(&self) -> MountedConfigMap {
        MountedConfigMap::new(&self.launcher_config_dir)
    }
}

/// Namespace of the pod this process runs in
pub fn in_pod_namespace(path: impl AsRef<Path>) -> DriverResult<String> {
    let path = path.as_ref();
    let namespace = std::fs::read_to_string(path)
        .map_err(|e| DriverError::infrastructure(format!("failed to get namespace in Pod: {}", e)))?;
    Ok(namespace.trim().to_string())
}
