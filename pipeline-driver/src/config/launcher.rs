// Launcher Config
// The optional kfp-launcher config map: default pipeline root and bucket providers

use crate::config::session::{store_session_info, BucketProviders, SessionInfo};
use crate::error::{DriverError, DriverResult};

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use tracing::info;

pub const LAUNCHER_CONFIG_MAP_NAME: &str = "kfp-launcher";
pub const CONFIG_KEY_DEFAULT_PIPELINE_ROOT: &str = "defaultPipelineRoot";
pub const CONFIG_KEY_PROVIDERS: &str = "providers";
pub const DEFAULT_PIPELINE_ROOT: &str = "minio://mlpipeline/v2/artifacts";

/// Contents of the launcher config map
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LauncherConfig {
    data: BTreeMap<String, String>,
}

impl LauncherConfig {
    pub fn new(data: BTreeMap<String, String>) -> Self {
        Self { data }
    }

    pub fn with_entry(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.data.get(key).map(String::as_str).filter(|v| !v.is_empty())
    }

    /// Configured default pipeline root, or the built-in minio location
    pub fn default_pipeline_root(&self) -> String {
        self.get(CONFIG_KEY_DEFAULT_PIPELINE_ROOT)
            .unwrap_or(DEFAULT_PIPELINE_ROOT)
            .to_string()
    }

    pub fn bucket_providers(&self) -> DriverResult<Option<BucketProviders>> {
        self.get(CONFIG_KEY_PROVIDERS)
            .map(BucketProviders::from_yaml)
            .transpose()
    }

    pub fn store_session_info(&self, pipeline_root: &str) -> DriverResult<SessionInfo> {
        let providers = self.bucket_providers()?;
        store_session_info(pipeline_root, providers.as_ref())
    }
}

/// Where the launcher config map is read from
#[async_trait]
pub trait LauncherConfigSource: Send + Sync {
    /// `None` when the config map does not exist
    async fn load(&self, namespace: &str) -> DriverResult<Option<LauncherConfig>>;
}

/// A config map mounted as a directory with one file per key
#[derive(Debug, Clone)]
pub struct MountedConfigMap {
    dir: PathBuf,
}

impl MountedConfigMap {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl LauncherConfigSource for MountedConfigMap {
    async fn load(&self, namespace: &str) -> DriverResult<Option<LauncherConfig>> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                info!(
                    name = LAUNCHER_CONFIG_MAP_NAME,
                    namespace,
                    "cannot find launcher configmap, will use default config"
                );
                return Ok(None);
            }
            Err(e) => {
                return Err(DriverError::infrastructure(format!(
                    "failed to read launcher config {}: {}",
                    self.dir.display(),
                    e
                )))
            }
        };

        let mut data = BTreeMap::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().to_string();
            // Kubernetes mounts keep their bookkeeping under `..data` style names
            if name.starts_with('.') {
                continue;
            }
            let path = entry.path();
            if !tokio::fs::metadata(&path).await?.is_file() {
                continue;
            }
            data.insert(name, tokio::fs::read_to_string(&path).await?);
        }
        Ok(Some(LauncherConfig::new(data)))
    }
}

/// A fixed launcher config, or none at all
#[derive(Debug, Clone, Default)]
pub struct StaticLauncherConfig {
    config: Option<LauncherConfig>,
}

impl StaticLauncherConfig {
    pub fn new(config: LauncherConfig) -> Self {
        Self {
            config: Some(config),
        }
    }

    pub fn missing() -> Self {
        Self { config: None }
    }
}

#[async_trait]
impl LauncherConfigSource for StaticLauncherConfig {
    async fn load(&self, _namespace: &str) -> DriverResult<Option<LauncherConfig>> {
        Ok(self.config.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_default_pipeline_root() {
        assert_eq!(
            LauncherConfig::default().default_pipeline_root(),
            DEFAULT_PIPELINE_ROOT
        );
        let config = LauncherConfig::default()
            .with_entry(CONFIG_KEY_DEFAULT_PIPELINE_ROOT, "s3://team-bucket/pipelines");
        assert_eq!(config.default_pipeline_root(), "s3://team-bucket/pipelines");

        let empty = LauncherConfig::default().with_entry(CONFIG_KEY_DEFAULT_PIPELINE_ROOT, "");
        assert_eq!(empty.default_pipeline_root(), DEFAULT_PIPELINE_ROOT);
    }

    #[test]
    fn test_malformed_providers() {
        let config = LauncherConfig::default().with_entry(CONFIG_KEY_PROVIDERS, "minio: [unclosed");
        let err = config.bucket_providers().unwrap_err();
        assert!(err.to_string().contains("providers config is well formed"));
    }

    #[tokio::test]
    async fn test_mounted_config_map() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(
            temp_dir.path().join(CONFIG_KEY_DEFAULT_PIPELINE_ROOT),
            "gs://team-bucket/root",
        )
        .unwrap();
        fs::create_dir(temp_dir.path().join("..2024_01_01")).unwrap();
        fs::write(temp_dir.path().join("..data"), "ignored").unwrap();

        let source = MountedConfigMap::new(temp_dir.path());
        let config = source.load("kubeflow").await.unwrap().unwrap();
        assert_eq!(config.default_pipeline_root(), "gs://team-bucket/root");
        assert_eq!(config.get("..data"), None);
    }

    #[tokio::test]
    async fn test_missing_config_map_is_not_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let source = MountedConfigMap::new(temp_dir.path().join("absent"));
        assert!(source.load("kubeflow").await.unwrap().is_none());
        assert!(StaticLauncherConfig::missing().load("kubeflow").await.unwrap().is_none());
    }
}
