// Store Session
// Bucket parsing and object-store session parameters for a pipeline root

use crate::error::{DriverError, DriverResult};

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::OnceLock;

const DEFAULT_MINIO_ENDPOINT: &str = "minio-service.kubeflow:9000";
const MINIO_ARTIFACT_SECRET_NAME: &str = "mlpipeline-minio-artifact";
const MINIO_ARTIFACT_ACCESS_KEY_KEY: &str = "accesskey";
const MINIO_ARTIFACT_SECRET_KEY_KEY: &str = "secretkey";

fn bucket_pattern() -> DriverResult<&'static Regex> {
    static PATTERN: OnceLock<Result<Regex, regex::Error>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^([a-z][a-z0-9]+:///?)([^/?]+)(/[^?]*)?(\?.+)?$"))
        .as_ref()
        .map_err(|e| DriverError::infrastructure(format!("invalid bucket pattern: {}", e)))
}

/// A parsed pipeline root such as `minio://bucket/prefix/`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketConfig {
    pub scheme: String,
    pub bucket_name: String,
    /// Empty, or ends with '/'
    pub prefix: String,
    pub query_string: String,
}

impl BucketConfig {
    pub fn parse(path: &str) -> DriverResult<Self> {
        let captures = bucket_pattern()?.captures(path).ok_or_else(|| {
            DriverError::validation(format!(
                "parse bucket config failed: unrecognized pipeline root format: {:?}",
                path
            ))
        })?;
        let group = |i: usize| captures.get(i).map(|m| m.as_str()).unwrap_or("");

        let scheme = group(1);
        if !matches!(scheme, "gs://" | "s3://" | "minio://") {
            return Err(DriverError::validation(format!(
                "parse bucket config failed: unsupported Cloud bucket: {:?}",
                path
            )));
        }

        let mut prefix = group(3).trim_start_matches('/').to_string();
        if !prefix.is_empty() && !prefix.ends_with('/') {
            prefix.push('/');
        }

        Ok(Self {
            scheme: scheme.to_string(),
            bucket_name: group(2).to_string(),
            prefix,
            query_string: group(4).to_string(),
        })
    }

    /// Provider name derived from the scheme
    pub fn provider(&self) -> &str {
        self.scheme.trim_end_matches('/').trim_end_matches(':')
    }

    pub fn prefixed_bucket(&self) -> String {
        format!("{}{}/{}", self.scheme, self.bucket_name, self.prefix)
            .trim_end_matches('/')
            .to_string()
    }
}

/// Credentials reference inside a Kubernetes secret
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SecretRef {
    pub secret_name: String,
    pub access_key_key: String,
    pub secret_key_key: String,
}

/// Per-bucket/prefix override; the first match wins
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AuthConfig {
    pub bucket_name: String,
    pub key_prefix: String,
    pub region: Option<String>,
    pub endpoint: Option<String>,
    pub secret_ref: Option<SecretRef>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProviderConfig {
    pub endpoint: String,
    pub region: String,
    #[serde(rename = "disableSSL")]
    pub disable_ssl: bool,
    /// Credentials come from the executor environment (e.g. workload identity)
    pub from_env: bool,
    pub default_provider_secret_ref: Option<SecretRef>,
    pub auth_configs: Vec<AuthConfig>,
}

impl ProviderConfig {
    fn auth_config_for(&self, bucket: &BucketConfig) -> Option<&AuthConfig> {
        self.auth_configs
            .iter()
            .find(|a| a.bucket_name == bucket.bucket_name && bucket.prefix.starts_with(&a.key_prefix))
    }
}

/// The `providers` key of the launcher config map
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BucketProviders {
    pub minio: Option<ProviderConfig>,
    pub s3: Option<ProviderConfig>,
    pub gs: Option<ProviderConfig>,
}

impl BucketProviders {
    pub fn from_yaml(text: &str) -> DriverResult<Self> {
        serde_yaml::from_str(text).map_err(|e| {
            DriverError::validation(format!(
                "failed to unmarshall kfp bucket providers, ensure that providers config is well formed: {}",
                e
            ))
        })
    }

    fn provider(&self, name: &str) -> Option<&ProviderConfig> {
        match name {
            "minio" => self.minio.as_ref(),
            "s3" => self.s3.as_ref(),
            "gs" => self.gs.as_ref(),
            _ => None,
        }
    }
}

/// Object-store session parameters handed to the metadata store
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SessionInfo {
    #[serde(rename = "Provider")]
    pub provider: String,
    #[serde(rename = "Params")]
    pub params: BTreeMap<String, String>,
}

impl SessionInfo {
    pub fn default_minio() -> Self {
        let params = [
            ("region", "minio"),
            ("endpoint", DEFAULT_MINIO_ENDPOINT),
            ("disableSsl", "true"),
            ("fromEnv", "false"),
            ("secretName", MINIO_ARTIFACT_SECRET_NAME),
            ("accessKeyKey", MINIO_ARTIFACT_ACCESS_KEY_KEY),
            ("secretKeyKey", MINIO_ARTIFACT_SECRET_KEY_KEY),
        ];
        Self {
            provider: "minio".to_string(),
            params: params
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    fn from_env(provider: &str) -> Self {
        let mut params = BTreeMap::new();
        params.insert("fromEnv".to_string(), "true".to_string());
        Self {
            provider: provider.to_string(),
            params,
        }
    }

    pub fn to_json(&self) -> DriverResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Session info for a pipeline root given the optional providers config
pub fn store_session_info(
    pipeline_root: &str,
    providers: Option<&BucketProviders>,
) -> DriverResult<SessionInfo> {
    let bucket = BucketConfig::parse(pipeline_root)?;
    let provider = bucket.provider();

    let Some(config) = providers.and_then(|p| p.provider(provider)) else {
        return Ok(if provider == "minio" {
            SessionInfo::default_minio()
        } else {
            SessionInfo::from_env(provider)
        });
    };

    let invalid = |detail: &str| {
        DriverError::validation(format!(
            "invalid provider config: {}.{}",
            provider, detail
        ))
    };

    let override_config = config.auth_config_for(&bucket);

    let endpoint = override_config
        .and_then(|a| a.endpoint.clone())
        .unwrap_or_else(|| config.endpoint.clone());
    if endpoint.is_empty() {
        return Err(invalid("endpoint is required"));
    }
    let region = override_config
        .and_then(|a| a.region.clone())
        .unwrap_or_else(|| config.region.clone());

    let mut params = BTreeMap::new();
    params.insert("endpoint".to_string(), endpoint);
    params.insert("region".to_string(), region);
    params.insert("disableSsl".to_string(), config.disable_ssl.to_string());

    let secret = match override_config {
        Some(auth) => Some(
            auth.secret_ref
                .clone()
                .ok_or_else(|| invalid("authConfigs[].secretRef is required"))?,
        ),
        None => config.default_provider_secret_ref.clone(),
    };

    match secret {
        Some(secret) => {
            params.insert("fromEnv".to_string(), "false".to_string());
            params.insert("secretName".to_string(), secret.secret_name);
            params.insert("accessKeyKey".to_string(), secret.access_key_key);
            params.insert("secretKeyKey".to_string(), secret.secret_key_key);
        }
        None if config.from_env => {
            params.insert("fromEnv".to_string(), "true".to_string());
        }
        None => return Err(invalid("defaultProviderSecretRef is required")),
    }

    Ok(SessionInfo {
        provider: provider.to_string(),
        params,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bucket_config() {
        let bucket = BucketConfig::parse("minio://mlpipeline/v2/artifacts?region=x").unwrap();
        assert_eq!(bucket.scheme, "minio://");
        assert_eq!(bucket.bucket_name, "mlpipeline");
        assert_eq!(bucket.prefix, "v2/artifacts/");
        assert_eq!(bucket.query_string, "?region=x");
        assert_eq!(bucket.provider(), "minio");
        assert_eq!(bucket.prefixed_bucket(), "minio://mlpipeline/v2/artifacts");

        let bucket = BucketConfig::parse("gs://my-bucket").unwrap();
        assert_eq!(bucket.prefix, "");
        assert_eq!(bucket.provider(), "gs");
    }

    #[test]
    fn test_parse_bucket_config_errors() {
        let err = BucketConfig::parse("minio.unsupported.format").unwrap_err();
        assert!(err.to_string().contains("unrecognized pipeline root format"));
        let err = BucketConfig::parse("unsupported://my-bucket/v2/artifacts").unwrap_err();
        assert!(err.to_string().contains("unsupported Cloud bucket"));
    }

    #[test]
    fn test_session_without_providers() {
        let info = store_session_info("minio://my-bucket/v2/artifacts", None).unwrap();
        assert_eq!(info, SessionInfo::default_minio());
        assert_eq!(info.params["endpoint"], "minio-service.kubeflow:9000");
        assert_eq!(info.params["secretName"], "mlpipeline-minio-artifact");

        let info = store_session_info("s3://my-bucket/v2/artifacts", None).unwrap();
        assert_eq!(info.provider, "s3");
        assert_eq!(info.params["fromEnv"], "true");
    }

    #[test]
    fn test_session_first_matching_auth_config() {
        let providers = BucketProviders::from_yaml(
            r#"
minio:
  endpoint: minio.endpoint.com
  region: minio
  defaultProviderSecretRef:
    secretName: minio-default
    accessKeyKey: default_access
    secretKeyKey: default_secret
  authConfigs:
    - bucketName: my-bucket
      keyPrefix: v2/artifacts/skip/this
      secretRef:
        secretName: skip-secret
        accessKeyKey: skip_access
        secretKeyKey: skip_secret
    - bucketName: my-bucket
      keyPrefix: v2/artifacts/pick/this
      region: minio-a
      secretRef:
        secretName: pick-secret
        accessKeyKey: pick_access
        secretKeyKey: pick_secret
"#,
        )
        .unwrap();

        let info =
            store_session_info("minio://my-bucket/v2/artifacts/pick/this", Some(&providers)).unwrap();
        assert_eq!(info.params["secretName"], "pick-secret");
        assert_eq!(info.params["region"], "minio-a");
        assert_eq!(info.params["endpoint"], "minio.endpoint.com");

        let info = store_session_info("minio://other-bucket/v2", Some(&providers)).unwrap();
        assert_eq!(info.params["secretName"], "minio-default");
        assert_eq!(info.params["disableSsl"], "false");
    }

    #[test]
    fn test_session_invalid_provider_config() {
        let providers = BucketProviders::from_yaml("minio:\n  endpoint: minio.endpoint.com\n").unwrap();
        let err = store_session_info("minio://my-bucket/v2", Some(&providers)).unwrap_err();
        assert!(err.to_string().contains("invalid provider config"));

        let providers = BucketProviders::from_yaml("minio: {}\n").unwrap();
        let err = store_session_info("minio://my-bucket/v2", Some(&providers)).unwrap_err();
        assert!(err.to_string().contains("endpoint is required"));

        let providers = BucketProviders::from_yaml("s3:\n  endpoint: s3.amazonaws.com\n  fromEnv: true\n").unwrap();
        let info = store_session_info("s3://b/p", Some(&providers)).unwrap();
        assert_eq!(info.params["fromEnv"], "true");
    }

    #[test]
    fn test_session_info_json_shape() {
        let json = SessionInfo::default_minio().to_json().unwrap();
        assert!(json.starts_with("{\"Provider\":\"minio\",\"Params\":{"));
    }
}
