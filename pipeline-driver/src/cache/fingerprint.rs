// Cache Fingerprint
// Deterministic hash over a task's effective inputs, output types, command and image

use crate::error::{DriverError, DriverResult};
use crate::options::Options;
use crate::spec::{ArtifactTypeSchema, ExecutorInput};

use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Everything a cached execution must agree on to be reused
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheKey {
    pub input_artifacts: BTreeMap<String, Vec<InputArtifactKey>>,
    pub input_parameter_values: BTreeMap<String, Value>,
    pub output_artifacts_spec: BTreeMap<String, ArtifactTypeSchema>,
    pub output_parameters_spec: BTreeMap<String, String>,
    pub container_spec: ContainerKey,
}

/// A consumed artifact, identified by where it lives rather than only by its output key
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct InputArtifactKey {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub name: String,
    pub uri: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerKey {
    pub image: String,
    pub cmd_args: Vec<String>,
}

impl CacheKey {
    /// Build the key for a container task. Output artifact URIs are excluded:
    /// they carry a per-attempt salt.
    pub fn new(options: &Options, executor_input: &ExecutorInput) -> DriverResult<Self> {
        let container = options
            .container
            .as_ref()
            .ok_or_else(|| DriverError::validation("container spec is required"))?;

        let input_artifacts = executor_input
            .inputs
            .artifacts
            .iter()
            .map(|(name, list)| {
                let keys = list
                    .artifacts
                    .iter()
                    .map(|a| InputArtifactKey {
                        name: a.name.clone(),
                        uri: a.uri.clone(),
                    })
                    .collect();
                (name.clone(), keys)
            })
            .collect();

        let output_artifacts_spec = executor_input
            .outputs
            .iter()
            .flat_map(|outputs| outputs.artifacts.iter())
            .filter_map(|(name, list)| {
                list.first()
                    .map(|artifact| (name.clone(), artifact.artifact_type.clone()))
            })
            .collect();

        let output_parameters_spec = options
            .component
            .iter()
            .flat_map(|c| c.output_definitions.parameters.iter())
            .map(|(name, def)| (name.clone(), def.parameter_type.to_string()))
            .collect();

        let cmd_args = container
            .command
            .iter()
            .chain(container.args.iter())
            .cloned()
            .collect();

        Ok(Self {
            input_artifacts,
            input_parameter_values: executor_input.inputs.parameter_values.clone(),
            output_artifacts_spec,
            output_parameters_spec,
            container_spec: ContainerKey {
                image: container.image.clone(),
                cmd_args,
            },
        })
    }

    /// Hex SHA-256 of the key's canonical JSON
    pub fn fingerprint(&self) -> DriverResult<String> {
        let value = serde_json::to_value(self)?;
        let mut hasher = Sha256::new();
        hasher.update(to_canonical_json(&value).as_bytes());
        Ok(format!("{:x}", hasher.finalize()))
    }
}

/// Fingerprint of a container task about to run
pub fn fingerprint(options: &Options, executor_input: &ExecutorInput) -> DriverResult<String> {
    CacheKey::new(options, executor_input)?.fingerprint()
}

/// JSON text with object keys sorted at every level
pub fn to_canonical_json(value: &Value) -> String {
    match value {
        Value::Null | Value::Bool(_) | Value::Number(_) | Value::String(_) => value.to_string(),
        Value::Array(items) => {
            let items: Vec<String> = items.iter().map(to_canonical_json).collect();
            format!("[{}]", items.join(","))
        }
        Value::Object(map) => {
            let sorted: BTreeMap<&String, String> = map
                .iter()
                .map(|(k, v)| (k, to_canonical_json(v)))
                .collect();
            let items: Vec<String> = sorted
                .into_iter()
                .map(|(k, v)| format!("{}:{}", Value::String(k.clone()), v))
                .collect();
            format!("{{{}}}", items.join(","))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::{
        ArtifactList, ComponentSpec, ContainerSpec, ExecutorInputs, ExecutorOutputs,
        OutputParameterDefinition, ParameterType, RuntimeArtifact,
    };
    use serde_json::json;

    fn options() -> Options {
        let mut component = ComponentSpec::default();
        component.output_definitions.parameters.insert(
            "accuracy".to_string(),
            OutputParameterDefinition {
                parameter_type: ParameterType::NumberDouble,
            },
        );
        Options {
            component: Some(component),
            container: Some(ContainerSpec {
                image: "python:3.11".to_string(),
                command: vec!["python".to_string()],
                args: vec!["train.py".to_string()],
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn executor_input(salt: &str) -> ExecutorInput {
        let mut inputs = ExecutorInputs::default();
        inputs.parameter_values.insert("epochs".to_string(), json!(3));
        let mut outputs = ExecutorOutputs::default();
        outputs.artifacts.insert(
            "model".to_string(),
            ArtifactList::single(RuntimeArtifact {
                name: "model".to_string(),
                uri: format!("minio://mlpipeline/v2/artifacts/train/{}/model", salt),
                artifact_type: ArtifactTypeSchema::titled("system.Model"),
                ..Default::default()
            }),
        );
        ExecutorInput {
            inputs,
            outputs: Some(outputs),
        }
    }

    #[test]
    fn test_fingerprint_ignores_output_uri_salt() {
        let opts = options();
        let a = fingerprint(&opts, &executor_input("salt-1")).unwrap();
        let b = fingerprint(&opts, &executor_input("salt-2")).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_fingerprint_changes_with_each_component() {
        let base = fingerprint(&options(), &executor_input("s")).unwrap();

        let mut changed_input = executor_input("s");
        changed_input
            .inputs
            .parameter_values
            .insert("epochs".to_string(), json!(4));
        assert_ne!(base, fingerprint(&options(), &changed_input).unwrap());

        let mut changed_image = options();
        if let Some(container) = changed_image.container.as_mut() {
            container.image = "python:3.12".to_string();
        }
        assert_ne!(base, fingerprint(&changed_image, &executor_input("s")).unwrap());

        let mut changed_args = options();
        if let Some(container) = changed_args.container.as_mut() {
            container.args.push("--fast".to_string());
        }
        assert_ne!(base, fingerprint(&changed_args, &executor_input("s")).unwrap());

        let mut changed_type = options();
        if let Some(component) = changed_type.component.as_mut() {
            component.output_definitions.parameters.insert(
                "accuracy".to_string(),
                OutputParameterDefinition {
                    parameter_type: ParameterType::String,
                },
            );
        }
        assert_ne!(base, fingerprint(&changed_type, &executor_input("s")).unwrap());
    }

    #[test]
    fn test_fingerprint_tracks_consumed_artifact_uri() {
        let consuming = |run: &str| {
            let mut input = executor_input("s");
            input.inputs.artifacts.insert(
                "data".to_string(),
                ArtifactList::single(RuntimeArtifact {
                    name: "dataset".to_string(),
                    uri: format!("minio://mlpipeline/v2/artifacts/{}/dataset", run),
                    artifact_type: ArtifactTypeSchema::titled("system.Dataset"),
                    ..Default::default()
                }),
            );
            input
        };

        let first = fingerprint(&options(), &consuming("run-1")).unwrap();
        let second = fingerprint(&options(), &consuming("run-2")).unwrap();
        assert_ne!(first, second);
        assert_eq!(first, fingerprint(&options(), &consuming("run-1")).unwrap());
    }

    #[test]
    fn test_canonical_json_sorts_keys() {
        let value = json!({"b": 1, "a": {"d": [true, null], "c": "x"}});
        assert_eq!(
            to_canonical_json(&value),
            r#"{"a":{"c":"x","d":[true,null]},"b":1}"#
        );
    }

    #[test]
    fn test_fingerprint_requires_container() {
        let opts = Options::default();
        assert!(fingerprint(&opts, &ExecutorInput::default()).is_err());
    }
}
