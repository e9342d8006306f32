// Executor Input
// Resolved inputs and provisioned outputs handed to the launcher

use crate::spec::pipeline::ArtifactTypeSchema;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Path of the executor output metadata file inside the user container
pub const OUTPUT_METADATA_FILEPATH: &str = "/tmp/kfp/outputs/output_metadata.json";

/// An artifact as seen by a running task
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RuntimeArtifact {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(rename = "type")]
    pub artifact_type: ArtifactTypeSchema,
    pub uri: String,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ArtifactList {
    pub artifacts: Vec<RuntimeArtifact>,
}

impl ArtifactList {
    pub fn single(artifact: RuntimeArtifact) -> Self {
        Self {
            artifacts: vec![artifact],
        }
    }

    pub fn first(&self) -> Option<&RuntimeArtifact> {
        self.artifacts.first()
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExecutorInputs {
    pub parameter_values: BTreeMap<String, Value>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub artifacts: BTreeMap<String, ArtifactList>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OutputParameter {
    pub output_file: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExecutorOutputs {
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub parameters: BTreeMap<String, OutputParameter>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub artifacts: BTreeMap<String, ArtifactList>,
    pub output_file: String,
}

/// Everything the launcher needs to run one task
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExecutorInput {
    pub inputs: ExecutorInputs,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outputs: Option<ExecutorOutputs>,
}

impl ExecutorInput {
    pub fn new(inputs: ExecutorInputs) -> Self {
        Self {
            inputs,
            outputs: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_executor_input_wire_names() {
        let mut inputs = ExecutorInputs::default();
        inputs
            .parameter_values
            .insert("epochs".to_string(), json!(3));
        inputs.artifacts.insert(
            "dataset".to_string(),
            ArtifactList::single(RuntimeArtifact {
                uri: "minio://bucket/data".to_string(),
                artifact_type: ArtifactTypeSchema::titled("system.Dataset"),
                ..Default::default()
            }),
        );

        let value = serde_json::to_value(ExecutorInput::new(inputs)).unwrap();
        assert_eq!(value["inputs"]["parameterValues"]["epochs"], json!(3));
        assert_eq!(
            value["inputs"]["artifacts"]["dataset"]["artifacts"][0]["type"]["schemaTitle"],
            json!("system.Dataset")
        );
        assert!(value.get("outputs").is_none());
    }
}
