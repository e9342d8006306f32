// Pipeline IR
// Component, task, container and runtime-config shapes of a compiled pipeline

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Declared type of an input or output parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ParameterType {
    #[default]
    ParameterTypeEnumUnspecified,
    NumberDouble,
    NumberInteger,
    String,
    Boolean,
    List,
    Struct,
    TaskFinalStatus,
}

impl fmt::Display for ParameterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ParameterType::ParameterTypeEnumUnspecified => "PARAMETER_TYPE_ENUM_UNSPECIFIED",
            ParameterType::NumberDouble => "NUMBER_DOUBLE",
            ParameterType::NumberInteger => "NUMBER_INTEGER",
            ParameterType::String => "STRING",
            ParameterType::Boolean => "BOOLEAN",
            ParameterType::List => "LIST",
            ParameterType::Struct => "STRUCT",
            ParameterType::TaskFinalStatus => "TASK_FINAL_STATUS",
        };
        write!(f, "{}", name)
    }
}

/// Artifact type, either a schema title or an inline instance schema
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ArtifactTypeSchema {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema_title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance_schema: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema_version: Option<String>,
}

impl ArtifactTypeSchema {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            schema_title: Some(title.into()),
            ..Default::default()
        }
    }

    /// Schema string recorded on metadata-store artifacts
    pub fn instance_schema_or_title(&self) -> String {
        self.instance_schema
            .clone()
            .or_else(|| self.schema_title.clone())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InputParameterDefinition {
    pub parameter_type: ParameterType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_value: Option<Value>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub is_optional: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InputArtifactDefinition {
    pub artifact_type: ArtifactTypeSchema,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub is_artifact_list: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub is_optional: bool,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ComponentInputsSpec {
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub parameters: BTreeMap<String, InputParameterDefinition>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub artifacts: BTreeMap<String, InputArtifactDefinition>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OutputParameterDefinition {
    pub parameter_type: ParameterType,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OutputArtifactDefinition {
    pub artifact_type: ArtifactTypeSchema,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Map<String, Value>>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ComponentOutputsSpec {
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub parameters: BTreeMap<String, OutputParameterDefinition>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub artifacts: BTreeMap<String, OutputArtifactDefinition>,
}

/// A component: its input/output contract and, for sub-graphs, its DAG
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ComponentSpec {
    pub input_definitions: ComponentInputsSpec,
    pub output_definitions: ComponentOutputsSpec,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub executor_label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dag: Option<DagSpec>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DagSpec {
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub tasks: BTreeMap<String, TaskSpec>,
    pub outputs: DagOutputsSpec,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DagOutputsSpec {
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub parameters: BTreeMap<String, DagOutputParameterSpec>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub artifacts: BTreeMap<String, DagOutputArtifactSpec>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ParameterSelectorSpec {
    pub producer_subtask: String,
    pub output_parameter_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ParameterSelectorList {
    pub parameter_selectors: Vec<ParameterSelectorSpec>,
}

/// Where a DAG output parameter comes from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DagOutputParameterSpec {
    ValueFromParameter(ParameterSelectorSpec),
    ValueFromOneof(ParameterSelectorList),
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ArtifactSelectorSpec {
    pub producer_subtask: String,
    pub output_artifact_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DagOutputArtifactSpec {
    pub artifact_selectors: Vec<ArtifactSelectorSpec>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TaskInfo {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CachingOptions {
    pub enable_cache: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TriggerPolicy {
    pub condition: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ComponentRef {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TaskOutputParameterSpec {
    pub producer_task: String,
    pub output_parameter_key: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RuntimeValueSpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub constant: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TaskFinalStatusSpec {
    pub producer_task: String,
}

/// Kind of a task input parameter declaration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ParameterSource {
    ComponentInputParameter(String),
    TaskOutputParameter(TaskOutputParameterSpec),
    RuntimeValue(RuntimeValueSpec),
    TaskFinalStatus(TaskFinalStatusSpec),
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputParameterSpec {
    #[serde(flatten)]
    pub kind: Option<ParameterSource>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub parameter_expression_selector: String,
}

impl fmt::Display for InputParameterSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match serde_json::to_string(self) {
            Ok(text) => write!(f, "{}", text),
            Err(_) => write!(f, "{:?}", self),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TaskOutputArtifactSpec {
    pub producer_task: String,
    pub output_artifact_key: String,
}

/// Kind of a task input artifact declaration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ArtifactSource {
    ComponentInputArtifact(String),
    TaskOutputArtifact(TaskOutputArtifactSpec),
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputArtifactSpec {
    #[serde(flatten)]
    pub kind: Option<ArtifactSource>,
}

impl fmt::Display for InputArtifactSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match serde_json::to_string(self) {
            Ok(text) => write!(f, "{}", text),
            Err(_) => write!(f, "{:?}", self),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TaskInputsSpec {
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub parameters: BTreeMap<String, InputParameterSpec>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub artifacts: BTreeMap<String, InputArtifactSpec>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ParameterItemsSpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_parameter: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ParameterIteratorSpec {
    pub items: ParameterItemsSpec,
    pub item_input: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ArtifactItemsSpec {
    pub input_artifact: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ArtifactIteratorSpec {
    pub items: ArtifactItemsSpec,
    pub item_input: String,
}

/// A task node inside a DAG
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TaskSpec {
    pub task_info: TaskInfo,
    pub inputs: TaskInputsSpec,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub dependent_tasks: Vec<String>,
    pub caching_options: CachingOptions,
    pub component_ref: ComponentRef,
    pub trigger_policy: TriggerPolicy,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameter_iterator: Option<ParameterIteratorSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact_iterator: Option<ArtifactIteratorSpec>,
}

impl TaskSpec {
    pub fn name(&self) -> &str {
        &self.task_info.name
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EnvVar {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AcceleratorConfig {
    #[serde(rename = "type")]
    pub accelerator_type: String,
    #[serde(deserialize_with = "int64_from_json")]
    pub count: i64,
    pub resource_type: String,
    pub resource_count: String,
}

/// Resource requests/limits; `resource_*` fields may carry placeholders
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResourceSpec {
    pub cpu_limit: f64,
    pub memory_limit: f64,
    pub cpu_request: f64,
    pub memory_request: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accelerator: Option<AcceleratorConfig>,
    pub resource_cpu_limit: String,
    pub resource_memory_limit: String,
    pub resource_cpu_request: String,
    pub resource_memory_request: String,
}

/// Container executor of a leaf task
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ContainerSpec {
    pub image: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub command: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<EnvVar>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceSpec>,
}

/// Run-level configuration handed to the root driver
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RuntimeConfig {
    pub parameter_values: BTreeMap<String, Value>,
    pub gcs_output_directory: String,
}

/// Protobuf JSON encodes int64 as a string; accept both forms
fn int64_from_json<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    match Value::deserialize(deserializer)? {
        Value::Null => Ok(0),
        Value::Number(n) => n
            .as_i64()
            .ok_or_else(|| D::Error::custom(format!("invalid int64: {}", n))),
        Value::String(s) if s.is_empty() => Ok(0),
        Value::String(s) => s
            .parse::<i64>()
            .map_err(|_| D::Error::custom(format!("invalid int64: {}", s))),
        other => Err(D::Error::custom(format!("invalid int64: {}", other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_task_input_kinds() {
        let task: TaskSpec = serde_json::from_value(json!({
            "taskInfo": {"name": "train"},
            "inputs": {
                "parameters": {
                    "lr": {"componentInputParameter": "learning_rate"},
                    "data": {
                        "taskOutputParameter": {"producerTask": "prep", "outputParameterKey": "Output"},
                        "parameterExpressionSelector": "parseJson(string_value)['a']"
                    },
                    "run": {"runtimeValue": {"constant": "{{$.pipeline_job_uuid}}"}},
                    "status": {"taskFinalStatus": {"producerTask": "train"}}
                },
                "artifacts": {
                    "model": {"taskOutputArtifact": {"producerTask": "prep", "outputArtifactKey": "model"}}
                }
            },
            "cachingOptions": {"enableCache": true}
        }))
        .unwrap();

        assert_eq!(task.name(), "train");
        assert!(task.caching_options.enable_cache);
        assert_eq!(
            task.inputs.parameters["lr"].kind,
            Some(ParameterSource::ComponentInputParameter("learning_rate".to_string()))
        );
        let data = &task.inputs.parameters["data"];
        assert!(matches!(data.kind, Some(ParameterSource::TaskOutputParameter(_))));
        assert_eq!(data.parameter_expression_selector, "parseJson(string_value)['a']");
        assert!(matches!(
            task.inputs.parameters["status"].kind,
            Some(ParameterSource::TaskFinalStatus(_))
        ));
        assert!(matches!(
            task.inputs.artifacts["model"].kind,
            Some(ArtifactSource::TaskOutputArtifact(_))
        ));
    }

    #[test]
    fn test_parse_container_resources() {
        let container: ContainerSpec = serde_json::from_value(json!({
            "image": "python:3.11",
            "command": ["python"],
            "args": ["-c", "print(1)"],
            "resources": {
                "memoryLimit": 2.0,
                "resourceCpuLimit": "{{$.inputs.parameters['pipelinechannel--cpu']}}",
                "accelerator": {"type": "nvidia.com/gpu", "count": "1"}
            }
        }))
        .unwrap();

        let resources = container.resources.unwrap();
        assert_eq!(resources.memory_limit, 2.0);
        assert_eq!(resources.accelerator.unwrap().count, 1);
    }

    #[test]
    fn test_parameter_type_display() {
        assert_eq!(ParameterType::NumberInteger.to_string(), "NUMBER_INTEGER");
        let parsed: ParameterType = serde_json::from_value(json!("STRUCT")).unwrap();
        assert_eq!(parsed, ParameterType::Struct);
    }

    #[test]
    fn test_dag_output_specs() {
        let outputs: DagOutputsSpec = serde_json::from_value(json!({
            "parameters": {
                "direct": {"valueFromParameter": {"producerSubtask": "a", "outputParameterKey": "Output"}},
                "either": {"valueFromOneof": {"parameterSelectors": [
                    {"producerSubtask": "b", "outputParameterKey": "Output"},
                    {"producerSubtask": "c", "outputParameterKey": "Output"}
                ]}}
            },
            "artifacts": {
                "model": {"artifactSelectors": [{"producerSubtask": "a", "outputArtifactKey": "model"}]}
            }
        }))
        .unwrap();

        assert!(matches!(
            outputs.parameters["direct"],
            DagOutputParameterSpec::ValueFromParameter(_)
        ));
        match &outputs.parameters["either"] {
            DagOutputParameterSpec::ValueFromOneof(list) => {
                assert_eq!(list.parameter_selectors.len(), 2)
            }
            other => panic!("unexpected spec: {:?}", other),
        }
        assert_eq!(outputs.artifacts["model"].artifact_selectors.len(), 1);
    }
}
