// Executor Plugin Types
// Request and reply shapes of the Argo executor plugin template.execute call

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Body of `POST /api/v1/template.execute`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecuteTemplateArgs {
    pub workflow: Option<WorkflowRef>,
    pub template: Template,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowRef {
    pub metadata: ObjectMeta,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ObjectMeta {
    pub name: String,
    pub namespace: String,
    pub uid: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Template {
    pub name: String,
    pub inputs: Inputs,
    /// Opaque plugin object keyed by plugin name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plugin: Option<Map<String, Value>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Inputs {
    pub parameters: Vec<Parameter>,
}

/// A named template parameter. Argo values are strings, but JSON values are accepted too.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Parameter {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

impl Parameter {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: Some(Value::String(value.into())),
        }
    }

    /// The value as text; non-string JSON values give their JSON encoding
    pub fn value_text(&self) -> String {
        match &self.value {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(text)) => text.clone(),
            Some(other) => other.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecuteTemplateReply {
    pub node: NodeResult,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeResult {
    pub phase: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outputs: Option<Outputs>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Outputs {
    pub parameters: Vec<Parameter>,
}

impl ExecuteTemplateReply {
    pub fn succeeded(message: impl Into<String>, parameters: Vec<Parameter>) -> Self {
        Self {
            node: NodeResult {
                phase: "Succeeded".to_string(),
                message: message.into(),
                outputs: Some(Outputs { parameters }),
            },
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            node: NodeResult {
                phase: "Failed".to_string(),
                message: message.into(),
                outputs: None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_plugin_request() {
        let args: ExecuteTemplateArgs = serde_json::from_value(json!({
            "workflow": {"metadata": {"name": "training-xyz", "namespace": "kubeflow"}},
            "template": {
                "name": "system-dag-driver",
                "inputs": {"parameters": [
                    {"name": "driver-type", "value": "ROOT_DAG"},
                    {"name": "parent-dag-id", "value": 3}
                ]},
                "plugin": {"driver-argo-executor": {}}
            }
        }))
        .unwrap();

        let parameters = &args.template.inputs.parameters;
        assert_eq!(parameters[0].value_text(), "ROOT_DAG");
        assert_eq!(parameters[1].value_text(), "3");
        assert!(args
            .template
            .plugin
            .as_ref()
            .unwrap()
            .contains_key("driver-argo-executor"));
    }

    #[test]
    fn test_failed_reply_shape() {
        let value = serde_json::to_value(ExecuteTemplateReply::failed("boom")).unwrap();
        assert_eq!(value, json!({"node": {"phase": "Failed", "message": "boom"}}));
    }
}
