// Run Registration
// Mirrors driver executions into an external run-tracking service

use crate::error::DriverResult;

use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

const PIPELINE_CHANNEL_PREFIX: &str = "pipelinechannel--";

/// Arguments of a run-registration call
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct PipelineRunRequest {
    pub run_name: String,
    pub pipeline_name: String,
    pub namespace: String,
    pub run_resource: String,
    pub pipeline_root: String,
    pub store_session_info: String,
    pub experiment_id: String,
    pub parent_execution_id: Option<i64>,
    pub execution_id: Option<i64>,
}

/// A run as known to the registration service
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct RegisteredRun {
    pub id: String,
    pub name: String,
}

/// Client of the external run-registration service
#[async_trait::async_trait]
pub trait RunRegistration: Send + Sync {
    async fn create_pipeline_run(&self, request: &PipelineRunRequest) -> DriverResult<RegisteredRun>;

    async fn log_parameter(
        &self,
        experiment_id: &str,
        execution_id: i64,
        key: &str,
        value: &str,
    ) -> DriverResult<()>;
}

/// Text form of a parameter value: raw strings, JSON for everything else
pub fn parameter_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// Flatten input parameters into loggable name/value pairs.
/// `pipelinechannel--` prefixes are stripped and channel structs expand to `name.field`.
pub fn run_parameters(params: &BTreeMap<String, Value>) -> Vec<(String, String)> {
    let mut parameters = Vec::new();
    for (key, value) in params {
        match (key.strip_prefix(PIPELINE_CHANNEL_PREFIX), value) {
            (Some(name), Value::Object(fields)) if !name.is_empty() => {
                let mut fields: Vec<_> = fields.iter().collect();
                fields.sort_by(|a, b| a.0.cmp(b.0));
                for (field, inner) in fields {
                    parameters.push((format!("{}.{}", name, field), parameter_text(inner)));
                }
            }
            (Some(name), _) if !name.is_empty() => {
                parameters.push((name.to_string(), parameter_text(value)))
            }
            _ => parameters.push((key.clone(), parameter_text(value))),
        }
    }
    parameters
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggedParameter {
    pub experiment_id: String,
    pub execution_id: i64,
    pub key: String,
    pub value: String,
}

#[derive(Debug, Default)]
struct RegistryState {
    runs: Vec<PipelineRunRequest>,
    parameters: Vec<LoggedParameter>,
}

/// Run registration that only remembers what it was told
#[derive(Debug, Clone, Default)]
pub struct MemoryRunRegistry {
    state: Arc<RwLock<RegistryState>>,
}

impl MemoryRunRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn runs(&self) -> Vec<PipelineRunRequest> {
        self.state.read().await.runs.clone()
    }

    pub async fn parameters(&self) -> Vec<LoggedParameter> {
        self.state.read().await.parameters.clone()
    }
}

#[async_trait::async_trait]
impl RunRegistration for MemoryRunRegistry {
    async fn create_pipeline_run(&self, request: &PipelineRunRequest) -> DriverResult<RegisteredRun> {
        let mut state = self.state.write().await;
        state.runs.push(request.clone());
        tracing::debug!(run = %request.run_name, execution_id = ?request.execution_id, "registered pipeline run");
        Ok(RegisteredRun {
            id: uuid::Uuid::new_v4().to_string(),
            name: request.run_name.clone(),
        })
    }

    async fn log_parameter(
        &self,
        experiment_id: &str,
        execution_id: i64,
        key: &str,
        value: &str,
    ) -> DriverResult<()> {
        let mut state = self.state.write().await;
        state.parameters.push(LoggedParameter {
            experiment_id: experiment_id.to_string(),
            execution_id,
            key: key.to_string(),
            value: value.to_string(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_run_parameters_strip_channel_prefix() {
        let mut params = BTreeMap::new();
        params.insert("pipelinechannel--query".to_string(), json!("eiffel"));
        params.insert(
            "pipelinechannel--loop-item-param-1".to_string(),
            json!({"top_k": 11, "temperature": "0.5"}),
        );
        params.insert("epochs".to_string(), json!(3));

        let parameters = run_parameters(&params);
        assert_eq!(
            parameters,
            vec![
                ("epochs".to_string(), "3".to_string()),
                ("loop-item-param-1.temperature".to_string(), "0.5".to_string()),
                ("loop-item-param-1.top_k".to_string(), "11".to_string()),
                ("query".to_string(), "eiffel".to_string()),
            ]
        );
    }

    #[test]
    fn test_parameter_text() {
        assert_eq!(parameter_text(&json!("x")), "x");
        assert_eq!(parameter_text(&json!([1, 2])), "[1,2]");
        assert_eq!(parameter_text(&Value::Null), "null");
    }

    #[tokio::test]
    async fn test_memory_run_registry_records_calls() {
        let registry = MemoryRunRegistry::new();
        let run = registry
            .create_pipeline_run(&PipelineRunRequest {
                run_name: "train".to_string(),
                execution_id: Some(3),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(run.name, "train");
        registry.log_parameter("exp", 3, "epochs", "3").await.unwrap();

        assert_eq!(registry.runs().await.len(), 1);
        assert_eq!(registry.parameters().await[0].key, "epochs");
    }
}
