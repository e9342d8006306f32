// Template Handler
// Maps an executor plugin request onto driver options and the execution onto output parameters

use crate::error::{RpcError, RpcResult};
use crate::template::{ExecuteTemplateArgs, ExecuteTemplateReply, Parameter};

use pipeline_driver::config::in_pod_namespace;
use pipeline_driver::{Driver, DriverType, Execution, Options};
use serde::de::DeserializeOwned;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

/// Key the plugin object must carry for this server to accept a template
pub const DRIVER_PLUGIN_NAME: &str = "driver-argo-executor";

#[derive(Clone)]
pub struct TemplateHandler {
    driver: Arc<Driver>,
    namespace_file: PathBuf,
}

impl TemplateHandler {
    pub fn new(driver: Arc<Driver>) -> Self {
        let namespace_file = driver.config().namespace_file.clone();
        Self {
            driver,
            namespace_file,
        }
    }

    pub fn with_namespace_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.namespace_file = path.into();
        self
    }

    pub fn driver(&self) -> &Arc<Driver> {
        &self.driver
    }

    /// Run the driver named by the request and build the plugin reply
    pub async fn execute(&self, args: &ExecuteTemplateArgs) -> RpcResult<ExecuteTemplateReply> {
        let (options, driver_type) = self.options_from_request(args)?;
        info!(driver_type = %driver_type, template = %args.template.name, "Executing driver");

        let execution = self.driver.execute(&options).await?;
        if let Some(executor_input) = &execution.executor_input {
            let text = serde_json::to_string(executor_input)
                .map_err(|e| RpcError::InternalError(format!("failed to marshal ExecutorInput to JSON: {}", e)))?;
            debug!(executor_input = %text, "output ExecutorInput");
        }

        let parameters = output_parameters(&execution, driver_type);
        info!(execution_id = execution.id, "Driver execution completed successfully");
        Ok(ExecuteTemplateReply::succeeded(
            format!(
                "Driver call for driver type {} completed successfully. Execution ID: {}",
                driver_type, execution.id
            ),
            parameters,
        ))
    }

    /// Decode template input parameters into driver options
    pub fn options_from_request(
        &self,
        args: &ExecuteTemplateArgs,
    ) -> RpcResult<(Options, DriverType)> {
        let plugin = args
            .template
            .plugin
            .as_ref()
            .ok_or_else(|| RpcError::InvalidRequest("plugin was empty".to_string()))?;
        if !plugin.contains_key(DRIVER_PLUGIN_NAME) {
            return Err(RpcError::InvalidRequest(format!(
                "plugin object value is missing required '{}' field",
                DRIVER_PLUGIN_NAME
            )));
        }
        debug!(plugin = DRIVER_PLUGIN_NAME, "Received plugin request");

        let mut options = Options::default();
        let mut driver_type = String::new();
        for parameter in &args.template.inputs.parameters {
            let value = parameter.value_text();
            match parameter.name.as_str() {
                "component" => options.component = Some(parse_json(&value, "component")?),
                "runtime-config" if !value.is_empty() => {
                    options.runtime_config = Some(parse_json(&value, "runtime config")?)
                }
                "task" if !value.is_empty() => options.task = Some(parse_json(&value, "task")?),
                "container" => options.container = Some(parse_json(&value, "container")?),
                "kubernetes-config" if !value.is_empty() => {
                    let config = serde_json::from_str(&value).map_err(|e| {
                        RpcError::InvalidRequest(format!(
                            "encountered issues when parsing kube config: {}",
                            e
                        ))
                    })?;
                    options.kubernetes_executor_config = Some(config);
                }
                "parent-dag-id" => options.dag_execution_id = parse_int(&value, "parent-dag-id")?,
                "iteration-index" => {
                    options.iteration_index = parse_int(&value, "iteration-index")?
                }
                "driver-type" => driver_type = value,
                "pipeline_name" => options.pipeline_name = value,
                "run_id" => options.run_id = value,
                "run_name" => options.run_name = value,
                "run_display_name" => options.run_display_name = value,
                "experiment_id" => options.experiment_id = value,
                "http_proxy" => options.proxy.http_proxy = value,
                "https_proxy" => options.proxy.https_proxy = value,
                "no_proxy" => options.proxy.no_proxy = value,
                "cache_disabled" => {
                    options.cache_disabled = parse_bool(&value).ok_or_else(|| {
                        RpcError::InvalidRequest(format!(
                            "failed to parse cache_disabled: invalid syntax {:?}",
                            value
                        ))
                    })?
                }
                "log_level" => options.pipeline_log_level = value,
                "publish_logs" => options.publish_logs = value,
                _ => {}
            }
        }

        options.namespace = in_pod_namespace(&self.namespace_file).map_err(|e| {
            debug!(error = %e, "namespace lookup failed");
            RpcError::InvalidRequest("encountered issue when fetching pod namespace".to_string())
        })?;

        let driver_type: DriverType = driver_type.parse().map_err(RpcError::InvalidRequest)?;
        options.driver_type = Some(driver_type);
        Ok((options, driver_type))
    }
}

/// Output parameters handed back to the workflow, in a fixed order
pub fn output_parameters(execution: &Execution, driver_type: DriverType) -> Vec<Parameter> {
    let mut parameters = Vec::new();
    if execution.id != 0 {
        parameters.push(Parameter::new("execution-id", execution.id.to_string()));
    }
    match execution.iteration_count {
        Some(count) => parameters.push(Parameter::new("iteration-count", count.to_string())),
        None if driver_type == DriverType::RootDag => {
            parameters.push(Parameter::new("iteration-count", "0"))
        }
        None => {}
    }
    if let Some(cached) = execution.cached {
        parameters.push(Parameter::new("cached-decision", cached.to_string()));
    }
    match execution.condition {
        Some(condition) => parameters.push(Parameter::new("condition", condition.to_string())),
        None if driver_type != DriverType::Dag => parameters.push(Parameter::new("condition", "nil")),
        None => {}
    }
    if !execution.pod_spec_patch.is_empty() {
        parameters.push(Parameter::new("pod-spec-patch", execution.pod_spec_patch.clone()));
    }
    parameters
}

fn parse_json<T: DeserializeOwned>(value: &str, what: &str) -> RpcResult<T> {
    serde_json::from_str(value)
        .map_err(|e| RpcError::InvalidRequest(format!("failed to unmarshal {} json: {}", what, e)))
}

fn parse_int(value: &str, name: &str) -> RpcResult<i64> {
    value
        .trim()
        .parse()
        .map_err(|e| RpcError::InvalidRequest(format!("failed to parse {}: {}", name, e)))
}

fn parse_bool(value: &str) -> Option<bool> {
    match value {
        "1" | "t" | "T" | "true" | "TRUE" | "True" => Some(true),
        "0" | "f" | "F" | "false" | "FALSE" | "False" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipeline_driver::config::StaticLauncherConfig;
    use pipeline_driver::{MemoryStore, MetadataStore};
    use serde_json::{json, Value};
    use tempfile::TempDir;

    fn handler(dir: &TempDir) -> TemplateHandler {
        let namespace_file = dir.path().join("namespace");
        std::fs::write(&namespace_file, "kubeflow\n").unwrap();
        let driver = Driver::new(Arc::new(MemoryStore::new()))
            .with_launcher_config(Arc::new(StaticLauncherConfig::missing()));
        TemplateHandler::new(Arc::new(driver)).with_namespace_file(namespace_file)
    }

    fn request(parameters: Value) -> ExecuteTemplateArgs {
        serde_json::from_value(json!({
            "template": {
                "name": "system-driver",
                "inputs": {"parameters": parameters},
                "plugin": {"driver-argo-executor": {}}
            }
        }))
        .unwrap()
    }

    fn outputs(reply: &ExecuteTemplateReply) -> Vec<(String, String)> {
        reply
            .node
            .outputs
            .as_ref()
            .unwrap()
            .parameters
            .iter()
            .map(|p| (p.name.clone(), p.value_text()))
            .collect()
    }

    #[test]
    fn test_request_mapping() {
        let dir = TempDir::new().unwrap();
        let args = request(json!([
            {"name": "driver-type", "value": "CONTAINER"},
            {"name": "pipeline_name", "value": "training"},
            {"name": "run_id", "value": "run-1"},
            {"name": "parent-dag-id", "value": "12"},
            {"name": "iteration-index", "value": "2"},
            {"name": "task", "value": "{\"taskInfo\":{\"name\":\"train\"}}"},
            {"name": "container", "value": "{\"image\":\"python:3.11\"}"},
            {"name": "component", "value": "{}"},
            {"name": "runtime-config", "value": ""},
            {"name": "kubernetes-config", "value": "{\"nodeSelector\":{\"labels\":{\"pool\":\"gpu\"}}}"},
            {"name": "cache_disabled", "value": "true"},
            {"name": "log_level", "value": "2"},
            {"name": "publish_logs", "value": "true"},
            {"name": "https_proxy", "value": "http://proxy:3128"},
            {"name": "experiment_id", "value": "exp-1"}
        ]));

        let (options, driver_type) = handler(&dir).options_from_request(&args).unwrap();
        assert_eq!(driver_type, DriverType::Container);
        assert_eq!(options.driver_type, Some(DriverType::Container));
        assert_eq!(options.namespace, "kubeflow");
        assert_eq!(options.pipeline_name, "training");
        assert_eq!(options.dag_execution_id, 12);
        assert_eq!(options.iteration_index, 2);
        assert_eq!(options.task_name(), "train");
        assert_eq!(options.container.as_ref().unwrap().image, "python:3.11");
        assert!(options.runtime_config.is_none());
        assert!(options
            .kubernetes_executor_config
            .as_ref()
            .unwrap()
            .contains_key("nodeSelector"));
        assert!(options.cache_disabled);
        assert_eq!(options.pipeline_log_level, "2");
        assert_eq!(options.publish_logs, "true");
        assert_eq!(options.proxy.https_proxy, "http://proxy:3128");
        assert!(options.run_name.is_empty());
        assert_eq!(options.experiment_id, "exp-1");
    }

    #[test]
    fn test_request_rejections() {
        let dir = TempDir::new().unwrap();
        let handler = handler(&dir);

        let mut args = request(json!([{"name": "driver-type", "value": "DAG"}]));
        args.template.plugin = None;
        let err = handler.options_from_request(&args).unwrap_err();
        assert_eq!(err.to_string(), "plugin was empty");

        let mut args = request(json!([{"name": "driver-type", "value": "DAG"}]));
        args.template.plugin = Some(serde_json::Map::new());
        let err = handler.options_from_request(&args).unwrap_err();
        assert!(err.to_string().contains("missing required 'driver-argo-executor' field"));

        let args = request(json!([{"name": "driver-type", "value": "EXIT_HANDLER"}]));
        let err = handler.options_from_request(&args).unwrap_err();
        assert_eq!(err.to_string(), "Unknown driver type: EXIT_HANDLER");

        let args = request(json!([{"name": "parent-dag-id", "value": "abc"}]));
        let err = handler.options_from_request(&args).unwrap_err();
        assert!(err.to_string().starts_with("failed to parse parent-dag-id"));

        let args = request(json!([{"name": "cache_disabled", "value": "maybe"}]));
        assert!(matches!(
            handler.options_from_request(&args),
            Err(RpcError::InvalidRequest(_))
        ));

        let args = request(json!([{"name": "driver-type", "value": "DAG"}]));
        let err = handler
            .clone()
            .with_namespace_file(dir.path().join("missing"))
            .options_from_request(&args)
            .unwrap_err();
        assert_eq!(err.to_string(), "encountered issue when fetching pod namespace");
    }

    #[test]
    fn test_output_parameter_order() {
        let execution = Execution {
            id: 7,
            cached: Some(false),
            pod_spec_patch: "{}".to_string(),
            ..Default::default()
        };
        let names: Vec<_> = output_parameters(&execution, DriverType::Container)
            .into_iter()
            .map(|p| (p.name.clone(), p.value_text()))
            .collect();
        assert_eq!(
            names,
            vec![
                ("execution-id".to_string(), "7".to_string()),
                ("cached-decision".to_string(), "false".to_string()),
                ("condition".to_string(), "nil".to_string()),
                ("pod-spec-patch".to_string(), "{}".to_string()),
            ]
        );

        let dag = Execution {
            id: 8,
            iteration_count: Some(3),
            condition: Some(true),
            ..Default::default()
        };
        let names: Vec<_> = output_parameters(&dag, DriverType::Dag)
            .into_iter()
            .map(|p| p.name)
            .collect();
        assert_eq!(names, vec!["execution-id", "iteration-count", "condition"]);

        let skipped = output_parameters(&Execution::default(), DriverType::Dag);
        assert!(skipped.is_empty());
    }

    #[tokio::test]
    async fn test_root_then_container() {
        let dir = TempDir::new().unwrap();
        let handler = handler(&dir);

        let root = handler
            .execute(&request(json!([
                {"name": "driver-type", "value": "ROOT_DAG"},
                {"name": "pipeline_name", "value": "training"},
                {"name": "run_id", "value": "run-1"},
                {"name": "component", "value": "{}"},
                {"name": "runtime-config", "value": "{\"parameterValues\":{\"pipelinechannel--lr\":0.1}}"}
            ])))
            .await
            .unwrap();
        assert_eq!(root.node.phase, "Succeeded");
        assert_eq!(
            root.node.message,
            "Driver call for driver type ROOT_DAG completed successfully. Execution ID: 1"
        );
        assert_eq!(
            outputs(&root),
            vec![
                ("execution-id".to_string(), "1".to_string()),
                ("iteration-count".to_string(), "0".to_string()),
                ("condition".to_string(), "nil".to_string()),
            ]
        );

        let container = handler
            .execute(&request(json!([
                {"name": "driver-type", "value": "CONTAINER"},
                {"name": "pipeline_name", "value": "training"},
                {"name": "run_id", "value": "run-1"},
                {"name": "parent-dag-id", "value": "1"},
                {"name": "component", "value": "{}"},
                {"name": "task", "value": "{\"taskInfo\":{\"name\":\"train\"}}"},
                {"name": "container", "value": "{\"image\":\"python:3.11\",\"command\":[\"python\"],\"args\":[\"train.py\"]}"}
            ])))
            .await
            .unwrap();
        let names: Vec<_> = outputs(&container).into_iter().map(|(name, _)| name).collect();
        assert_eq!(
            names,
            vec!["execution-id", "cached-decision", "condition", "pod-spec-patch"]
        );

        let record = handler.driver().store().get_execution(2).await.unwrap();
        assert_eq!(record.task_name, "train");
        assert_eq!(record.parent_dag_id, 1);
    }

    #[tokio::test]
    async fn test_driver_failure_is_service_error() {
        let dir = TempDir::new().unwrap();
        let err = handler(&dir)
            .execute(&request(json!([
                {"name": "driver-type", "value": "DAG"},
                {"name": "pipeline_name", "value": "training"},
                {"name": "run_id", "value": "run-1"},
                {"name": "parent-dag-id", "value": "42"},
                {"name": "component", "value": "{}"},
                {"name": "task", "value": "{\"taskInfo\":{\"name\":\"inner\"}}"}
            ])))
            .await
            .unwrap_err();
        assert!(matches!(err, RpcError::ServiceError(_)));
        assert!(err.to_string().starts_with("Driver execution failed: driver.DAG("));
    }
}
