// Driver Options
// Immutable per-invocation configuration shared by every driver entry point

use crate::metadata::RunRegistration;
use crate::spec::{ComponentSpec, ContainerSpec, KubernetesExecutorConfig, RuntimeConfig, TaskSpec};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Which of the three driver entry points a request targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DriverType {
    RootDag,
    Dag,
    Container,
}

impl DriverType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DriverType::RootDag => "ROOT_DAG",
            DriverType::Dag => "DAG",
            DriverType::Container => "CONTAINER",
        }
    }
}

impl fmt::Display for DriverType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for DriverType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ROOT_DAG" => Ok(DriverType::RootDag),
            "DAG" => Ok(DriverType::Dag),
            "CONTAINER" => Ok(DriverType::Container),
            other => Err(format!("Unknown driver type: {}", other)),
        }
    }
}

/// Proxy settings forwarded to user containers
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    pub http_proxy: String,
    pub https_proxy: String,
    pub no_proxy: String,
}

impl ProxyConfig {
    /// Name/value pairs in both upper and lower case, skipping unset entries
    pub fn env_vars(&self) -> Vec<(String, String)> {
        let mut vars = Vec::new();
        for (name, value) in [
            ("HTTP_PROXY", &self.http_proxy),
            ("HTTPS_PROXY", &self.https_proxy),
            ("NO_PROXY", &self.no_proxy),
        ] {
            if value.is_empty() {
                continue;
            }
            vars.push((name.to_string(), value.clone()));
            vars.push((name.to_lowercase(), value.clone()));
        }
        vars
    }
}

/// Everything one driver invocation needs
#[derive(Clone)]
pub struct Options {
    pub pipeline_name: String,
    pub run_id: String,
    pub component: Option<ComponentSpec>,
    /// -1 means this invocation is not an iteration
    pub iteration_index: i64,
    /// Root only
    pub runtime_config: Option<RuntimeConfig>,
    pub namespace: String,
    pub task: Option<TaskSpec>,
    pub dag_execution_id: i64,
    pub container: Option<ContainerSpec>,
    pub kubernetes_executor_config: Option<KubernetesExecutorConfig>,
    pub run_name: String,
    pub run_display_name: String,
    pub pipeline_log_level: String,
    pub publish_logs: String,
    pub experiment_id: String,
    pub dev_mode: bool,
    pub dev_execution_id: i64,
    pub driver_type: Option<DriverType>,
    pub cache_disabled: bool,
    pub proxy: ProxyConfig,
    pub run_registration: Option<Arc<dyn RunRegistration>>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            pipeline_name: String::new(),
            run_id: String::new(),
            component: None,
            iteration_index: -1,
            runtime_config: None,
            namespace: String::new(),
            task: None,
            dag_execution_id: 0,
            container: None,
            kubernetes_executor_config: None,
            run_name: String::new(),
            run_display_name: String::new(),
            pipeline_log_level: "1".to_string(),
            publish_logs: "false".to_string(),
            experiment_id: String::new(),
            dev_mode: false,
            dev_execution_id: 0,
            driver_type: None,
            cache_disabled: false,
            proxy: ProxyConfig::default(),
            run_registration: None,
        }
    }
}

impl fmt::Debug for Options {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Options")
            .field("pipeline_name", &self.pipeline_name)
            .field("run_id", &self.run_id)
            .field("namespace", &self.namespace)
            .field("task", &self.task_name())
            .field("dag_execution_id", &self.dag_execution_id)
            .field("iteration_index", &self.iteration_index)
            .field("driver_type", &self.driver_type)
            .field("run_registration", &self.run_registration.is_some())
            .finish_non_exhaustive()
    }
}

impl Options {
    pub fn task_name(&self) -> &str {
        self.task.as_ref().map(|t| t.name()).unwrap_or("")
    }

    pub fn component_name(&self) -> &str {
        self.task
            .as_ref()
            .map(|t| t.component_ref.name.as_str())
            .unwrap_or("")
    }

    /// The iteration index when this invocation is an iteration
    pub fn iteration(&self) -> Option<usize> {
        usize::try_from(self.iteration_index).ok()
    }

    pub fn caching_enabled(&self) -> bool {
        !self.cache_disabled
            && self
                .task
                .as_ref()
                .map(|t| t.caching_options.enable_cache)
                .unwrap_or(false)
    }

    /// One-line summary identifying the invocation in error messages
    pub fn info(&self) -> String {
        let mut msg = format!("pipelineName={}, runID={}", self.pipeline_name, self.run_id);
        if !self.task_name().is_empty() {
            msg.push_str(&format!(", task={:?}", self.task_name()));
        }
        if !self.component_name().is_empty() {
            msg.push_str(&format!(", component={:?}", self.component_name()));
        }
        if self.dag_execution_id != 0 {
            msg.push_str(&format!(", dagExecutionID={}", self.dag_execution_id));
        }
        if self.iteration_index >= 0 {
            msg.push_str(&format!(", iterationIndex={}", self.iteration_index));
        }
        if self.runtime_config.is_some() {
            msg.push_str(", runtimeConfig");
        }
        if self.component.is_some() {
            msg.push_str(", componentSpec");
        }
        if self.kubernetes_executor_config.is_some() {
            msg.push_str(", KubernetesExecutorConfig");
        }
        msg
    }
}
