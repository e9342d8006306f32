// Metadata Module
// Execution records, pipeline contexts and the metadata store interface

pub mod memory;
pub mod producer;
pub mod registry;
pub mod run;

pub use memory::MemoryStore;
pub use producer::{OutputProducer, ProducerSelector};
pub use registry::{ProviderFactory, ProviderRegistry, MEMORY_PROVIDER};
pub use run::{
    parameter_text, run_parameters, LoggedParameter, MemoryRunRegistry, PipelineRunRequest,
    RegisteredRun, RunRegistration,
};

use crate::error::DriverResult;
use crate::spec::{ArtifactList, ArtifactTypeSchema, ExecutorInput, RuntimeArtifact};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// Execution type of pipeline-level and nested DAG executions
pub const DAG_EXECUTION_TYPE: &str = "system.DAGExecution";

/// Execution type of leaf container executions
pub const CONTAINER_EXECUTION_TYPE: &str = "system.ContainerExecution";

/// Last known state of an execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionState {
    #[default]
    Unknown,
    New,
    Running,
    Complete,
    Failed,
    Cached,
    Canceled,
}

impl ExecutionState {
    /// States whose outputs can be consumed downstream
    pub fn is_successful(&self) -> bool {
        matches!(self, ExecutionState::Complete | ExecutionState::Cached)
    }
}

impl fmt::Display for ExecutionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExecutionState::Unknown => "UNKNOWN",
            ExecutionState::New => "NEW",
            ExecutionState::Running => "RUNNING",
            ExecutionState::Complete => "COMPLETE",
            ExecutionState::Failed => "FAILED",
            ExecutionState::Cached => "CACHED",
            ExecutionState::Canceled => "CANCELED",
        };
        write!(f, "{}", name)
    }
}

/// Identity of the pipeline-level context a run writes into
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PipelineQuery {
    pub pipeline_name: String,
    pub run_id: String,
    pub namespace: String,
    pub run_resource: String,
    pub pipeline_root: String,
    pub store_session_info: String,
}

/// Pipeline + run context handle
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Pipeline {
    pub context_id: i64,
    pub name: String,
    pub run_id: String,
    pub namespace: String,
    pub pipeline_root: String,
    pub store_session_info: String,
}

/// A stored execution as read back from the metadata store
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ExecutionRecord {
    pub id: i64,
    pub run_id: String,
    pub task_name: String,
    pub display_name: String,
    pub execution_type: String,
    pub state: ExecutionState,
    pub parent_dag_id: i64,
    pub iteration_index: Option<i64>,
    /// Only present on fan-out iterator DAGs
    pub iteration_count: Option<usize>,
    pub not_triggered: bool,
    pub input_parameters: BTreeMap<String, Value>,
    pub output_parameters: BTreeMap<String, Value>,
    pub parameter_producers: Option<BTreeMap<String, OutputProducer>>,
    pub artifact_producers: Option<BTreeMap<String, OutputProducer>>,
    pub fingerprint: String,
    pub cached_execution_id: String,
}

impl ExecutionRecord {
    pub fn is_dag(&self) -> bool {
        self.execution_type == DAG_EXECUTION_TYPE
    }

    pub fn is_iterator(&self) -> bool {
        self.iteration_count.is_some()
    }
}

/// A DAG execution handle
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Dag {
    pub execution: ExecutionRecord,
}

impl Dag {
    pub fn id(&self) -> i64 {
        self.execution.id
    }

    pub fn input_parameters(&self) -> &BTreeMap<String, Value> {
        &self.execution.input_parameters
    }
}

/// An output artifact as registered in the metadata store
#[derive(Debug, Clone, PartialEq, Default)]
pub struct OutputArtifact {
    pub name: String,
    pub id: i64,
    pub uri: String,
    pub artifact_type: ArtifactTypeSchema,
    pub metadata: Map<String, Value>,
    /// Instance schema the artifact was registered with
    pub schema: String,
}

impl OutputArtifact {
    pub fn from_runtime_artifact(name: impl Into<String>, artifact: &RuntimeArtifact) -> Self {
        Self {
            name: name.into(),
            id: 0,
            uri: artifact.uri.clone(),
            artifact_type: artifact.artifact_type.clone(),
            metadata: artifact.metadata.clone(),
            schema: artifact.artifact_type.instance_schema_or_title(),
        }
    }

    pub fn to_runtime_artifact(&self) -> RuntimeArtifact {
        RuntimeArtifact {
            name: self.name.clone(),
            artifact_type: self.artifact_type.clone(),
            uri: self.uri.clone(),
            metadata: self.metadata.clone(),
        }
    }
}

/// What a driver hands to `create_execution`
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ExecutionConfig {
    pub task_name: String,
    pub display_name: String,
    pub execution_type: String,
    pub parent_dag_id: i64,
    pub iteration_index: Option<i64>,
    pub iteration_count: Option<usize>,
    pub not_triggered: bool,
    pub cached_execution_id: String,
    pub fingerprint: String,
    pub input_parameters: BTreeMap<String, Value>,
    pub input_artifacts: BTreeMap<String, ArtifactList>,
    pub parameter_producers: Option<BTreeMap<String, OutputProducer>>,
    pub artifact_producers: Option<BTreeMap<String, OutputProducer>>,
}

impl ExecutionConfig {
    /// Config carrying the resolved inputs of an executor input
    pub fn from_executor_input(executor_input: &ExecutorInput) -> Self {
        Self {
            input_parameters: executor_input.inputs.parameter_values.clone(),
            input_artifacts: executor_input.inputs.artifacts.clone(),
            ..Default::default()
        }
    }
}

/// Read/write access to the metadata store
#[async_trait::async_trait]
pub trait MetadataStore: Send + Sync {
    /// Get or create the pipeline + run context
    async fn get_pipeline(&self, query: &PipelineQuery) -> DriverResult<Pipeline>;

    async fn get_dag(&self, execution_id: i64) -> DriverResult<Dag>;

    /// Executions keyed by task name. With `direct_children_only` only executions whose
    /// parent is `dag` are returned, otherwise every execution of the pipeline run.
    async fn get_executions_in_dag(
        &self,
        dag: &Dag,
        pipeline: &Pipeline,
        direct_children_only: bool,
    ) -> DriverResult<BTreeMap<String, ExecutionRecord>>;

    async fn get_input_artifacts_by_execution_id(
        &self,
        execution_id: i64,
    ) -> DriverResult<BTreeMap<String, ArtifactList>>;

    async fn get_output_artifacts_by_execution_id(
        &self,
        execution_id: i64,
    ) -> DriverResult<BTreeMap<String, OutputArtifact>>;

    async fn create_execution(
        &self,
        pipeline: &Pipeline,
        config: &ExecutionConfig,
    ) -> DriverResult<ExecutionRecord>;

    async fn publish_execution(
        &self,
        execution: &ExecutionRecord,
        output_parameters: BTreeMap<String, Value>,
        output_artifacts: Vec<OutputArtifact>,
        state: ExecutionState,
    ) -> DriverResult<()>;

    async fn get_execution(&self, execution_id: i64) -> DriverResult<ExecutionRecord>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_execution_state_success() {
        assert!(ExecutionState::Complete.is_successful());
        assert!(ExecutionState::Cached.is_successful());
        assert!(!ExecutionState::Failed.is_successful());
        assert!(!ExecutionState::Running.is_successful());
        assert_eq!(ExecutionState::Cached.to_string(), "CACHED");
    }

    #[test]
    fn test_output_artifact_to_runtime_artifact() {
        let mut metadata = Map::new();
        metadata.insert("accuracy".to_string(), json!(0.9));
        let artifact = OutputArtifact {
            name: "model".to_string(),
            id: 4,
            uri: "minio://mlpipeline/v2/artifacts/p/train/abc/model".to_string(),
            artifact_type: ArtifactTypeSchema::titled("system.Model"),
            metadata,
            schema: "system.Model".to_string(),
        };

        let runtime = artifact.to_runtime_artifact();
        assert_eq!(runtime.name, "model");
        assert_eq!(runtime.uri, artifact.uri);
        assert_eq!(runtime.metadata["accuracy"], json!(0.9));
    }
}
