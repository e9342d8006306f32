// In-Memory Metadata Store
// Process-local metadata store used by tests and the development server

use crate::error::{DriverError, DriverResult};
use crate::metadata::{
    Dag, ExecutionConfig, ExecutionRecord, ExecutionState, MetadataStore, OutputArtifact,
    Pipeline, PipelineQuery,
};
use crate::spec::ArtifactList;

use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct MemoryState {
    last_execution_id: i64,
    last_context_id: i64,
    last_artifact_id: i64,
    pipelines: HashMap<(String, String), Pipeline>,
    executions: BTreeMap<i64, ExecutionRecord>,
    input_artifacts: HashMap<i64, BTreeMap<String, ArtifactList>>,
    output_artifacts: HashMap<i64, BTreeMap<String, OutputArtifact>>,
}

impl MemoryState {
    fn next_execution_id(&mut self) -> i64 {
        self.last_execution_id += 1;
        self.last_execution_id
    }

    fn execution(&self, id: i64) -> DriverResult<&ExecutionRecord> {
        self.executions
            .get(&id)
            .ok_or_else(|| DriverError::infrastructure(format!("execution {} not found", id)))
    }
}

/// Metadata store keeping every record in memory
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<RwLock<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a prepared record as-is, assigning an id when it has none
    pub async fn insert_execution(&self, mut record: ExecutionRecord) -> ExecutionRecord {
        let mut state = self.state.write().await;
        if record.id == 0 {
            record.id = state.next_execution_id();
        } else if record.id > state.last_execution_id {
            state.last_execution_id = record.id;
        }
        state.executions.insert(record.id, record.clone());
        record
    }

    pub async fn set_input_artifacts(
        &self,
        execution_id: i64,
        artifacts: BTreeMap<String, ArtifactList>,
    ) {
        let mut state = self.state.write().await;
        state.input_artifacts.insert(execution_id, artifacts);
    }

    pub async fn add_output_artifact(&self, execution_id: i64, mut artifact: OutputArtifact) {
        let mut state = self.state.write().await;
        state.last_artifact_id += 1;
        artifact.id = state.last_artifact_id;
        state
            .output_artifacts
            .entry(execution_id)
            .or_default()
            .insert(artifact.name.clone(), artifact);
    }

    /// Snapshot of every stored execution, ordered by id
    pub async fn executions(&self) -> Vec<ExecutionRecord> {
        let state = self.state.read().await;
        state.executions.values().cloned().collect()
    }

    pub async fn pipeline(&self, name: &str, run_id: &str) -> Option<Pipeline> {
        let state = self.state.read().await;
        state
            .pipelines
            .get(&(name.to_string(), run_id.to_string()))
            .cloned()
    }
}

#[async_trait::async_trait]
impl MetadataStore for MemoryStore {
    async fn get_pipeline(&self, query: &PipelineQuery) -> DriverResult<Pipeline> {
        let mut state = self.state.write().await;
        let key = (query.pipeline_name.clone(), query.run_id.clone());
        if let Some(existing) = state.pipelines.get(&key) {
            return Ok(existing.clone());
        }

        state.last_context_id += 1;
        let pipeline = Pipeline {
            context_id: state.last_context_id,
            name: query.pipeline_name.clone(),
            run_id: query.run_id.clone(),
            namespace: query.namespace.clone(),
            pipeline_root: query.pipeline_root.clone(),
            store_session_info: query.store_session_info.clone(),
        };
        state.pipelines.insert(key, pipeline.clone());
        Ok(pipeline)
    }

    async fn get_dag(&self, execution_id: i64) -> DriverResult<Dag> {
        let state = self.state.read().await;
        let execution = state.execution(execution_id)?;
        if !execution.is_dag() {
            return Err(DriverError::infrastructure(format!(
                "execution {} is not a DAG execution, got type {:?}",
                execution_id, execution.execution_type
            )));
        }
        Ok(Dag {
            execution: execution.clone(),
        })
    }

    async fn get_executions_in_dag(
        &self,
        dag: &Dag,
        pipeline: &Pipeline,
        direct_children_only: bool,
    ) -> DriverResult<BTreeMap<String, ExecutionRecord>> {
        let state = self.state.read().await;
        let mut executions: BTreeMap<String, ExecutionRecord> = BTreeMap::new();
        for execution in state.executions.values() {
            if execution.run_id != pipeline.run_id || execution.task_name.is_empty() {
                continue;
            }
            if direct_children_only && execution.parent_dag_id != dag.id() {
                continue;
            }
            if let Some(existing) = executions.get(&execution.task_name) {
                return Err(DriverError::infrastructure(format!(
                    "two tasks have the same task name {:?}, id1={} id2={}",
                    execution.task_name, existing.id, execution.id
                )));
            }
            executions.insert(execution.task_name.clone(), execution.clone());
        }
        Ok(executions)
    }

    async fn get_input_artifacts_by_execution_id(
        &self,
        execution_id: i64,
    ) -> DriverResult<BTreeMap<String, ArtifactList>> {
        let state = self.state.read().await;
        Ok(state
            .input_artifacts
            .get(&execution_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn get_output_artifacts_by_execution_id(
        &self,
        execution_id: i64,
    ) -> DriverResult<BTreeMap<String, OutputArtifact>> {
        let state = self.state.read().await;
        Ok(state
            .output_artifacts
            .get(&execution_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn create_execution(
        &self,
        pipeline: &Pipeline,
        config: &ExecutionConfig,
    ) -> DriverResult<ExecutionRecord> {
        let mut state = self.state.write().await;
        let id = state.next_execution_id();
        let record = ExecutionRecord {
            id,
            run_id: pipeline.run_id.clone(),
            task_name: config.task_name.clone(),
            display_name: config.display_name.clone(),
            execution_type: config.execution_type.clone(),
            state: ExecutionState::Running,
            parent_dag_id: config.parent_dag_id,
            iteration_index: config.iteration_index,
            iteration_count: config.iteration_count,
            not_triggered: config.not_triggered,
            input_parameters: config.input_parameters.clone(),
            output_parameters: BTreeMap::new(),
            parameter_producers: config.parameter_producers.clone(),
            artifact_producers: config.artifact_producers.clone(),
            fingerprint: config.fingerprint.clone(),
            cached_execution_id: config.cached_execution_id.clone(),
        };
        state.executions.insert(id, record.clone());
        if !config.input_artifacts.is_empty() {
            state
                .input_artifacts
                .insert(id, config.input_artifacts.clone());
        }
        Ok(record)
    }

    async fn publish_execution(
        &self,
        execution: &ExecutionRecord,
        output_parameters: BTreeMap<String, Value>,
        output_artifacts: Vec<OutputArtifact>,
        state: ExecutionState,
    ) -> DriverResult<()> {
        let mut guard = self.state.write().await;
        let record = guard.executions.get_mut(&execution.id).ok_or_else(|| {
            DriverError::infrastructure(format!("execution {} not found", execution.id))
        })?;
        record.state = state;
        record.output_parameters.extend(output_parameters);

        let mut artifact_id = guard.last_artifact_id;
        let stored = guard.output_artifacts.entry(execution.id).or_default();
        for mut artifact in output_artifacts {
            artifact_id += 1;
            artifact.id = artifact_id;
            stored.insert(artifact.name.clone(), artifact);
        }
        guard.last_artifact_id = artifact_id;
        Ok(())
    }

    async fn get_execution(&self, execution_id: i64) -> DriverResult<ExecutionRecord> {
        let state = self.state.read().await;
        state.execution(execution_id).cloned()
    }
}
