// Driver Test Harness
// In-memory collaborators and fixtures shared by the driver tests

use crate::cache::{CacheEngine, MemoryCache};
use crate::config::StaticLauncherConfig;
use crate::driver::Driver;
use crate::metadata::{
    ExecutionRecord, MemoryRunRegistry, MemoryStore, MetadataStore, PipelineQuery,
    DAG_EXECUTION_TYPE,
};
use crate::options::Options;
use crate::spec::{ComponentSpec, ContainerSpec, TaskInfo, TaskSpec};

use serde_json::Value;
use std::sync::Arc;

pub const PIPELINE_NAME: &str = "training";
pub const RUN_ID: &str = "run-1";
pub const PIPELINE_ROOT: &str = "minio://mlpipeline/v2/artifacts?region=us-east-1";

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub cache: Arc<MemoryCache>,
    pub registry: Arc<MemoryRunRegistry>,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            store: Arc::new(MemoryStore::new()),
            cache: Arc::new(MemoryCache::new()),
            registry: Arc::new(MemoryRunRegistry::new()),
        }
    }

    pub fn driver(&self) -> Driver {
        Driver::new(self.store.clone())
            .with_cache(CacheEngine::new(self.cache.clone()))
            .with_run_registration(self.registry.clone())
            .with_launcher_config(Arc::new(StaticLauncherConfig::missing()))
    }

    /// The pipeline context and a running root DAG holding `inputs`
    pub async fn root_dag_record(&self, inputs: Value) -> ExecutionRecord {
        self.store
            .get_pipeline(&PipelineQuery {
                pipeline_name: PIPELINE_NAME.to_string(),
                run_id: RUN_ID.to_string(),
                namespace: "kubeflow".to_string(),
                pipeline_root: PIPELINE_ROOT.to_string(),
                ..Default::default()
            })
            .await
            .unwrap();
        self.store
            .insert_execution(ExecutionRecord {
                run_id: RUN_ID.to_string(),
                display_name: format!("run/{}", RUN_ID),
                execution_type: DAG_EXECUTION_TYPE.to_string(),
                input_parameters: serde_json::from_value(inputs).unwrap(),
                ..Default::default()
            })
            .await
    }
}

pub fn task(name: &str) -> TaskSpec {
    TaskSpec {
        task_info: TaskInfo {
            name: name.to_string(),
        },
        ..Default::default()
    }
}

/// Options for a task inside the DAG `dag_id`
pub fn task_options(
    dag_id: i64,
    task: TaskSpec,
    component: ComponentSpec,
    container: Option<ContainerSpec>,
) -> Options {
    Options {
        pipeline_name: PIPELINE_NAME.to_string(),
        run_id: RUN_ID.to_string(),
        namespace: "kubeflow".to_string(),
        component: Some(component),
        task: Some(task),
        dag_execution_id: dag_id,
        container,
        ..Default::default()
    }
}
