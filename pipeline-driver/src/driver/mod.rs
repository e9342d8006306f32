// Driver Module
// Root, DAG and container entry points and the collaborators they share

pub mod container;
pub mod dag;
pub mod root;
pub mod validate;

#[cfg(test)]
mod testing;

pub use container::{generate_output_uri, provision_outputs, EXECUTOR_LOGS_ARTIFACT};
pub use validate::{validate_container, validate_dag, validate_root_dag};

use crate::cache::CacheEngine;
use crate::config::{DriverConfig, LauncherConfigSource};
use crate::error::{DriverError, DriverResult};
use crate::execution::Execution;
use crate::expression::ExpressionEngine;
use crate::metadata::{
    ExecutionConfig, ExecutionRecord, MemoryRunRegistry, MetadataStore, Pipeline,
    PipelineRunRequest, RunRegistration,
};
use crate::options::{DriverType, Options};
use crate::podspec::{NoopExtension, PodSpecExtension};
use crate::spec::{ExecutorInput, TaskSpec};

use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Run resource name recorded on pipeline contexts and registered runs
pub const RUN_RESOURCE: &str = "run-resource";

/// Carries out a platform-only operation, such as creating a PVC, for a task whose
/// image has no launcher. Returned parameters are published as the task's outputs.
#[async_trait]
pub trait PlatformOpHandler: Send + Sync {
    async fn handle(
        &self,
        image: &str,
        options: &Options,
        executor_input: &ExecutorInput,
    ) -> DriverResult<BTreeMap<String, Value>>;
}

/// Logs the operation and produces no outputs
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingPlatformOps;

#[async_trait]
impl PlatformOpHandler for LoggingPlatformOps {
    async fn handle(
        &self,
        image: &str,
        options: &Options,
        executor_input: &ExecutorInput,
    ) -> DriverResult<BTreeMap<String, Value>> {
        info!(
            image,
            task = options.task_name(),
            parameters = executor_input.inputs.parameter_values.len(),
            "platform operation has no launcher, nothing to do"
        );
        Ok(BTreeMap::new())
    }
}

/// Pipeline execution driver
pub struct Driver {
    store: Arc<dyn MetadataStore>,
    cache: CacheEngine,
    launcher_config: Option<Arc<dyn LauncherConfigSource>>,
    run_registration: Arc<dyn RunRegistration>,
    extension: Arc<dyn PodSpecExtension>,
    platform_ops: Arc<dyn PlatformOpHandler>,
    config: DriverConfig,
    engine: ExpressionEngine,
}

impl Driver {
    pub fn new(store: Arc<dyn MetadataStore>) -> Self {
        Self {
            store,
            cache: CacheEngine::default(),
            launcher_config: None,
            run_registration: Arc::new(MemoryRunRegistry::new()),
            extension: Arc::new(NoopExtension),
            platform_ops: Arc::new(LoggingPlatformOps),
            config: DriverConfig::default(),
            engine: ExpressionEngine::new(),
        }
    }

    pub fn with_cache(mut self, cache: CacheEngine) -> Self {
        self.cache = cache;
        self
    }

    /// Overrides the config map mounted at `config.launcher_config_dir`
    pub fn with_launcher_config(mut self, source: Arc<dyn LauncherConfigSource>) -> Self {
        self.launcher_config = Some(source);
        self
    }

    pub fn with_run_registration(mut self, registration: Arc<dyn RunRegistration>) -> Self {
        self.run_registration = registration;
        self
    }

    pub fn with_extension(mut self, extension: Arc<dyn PodSpecExtension>) -> Self {
        self.extension = extension;
        self
    }

    pub fn with_platform_ops(mut self, handler: Arc<dyn PlatformOpHandler>) -> Self {
        self.platform_ops = handler;
        self
    }

    pub fn with_config(mut self, config: DriverConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn MetadataStore> {
        &self.store
    }

    /// Dispatch to the entry point named by `options.driver_type`
    pub async fn execute(&self, options: &Options) -> DriverResult<Execution> {
        match options.driver_type {
            Some(DriverType::RootDag) => self.root_dag(options).await,
            Some(DriverType::Dag) => self.dag(options).await,
            Some(DriverType::Container) => self.container(options).await,
            None => Err(DriverError::validation("driver type is required")),
        }
    }

    fn launcher_config_source(&self) -> Arc<dyn LauncherConfigSource> {
        match &self.launcher_config {
            Some(source) => source.clone(),
            None => Arc::new(self.config.launcher_config_source()),
        }
    }

    fn run_registration_for(&self, options: &Options) -> Arc<dyn RunRegistration> {
        options
            .run_registration
            .clone()
            .unwrap_or_else(|| self.run_registration.clone())
    }

    /// Create the execution, or fetch the fixed one in dev mode
    async fn create_or_fetch_execution(
        &self,
        options: &Options,
        pipeline: &Pipeline,
        config: &ExecutionConfig,
    ) -> DriverResult<ExecutionRecord> {
        if options.dev_mode {
            debug!(execution_id = options.dev_execution_id, "dev mode, reusing execution");
            self.store.get_execution(options.dev_execution_id).await
        } else {
            self.store.create_execution(pipeline, config).await
        }
    }

    async fn register_run(
        &self,
        options: &Options,
        pipeline: &Pipeline,
        run_name: &str,
        parent_execution_id: Option<i64>,
        execution_id: i64,
        parameters: Vec<(String, String)>,
    ) -> DriverResult<()> {
        let registration = self.run_registration_for(options);
        let run = registration
            .create_pipeline_run(&PipelineRunRequest {
                run_name: run_name.to_string(),
                pipeline_name: options.pipeline_name.clone(),
                namespace: options.namespace.clone(),
                run_resource: RUN_RESOURCE.to_string(),
                pipeline_root: pipeline.pipeline_root.clone(),
                store_session_info: pipeline.store_session_info.clone(),
                experiment_id: options.experiment_id.clone(),
                parent_execution_id,
                execution_id: Some(execution_id),
            })
            .await?;
        debug!(run = %run.id, execution_id, "registered run");

        for (key, value) in parameters {
            registration
                .log_parameter(&options.experiment_id, execution_id, &key, &value)
                .await?;
        }
        Ok(())
    }

    /// None when the task has no trigger condition
    fn evaluate_condition(
        &self,
        task: &TaskSpec,
        executor_input: &ExecutorInput,
    ) -> DriverResult<Option<bool>> {
        let condition = task.trigger_policy.condition.as_str();
        if condition.is_empty() {
            return Ok(None);
        }
        let will_trigger = self.engine.condition(executor_input, condition)?;
        debug!(condition, will_trigger, "evaluated trigger condition");
        Ok(Some(will_trigger))
    }
}

/// Iteration index as recorded on executions
fn recorded_iteration_index(options: &Options) -> Option<i64> {
    options.iteration().map(|_| options.iteration_index)
}

fn required<'a, T>(value: Option<&'a T>, message: &str) -> DriverResult<&'a T> {
    value.ok_or_else(|| DriverError::validation(message))
}
