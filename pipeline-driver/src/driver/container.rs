// Container Driver
// Resolves a leaf task, decides between cache reuse and a fresh launch, and builds its pod patch

use crate::driver::validate::validate_container;
use crate::driver::{recorded_iteration_index, required, Driver};
use crate::error::{DriverError, DriverResult, ResultExt};
use crate::execution::Execution;
use crate::metadata::{
    parameter_text, ExecutionConfig, ExecutionState, OutputArtifact, Pipeline, PipelineQuery,
    CONTAINER_EXECUTION_TYPE,
};
use crate::options::{Options, ProxyConfig};
use crate::podspec::{init_pod_spec_patch, PodSpecPatchRequest};
use crate::resolver::{resolve_inputs, ResolveScope};
use crate::spec::{
    ArtifactList, ArtifactTypeSchema, ComponentOutputsSpec, ExecutorInput, ExecutorOutputs,
    OutputArtifactDefinition, OutputParameter, RuntimeArtifact, OUTPUT_METADATA_FILEPATH,
};

use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Log artifact provisioned when the launcher publishes logs
pub const EXECUTOR_LOGS_ARTIFACT: &str = "executor-logs";

const OUTPUT_PARAMETER_DIR: &str = "/tmp/kfp/outputs";

/// `<root>/<paths...>` with the root's query string dropped and trailing slashes trimmed
pub fn generate_output_uri(pipeline_root: &str, paths: &[&str]) -> String {
    let root = pipeline_root.split('?').next().unwrap_or(pipeline_root);
    format!("{}/{}", root.trim_end_matches('/'), paths.join("/"))
}

/// Where a triggered task must write each declared output
pub fn provision_outputs(
    pipeline_root: &str,
    task_name: &str,
    outputs: &ComponentOutputsSpec,
    salt: &str,
    publish_logs: &str,
) -> ExecutorOutputs {
    let mut definitions = outputs.artifacts.clone();
    if publish_logs == "true" {
        definitions.insert(
            EXECUTOR_LOGS_ARTIFACT.to_string(),
            OutputArtifactDefinition {
                artifact_type: ArtifactTypeSchema::titled("system.Artifact"),
                metadata: None,
            },
        );
    }

    let artifacts = definitions
        .into_iter()
        .map(|(name, definition)| {
            let artifact = RuntimeArtifact {
                uri: generate_output_uri(pipeline_root, &[task_name, salt, name.as_str()]),
                artifact_type: definition.artifact_type,
                metadata: definition.metadata.unwrap_or_default(),
                ..Default::default()
            };
            (name, ArtifactList::single(artifact))
        })
        .collect();

    let parameters = outputs
        .parameters
        .keys()
        .map(|name| {
            let parameter = OutputParameter {
                output_file: format!("{}/{}", OUTPUT_PARAMETER_DIR, name),
            };
            (name.clone(), parameter)
        })
        .collect();

    ExecutorOutputs {
        parameters,
        artifacts,
        output_file: OUTPUT_METADATA_FILEPATH.to_string(),
    }
}

impl Driver {
    pub async fn container(&self, options: &Options) -> DriverResult<Execution> {
        self.run_container(options)
            .await
            .map_err(|e| e.wrap(format!("driver.Container({}) failed", options.info())))
    }

    async fn run_container(&self, options: &Options) -> DriverResult<Execution> {
        debug!(options = ?options, "Container options");
        validate_container(options)?;
        let task = required(options.task.as_ref(), "task spec is required")?;
        let component = required(options.component.as_ref(), "component spec is required")?;
        let container = required(options.container.as_ref(), "container spec is required")?;

        let pipeline = self
            .store
            .get_pipeline(&PipelineQuery {
                pipeline_name: options.pipeline_name.clone(),
                run_id: options.run_id.clone(),
                ..Default::default()
            })
            .await?;
        let dag = self.store.get_dag(options.dag_execution_id).await?;
        debug!(parent = dag.id(), task = task.name(), "parent DAG");

        let scope = ResolveScope::new(self.store.as_ref(), &dag, &pipeline, options);
        let inputs = resolve_inputs(&scope, &self.engine).await?;
        let mut executor_input = ExecutorInput::new(inputs);
        let condition = self.evaluate_condition(task, &executor_input)?;
        let will_trigger = condition != Some(false);

        // Platform operations have no launcher to publish logs
        let platform_op = self.config.is_dummy_image(&container.image);
        let publish_logs = if platform_op {
            "false"
        } else {
            options.publish_logs.as_str()
        };

        if will_trigger {
            executor_input.outputs = Some(provision_outputs(
                &pipeline.pipeline_root,
                task.name(),
                &component.output_definitions,
                &Uuid::new_v4().to_string(),
                publish_logs,
            ));
        }
        let mut execution = Execution {
            executor_input: Some(executor_input.clone()),
            condition,
            ..Default::default()
        };

        let mut config = ExecutionConfig::from_executor_input(&executor_input);
        config.task_name = task.name().to_string();
        config.execution_type = CONTAINER_EXECUTION_TYPE.to_string();
        config.parent_dag_id = dag.id();
        config.iteration_index = recorded_iteration_index(options);
        config.not_triggered = !will_trigger;

        if platform_op {
            return self
                .run_platform_op(options, &pipeline, &config, &executor_input, execution)
                .await;
        }

        let mut cached_execution_id = None;
        if will_trigger && options.caching_enabled() {
            info!(task = task.name(), "task enables cache");
            let fingerprint = self.cache.fingerprint(options, &executor_input)?;
            match self
                .cache
                .lookup(&fingerprint, &options.pipeline_name, &options.namespace)
                .await
            {
                Ok(found) => cached_execution_id = found,
                Err(e) => warn!(error = %e, task = task.name(), "cache lookup failed, running without cache"),
            }
            config.cached_execution_id = cached_execution_id
                .map(|id| id.to_string())
                .unwrap_or_default();
            config.fingerprint = fingerprint;
        }

        let record = self
            .create_or_fetch_execution(options, &pipeline, &config)
            .await?;
        let parameters = executor_input
            .inputs
            .parameter_values
            .iter()
            .map(|(key, value)| (key.clone(), parameter_text(value)))
            .collect();
        self.register_run(
            options,
            &pipeline,
            task.name(),
            Some(dag.id()),
            record.id,
            parameters,
        )
        .await?;
        info!(execution_id = record.id, task = task.name(), "created execution");
        execution.id = record.id;

        if !will_trigger {
            return Ok(execution);
        }

        execution.cached = Some(false);
        if let Some(cached_id) = cached_execution_id {
            let (output_parameters, output_artifacts) = self
                .reuse_cached_outputs(&executor_input, cached_id)
                .await?;
            self.store
                .publish_execution(
                    &record,
                    output_parameters,
                    output_artifacts,
                    ExecutionState::Cached,
                )
                .await
                .context("failed to publish cached execution")?;
            info!(task = task.name(), cached_execution_id = cached_id, "use cache for task");
            execution.cached = Some(true);
            return Ok(execution);
        }

        let proxy = if options.proxy == ProxyConfig::default() {
            &self.config.proxy
        } else {
            &options.proxy
        };
        let mut pod_spec = init_pod_spec_patch(&PodSpecPatchRequest {
            container,
            component,
            executor_input: &executor_input,
            execution_id: record.id,
            parent_execution_id: options.dag_execution_id,
            pipeline_name: &options.pipeline_name,
            run_id: &options.run_id,
            pipeline_log_level: &options.pipeline_log_level,
            publish_logs,
            launcher_path: &self.config.launcher_path,
            proxy,
        })?;
        if options.kubernetes_executor_config.is_some() {
            self.extension
                .extend(&mut pod_spec, &scope, dag.input_parameters())
                .await?;
        }
        execution.pod_spec_patch =
            serde_json::to_string(&pod_spec).context("JSON marshaling pod spec patch")?;
        Ok(execution)
    }

    /// Record the execution and hand the operation to the platform handler,
    /// publishing COMPLETE or FAILED from its outcome
    async fn run_platform_op(
        &self,
        options: &Options,
        pipeline: &Pipeline,
        config: &ExecutionConfig,
        executor_input: &ExecutorInput,
        mut execution: Execution,
    ) -> DriverResult<Execution> {
        let image = options
            .container
            .as_ref()
            .map(|c| c.image.as_str())
            .unwrap_or_default();
        let record = self
            .create_or_fetch_execution(options, pipeline, config)
            .await?;
        execution.id = record.id;
        if !execution.will_trigger() {
            return Ok(execution);
        }

        match self.platform_ops.handle(image, options, executor_input).await {
            Ok(outputs) => {
                self.store
                    .publish_execution(&record, outputs, Vec::new(), ExecutionState::Complete)
                    .await?;
                info!(image, execution_id = record.id, "platform operation completed");
                Ok(execution)
            }
            Err(e) => {
                if let Err(publish_err) = self
                    .store
                    .publish_execution(&record, BTreeMap::new(), Vec::new(), ExecutionState::Failed)
                    .await
                {
                    warn!(error = %publish_err, execution_id = record.id, "failed to publish failed platform operation");
                }
                Err(e.wrap(format!("platform operation {} failed", image)))
            }
        }
    }

    /// Output parameters and artifacts of a cached execution, with each artifact's
    /// schema taken from the current component's declared output type
    async fn reuse_cached_outputs(
        &self,
        executor_input: &ExecutorInput,
        cached_execution_id: i64,
    ) -> DriverResult<(BTreeMap<String, Value>, Vec<OutputArtifact>)> {
        let cached = self
            .store
            .get_execution(cached_execution_id)
            .await
            .with_context(|| {
                format!(
                    "failure while getting execution of cached execution {}",
                    cached_execution_id
                )
            })?;

        let stored = self
            .store
            .get_output_artifacts_by_execution_id(cached_execution_id)
            .await
            .with_context(|| {
                format!(
                    "failed to get output artifacts by executionId {}",
                    cached_execution_id
                )
            })?;

        let mut artifacts = Vec::new();
        if let Some(outputs) = &executor_input.outputs {
            for (name, list) in &outputs.artifacts {
                let Some(artifact) = list.first() else {
                    continue;
                };
                let mut output = stored.get(name).cloned().ok_or_else(|| {
                    DriverError::resolution(format!(
                        "unable to find artifact with name {} in output artifacts",
                        name
                    ))
                    .wrap("failed collect output artifact metadata from cache")
                })?;
                output.schema = artifact.artifact_type.instance_schema_or_title();
                artifacts.push(output);
            }
        }
        Ok((cached.output_parameters, artifacts))
    }
}
