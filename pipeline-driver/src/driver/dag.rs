// DAG Driver
// Records a nested sub-graph execution, its fan-out width and its output producers

use crate::driver::validate::validate_dag;
use crate::driver::{recorded_iteration_index, required, Driver};
use crate::error::{DriverError, DriverResult};
use crate::execution::{get_items, Execution};
use crate::metadata::producer::{artifact_producers, parameter_producers};
use crate::metadata::{ExecutionConfig, PipelineQuery, DAG_EXECUTION_TYPE};
use crate::options::Options;
use crate::resolver::{resolve_inputs, ResolveScope};
use crate::spec::{ExecutorInput, ExecutorInputs, ParameterIteratorSpec};

use serde_json::Value;
use tracing::{debug, info};

impl Driver {
    pub async fn dag(&self, options: &Options) -> DriverResult<Execution> {
        self.run_dag(options)
            .await
            .map_err(|e| e.wrap(format!("driver.DAG({}) failed", options.info())))
    }

    async fn run_dag(&self, options: &Options) -> DriverResult<Execution> {
        debug!(options = ?options, "DAG options");
        validate_dag(options)?;
        let task = required(options.task.as_ref(), "task spec is required")?;
        let component = required(options.component.as_ref(), "component spec is required")?;

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
        let executor_input = ExecutorInput::new(inputs);
        let condition = self.evaluate_condition(task, &executor_input)?;

        let mut execution = Execution {
            executor_input: Some(executor_input.clone()),
            condition,
            ..Default::default()
        };

        let mut config = ExecutionConfig::from_executor_input(&executor_input);
        config.task_name = task.name().to_string();
        config.execution_type = DAG_EXECUTION_TYPE.to_string();
        config.parent_dag_id = dag.id();
        config.iteration_index = recorded_iteration_index(options);
        config.not_triggered = !execution.will_trigger();
        if let Some(spec) = &component.dag {
            config.parameter_producers = Some(parameter_producers(&spec.outputs));
            config.artifact_producers = Some(artifact_producers(&spec.outputs));
        }

        if task.artifact_iterator.is_some() {
            return Err(DriverError::not_implemented(
                "artifact iterator not implemented yet",
            ));
        }
        if execution.will_trigger() && options.iteration().is_none() {
            if let Some(iterator) = &task.parameter_iterator {
                let count = iteration_items(iterator, &executor_input.inputs)?.len();
                info!(task = task.name(), count, "fanning out iterations");
                config.iteration_count = Some(count);
                execution.iteration_count = Some(count);
            }
        }

        let record = self
            .create_or_fetch_execution(options, &pipeline, &config)
            .await?;
        info!(execution_id = record.id, task = task.name(), "created DAG execution");
        execution.id = record.id;
        Ok(execution)
    }
}

/// Items an iterator DAG fans out over: a raw JSON list, or the resolved items input
fn iteration_items(
    iterator: &ParameterIteratorSpec,
    inputs: &ExecutorInputs,
) -> DriverResult<Vec<Value>> {
    if let Some(raw) = iterator.items.raw.as_deref().filter(|r| !r.is_empty()) {
        return get_items(&Value::String(raw.to_string()));
    }
    let name = iterator
        .items
        .input_parameter
        .as_deref()
        .filter(|n| !n.is_empty())
        .unwrap_or(iterator.item_input.as_str());
    let value = inputs
        .parameter_values
        .get(name)
        .ok_or_else(|| DriverError::resolution(format!("failed to get items input {}", name)))?;
    get_items(value)
}
