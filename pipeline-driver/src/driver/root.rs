// Root DAG Driver
// Creates the pipeline context and the pipeline-level DAG execution of a run

use crate::config::LauncherConfig;
use crate::driver::validate::validate_root_dag;
use crate::driver::{required, Driver, RUN_RESOURCE};
use crate::error::DriverResult;
use crate::execution::Execution;
use crate::metadata::{run_parameters, ExecutionConfig, PipelineQuery, DAG_EXECUTION_TYPE};
use crate::options::Options;
use crate::spec::{ExecutorInput, ExecutorInputs};

use tracing::{debug, info};

impl Driver {
    /// Start a pipeline run. Only the execution id is returned: tasks in the DAG
    /// resolve their inputs from the metadata store.
    pub async fn root_dag(&self, options: &Options) -> DriverResult<Execution> {
        self.run_root_dag(options)
            .await
            .map_err(|e| e.wrap(format!("driver.RootDAG({}) failed", options.info())))
    }

    async fn run_root_dag(&self, options: &Options) -> DriverResult<Execution> {
        debug!(options = ?options, "RootDAG options");
        validate_root_dag(options)?;
        let runtime_config = required(options.runtime_config.as_ref(), "runtime config is required")?;

        let launcher_config = match self
            .launcher_config_source()
            .load(&options.namespace)
            .await?
        {
            Some(config) => config,
            None => {
                debug!(namespace = %options.namespace, "no launcher config, using defaults");
                LauncherConfig::default()
            }
        };

        let pipeline_root = if runtime_config.gcs_output_directory.is_empty() {
            let root = launcher_config.default_pipeline_root();
            info!(pipeline_root = %root, "PipelineRoot from default config");
            root
        } else {
            info!(pipeline_root = %runtime_config.gcs_output_directory, "PipelineRoot");
            runtime_config.gcs_output_directory.clone()
        };
        let session_info = launcher_config.store_session_info(&pipeline_root)?.to_json()?;

        let pipeline = self
            .store
            .get_pipeline(&PipelineQuery {
                pipeline_name: options.pipeline_name.clone(),
                run_id: options.run_id.clone(),
                namespace: options.namespace.clone(),
                run_resource: RUN_RESOURCE.to_string(),
                pipeline_root,
                store_session_info: session_info,
            })
            .await?;

        let executor_input = ExecutorInput::new(ExecutorInputs {
            parameter_values: runtime_config.parameter_values.clone(),
            ..Default::default()
        });
        let mut config = ExecutionConfig::from_executor_input(&executor_input);
        config.execution_type = DAG_EXECUTION_TYPE.to_string();
        config.display_name = format!("run/{}", options.run_id);

        let record = self
            .create_or_fetch_execution(options, &pipeline, &config)
            .await?;
        let run_name = if options.run_name.is_empty() {
            config.display_name.as_str()
        } else {
            options.run_name.as_str()
        };
        self.register_run(
            options,
            &pipeline,
            run_name,
            None,
            record.id,
            run_parameters(&config.input_parameters),
        )
        .await?;

        info!(execution_id = record.id, run_id = %options.run_id, "created root DAG execution");
        Ok(Execution::with_id(record.id))
    }
}
