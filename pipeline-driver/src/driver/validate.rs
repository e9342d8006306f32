// Option Validation
// Per entry point checks of which option fields must and must not be set

use crate::error::{DriverError, DriverResult};
use crate::options::Options;

fn require(condition: bool, message: &str) -> DriverResult<()> {
    if condition {
        Ok(())
    } else {
        Err(DriverError::validation(message))
    }
}

fn check_root(options: &Options) -> DriverResult<()> {
    require(!options.pipeline_name.is_empty(), "pipeline name is required")?;
    require(!options.run_id.is_empty(), "KFP run ID is required")?;
    require(options.component.is_some(), "component spec is required")?;
    require(options.runtime_config.is_some(), "runtime config is required")?;
    require(!options.namespace.is_empty(), "namespace is required")?;
    require(options.task_name().is_empty(), "task spec is unnecessary")?;
    require(options.dag_execution_id == 0, "DAG execution ID is unnecessary")?;
    require(options.container.is_none(), "container spec is unnecessary")?;
    require(options.iteration_index < 0, "iteration index is unnecessary")
}

fn check_non_root(options: &Options) -> DriverResult<()> {
    require(!options.pipeline_name.is_empty(), "pipeline name is required")?;
    require(!options.run_id.is_empty(), "KFP run ID is required")?;
    require(options.component.is_some(), "component spec is required")?;
    require(!options.task_name().is_empty(), "task spec is required")?;
    require(options.runtime_config.is_none(), "runtime config is unnecessary")?;
    require(options.dag_execution_id != 0, "DAG execution ID is required")
}

pub fn validate_root_dag(options: &Options) -> DriverResult<()> {
    check_root(options).map_err(|e| e.wrap("invalid root DAG driver args"))
}

pub fn validate_dag(options: &Options) -> DriverResult<()> {
    require(options.container.is_none(), "container spec is unnecessary")
        .and_then(|_| check_non_root(options))
        .map_err(|e| e.wrap("invalid DAG driver args"))
}

pub fn validate_container(options: &Options) -> DriverResult<()> {
    require(options.container.is_some(), "container spec is required")
        .and_then(|_| check_non_root(options))
        .map_err(|e| e.wrap("invalid container driver args"))
}
