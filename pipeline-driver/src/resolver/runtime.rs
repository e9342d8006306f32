// Runtime Values
// Magic runtime-value tokens and `$.inputs.parameters['x']` channel placeholders

use crate::error::{DriverError, DriverResult};
use crate::options::Options;
use crate::spec::ExecutorInput;

use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

pub const PIPELINE_JOB_NAME: &str = "{{$.pipeline_job_name}}";
pub const PIPELINE_JOB_RESOURCE_NAME: &str = "{{$.pipeline_job_resource_name}}";
pub const PIPELINE_JOB_UUID: &str = "{{$.pipeline_job_uuid}}";
pub const PIPELINE_TASK_NAME: &str = "{{$.pipeline_task_name}}";
pub const PIPELINE_TASK_UUID: &str = "{{$.pipeline_task_uuid}}";

fn input_channel_pattern() -> DriverResult<&'static Regex> {
    static PATTERN: OnceLock<Result<Regex, regex::Error>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"\$.inputs.parameters\['(.+?)'\]"))
        .as_ref()
        .map_err(|e| DriverError::infrastructure(format!("invalid input channel pattern: {}", e)))
}

/// Substitute a runtime constant that names a run or task attribute;
/// anything else passes through unchanged
pub fn resolve_runtime_constant(constant: &Value, options: &Options) -> Value {
    let Value::String(text) = constant else {
        return constant.clone();
    };
    let substituted = match text.as_str() {
        PIPELINE_JOB_NAME => options.run_display_name.clone(),
        PIPELINE_JOB_RESOURCE_NAME => options.run_name.clone(),
        PIPELINE_JOB_UUID => options.run_id.clone(),
        PIPELINE_TASK_NAME => options.task_name().to_string(),
        PIPELINE_TASK_UUID => options.dag_execution_id.to_string(),
        _ => return constant.clone(),
    };
    Value::String(substituted)
}

/// The parameter name when the value is exactly one input parameter channel
pub fn input_parameter_channel(value: &str) -> DriverResult<Option<String>> {
    let pattern = input_channel_pattern()?;
    if pattern.find_iter(value).count() != 1 {
        return Ok(None);
    }
    Ok(pattern
        .captures(value)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string()))
}

/// Resolve a pod-spec field that may reference an input parameter
pub fn resolve_pod_spec_runtime_parameter(
    value: &str,
    executor_input: &ExecutorInput,
) -> DriverResult<String> {
    let Some(name) = input_parameter_channel(value)? else {
        return Ok(value.to_string());
    };
    match executor_input.inputs.parameter_values.get(&name) {
        Some(Value::String(resolved)) => Ok(resolved.clone()),
        Some(_) => Ok(String::new()),
        None => Err(DriverError::resolution(
            "executorInput did not contain container Image input parameter",
        )),
    }
}
