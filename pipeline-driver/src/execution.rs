// Execution Model
// Result of a driver invocation, filled in as the state machine progresses

use crate::error::{DriverError, DriverResult};
use crate::spec::ExecutorInput;

use serde_json::Value;

/// Outcome of one Root/DAG/Container driver call
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Execution {
    /// Metadata-store id, 0 until persisted
    pub id: i64,
    pub executor_input: Option<ExecutorInput>,
    /// Number of iterations when the task is a fan-out iterator
    pub iteration_count: Option<usize>,
    /// None means unconditional
    pub condition: Option<bool>,
    /// Only set for container executions
    pub cached: Option<bool>,
    pub pod_spec_patch: String,
}

impl Execution {
    pub fn with_id(id: i64) -> Self {
        Self {
            id,
            ..Default::default()
        }
    }

    pub fn will_trigger(&self) -> bool {
        self.condition != Some(false)
    }
}

/// Items of a fan-out: a list value, or a string holding a JSON list
pub fn get_items(value: &Value) -> DriverResult<Vec<Value>> {
    match value {
        Value::Array(items) => Ok(items.clone()),
        Value::String(text) => match serde_json::from_str::<Value>(text)? {
            Value::Array(items) => Ok(items),
            other => Err(DriverError::resolution(format!(
                "value of type {} cannot be iterated",
                kind_name(&other)
            ))),
        },
        other => Err(DriverError::resolution(format!(
            "value of type {} cannot be iterated",
            kind_name(other)
        ))),
    }
}

/// Kind label of a parameter value, as used in diagnostics
pub fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "struct",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_will_trigger() {
        let mut execution = Execution::default();
        assert!(execution.will_trigger());
        execution.condition = Some(true);
        assert!(execution.will_trigger());
        execution.condition = Some(false);
        assert!(!execution.will_trigger());
    }

    #[test]
    fn test_get_items_from_list_and_json_string() {
        assert_eq!(get_items(&json!([1, 2])).unwrap(), vec![json!(1), json!(2)]);
        assert_eq!(
            get_items(&json!("[{\"a\": 1}, \"b\"]")).unwrap(),
            vec![json!({"a": 1}), json!("b")]
        );
    }

    #[test]
    fn test_get_items_rejects_scalars() {
        let err = get_items(&json!(3)).unwrap_err();
        assert!(err.to_string().contains("cannot be iterated"));
        assert!(get_items(&json!("{\"a\": 1}")).is_err());
        assert!(get_items(&json!("not json")).is_err());
    }
}
