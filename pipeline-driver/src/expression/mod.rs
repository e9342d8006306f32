// Expression Module
// Parameter selectors and trigger conditions over resolved inputs

pub mod evaluator;
pub mod functions;
pub mod lexer;
pub mod parser;

pub use evaluator::{values_equal, EvalError, Evaluator, ExpressionContext};
pub use functions::BuiltinFunctions;
pub use lexer::{LexError, Lexer, Token};
pub use parser::{BinaryOp, Expr, ExprParser, ParseExprError, UnaryOp};

use crate::execution::kind_name;
use crate::spec::ExecutorInput;

use serde_json::{json, Map, Value};
use thiserror::Error;

/// Failure to parse or evaluate an expression, carrying its text
#[derive(Debug, Clone, Error)]
pub enum ExpressionError {
    #[error("failed to parse expression {expression:?}: {source}")]
    Parse {
        expression: String,
        #[source]
        source: ParseExprError,
    },

    #[error("failed to evaluate expression {expression:?}: {source}")]
    Eval {
        expression: String,
        #[source]
        source: EvalError,
    },

    #[error("condition {expression:?} evaluated to {actual}, expected bool")]
    NotBool { expression: String, actual: String },
}

impl ExpressionError {
    pub fn expression(&self) -> &str {
        match self {
            ExpressionError::Parse { expression, .. }
            | ExpressionError::Eval { expression, .. }
            | ExpressionError::NotBool { expression, .. } => expression,
        }
    }
}

/// Entry point for selector and condition evaluation
#[derive(Debug, Clone, Copy, Default)]
pub struct ExpressionEngine;

impl ExpressionEngine {
    pub fn new() -> Self {
        Self
    }

    /// Apply a selector to one resolved value. The value is bound to the variable
    /// named after its kind: `string_value`, `number_value`, `bool_value`,
    /// `list_value`, `struct_value` or `null_value`.
    pub fn select(&self, value: &Value, expression: &str) -> Result<Value, ExpressionError> {
        let variable = match value {
            Value::Null => "null_value",
            Value::Bool(_) => "bool_value",
            Value::Number(_) => "number_value",
            Value::String(_) => "string_value",
            Value::Array(_) => "list_value",
            Value::Object(_) => "struct_value",
        };
        let context = ExpressionContext::new().with_variable(variable, value.clone());
        self.evaluate(&context, expression)
    }

    /// Evaluate a trigger condition against the full resolved input set, exposed as
    /// `inputs.parameter_values` and `inputs.artifacts`
    pub fn condition(
        &self,
        executor_input: &ExecutorInput,
        expression: &str,
    ) -> Result<bool, ExpressionError> {
        let inputs = &executor_input.inputs;
        let mut artifacts = Map::new();
        for (name, list) in &inputs.artifacts {
            let value = serde_json::to_value(list).map_err(|e| ExpressionError::Eval {
                expression: expression.to_string(),
                source: EvalError::new(format!("encoding input artifact {:?}: {}", name, e)),
            })?;
            artifacts.insert(name.clone(), value);
        }
        let parameter_values: Map<String, Value> = inputs
            .parameter_values
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        let context = ExpressionContext::new().with_variable(
            "inputs",
            json!({
                "parameter_values": parameter_values,
                "artifacts": artifacts,
            }),
        );
        match self.evaluate(&context, expression)? {
            Value::Bool(result) => Ok(result),
            other => Err(ExpressionError::NotBool {
                expression: expression.to_string(),
                actual: kind_name(&other).to_string(),
            }),
        }
    }

    fn evaluate(&self, context: &ExpressionContext, expression: &str) -> Result<Value, ExpressionError> {
        let ast = ExprParser::parse_str(expression).map_err(|source| ExpressionError::Parse {
            expression: expression.to_string(),
            source,
        })?;
        Evaluator::new(context)
            .eval(&ast)
            .map_err(|source| ExpressionError::Eval {
                expression: expression.to_string(),
                source,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::{ArtifactList, ArtifactTypeSchema, ExecutorInputs, RuntimeArtifact};

    #[test]
    fn test_select_field_from_json_string() {
        let engine = ExpressionEngine::new();
        let value = json!("{\"metrics\": {\"accuracy\": 0.93}, \"tags\": [\"a\", \"b\"]}");
        assert_eq!(
            engine
                .select(&value, "parseJson(string_value)['metrics']['accuracy']")
                .unwrap(),
            json!(0.93)
        );
        assert_eq!(
            engine.select(&value, "parseJson(string_value).tags[1]").unwrap(),
            json!("b")
        );
    }

    #[test]
    fn test_select_binds_by_kind() {
        let engine = ExpressionEngine::new();
        assert_eq!(
            engine.select(&json!({"a": 1}), "struct_value.a").unwrap(),
            json!(1)
        );
        assert_eq!(engine.select(&json!([4, 5]), "size(list_value)").unwrap(), json!(2));
        assert_eq!(engine.select(&json!(7), "number_value * 2").unwrap(), json!(14));

        let err = engine.select(&json!(7), "string_value").unwrap_err();
        assert_eq!(err.expression(), "string_value");
        assert!(err.to_string().contains("undeclared reference"));
    }

    #[test]
    fn test_condition_on_parameters() {
        let engine = ExpressionEngine::new();
        let mut inputs = ExecutorInputs::default();
        inputs.parameter_values.insert(
            "pipelinechannel--flip-coin-Output".to_string(),
            json!("heads"),
        );
        inputs
            .parameter_values
            .insert("pipelinechannel--threshold".to_string(), json!(3));
        let executor_input = ExecutorInput::new(inputs);

        assert!(engine
            .condition(
                &executor_input,
                "inputs.parameter_values['pipelinechannel--flip-coin-Output'] == 'heads'"
            )
            .unwrap());
        assert!(!engine
            .condition(
                &executor_input,
                "int(inputs.parameter_values['pipelinechannel--threshold']) > 5"
            )
            .unwrap());
    }

    #[test]
    fn test_condition_sees_artifacts() {
        let engine = ExpressionEngine::new();
        let mut inputs = ExecutorInputs::default();
        inputs.artifacts.insert(
            "model".to_string(),
            ArtifactList::single(RuntimeArtifact {
                uri: "oci://registry/model:1".to_string(),
                artifact_type: ArtifactTypeSchema::titled("system.Model"),
                ..Default::default()
            }),
        );
        let executor_input = ExecutorInput::new(inputs);
        assert!(engine
            .condition(
                &executor_input,
                "inputs.artifacts['model'].artifacts[0].uri.startsWith('oci://')"
            )
            .unwrap());
    }

    #[test]
    fn test_condition_requires_bool() {
        let engine = ExpressionEngine::new();
        let err = engine
            .condition(&ExecutorInput::default(), "1 + 1")
            .unwrap_err();
        assert!(matches!(err, ExpressionError::NotBool { .. }));
        assert!(engine.condition(&ExecutorInput::default(), "1 +").is_err());
    }
}
