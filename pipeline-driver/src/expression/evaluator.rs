// Expression Evaluator
// Evaluates expression ASTs over JSON values bound to named variables

use crate::execution::kind_name;
use crate::expression::functions::BuiltinFunctions;
use crate::expression::parser::{BinaryOp, Expr, UnaryOp};

use serde_json::{Map, Number, Value};
use std::collections::BTreeMap;
use std::fmt;

/// Evaluation error
#[derive(Debug, Clone, PartialEq)]
pub struct EvalError {
    pub message: String,
}

impl fmt::Display for EvalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "evaluation error: {}", self.message)
    }
}

impl std::error::Error for EvalError {}

impl EvalError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Variables visible to an expression
#[derive(Debug, Clone, Default)]
pub struct ExpressionContext {
    variables: BTreeMap<String, Value>,
}

impl ExpressionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_variable(mut self, name: impl Into<String>, value: Value) -> Self {
        self.variables.insert(name.into(), value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.variables.get(name)
    }
}

pub struct Evaluator<'a> {
    context: &'a ExpressionContext,
    functions: BuiltinFunctions,
}

impl<'a> Evaluator<'a> {
    pub fn new(context: &'a ExpressionContext) -> Self {
        Self {
            context,
            functions: BuiltinFunctions::new(),
        }
    }

    pub fn eval(&self, expr: &Expr) -> Result<Value, EvalError> {
        match expr {
            Expr::Null => Ok(Value::Null),
            Expr::Bool(b) => Ok(Value::Bool(*b)),
            Expr::Int(n) => Ok(Value::from(*n)),
            Expr::Double(n) => float_value(*n),
            Expr::String(s) => Ok(Value::String(s.clone())),

            Expr::Ident(name) => self
                .context
                .get(name)
                .cloned()
                .ok_or_else(|| EvalError::new(format!("undeclared reference to '{}'", name))),

            Expr::FunctionCall { name, args } => {
                let evaluated: Result<Vec<Value>, EvalError> =
                    args.iter().map(|a| self.eval(a)).collect();
                self.functions.call(name, evaluated?)
            }

            Expr::Index { object, index } => {
                let obj = self.eval(object)?;
                let idx = self.eval(index)?;
                self.eval_index(&obj, &idx)
            }

            Expr::Member { object, property } => {
                let obj = self.eval(object)?;
                self.eval_member(&obj, property)
            }

            Expr::Unary { op, expr } => {
                let val = self.eval(expr)?;
                self.eval_unary(*op, &val)
            }

            Expr::Binary { op, left, right } => match op {
                // Short-circuit evaluation for && and ||
                BinaryOp::And => {
                    if !as_bool(&self.eval(left)?, "&&")? {
                        return Ok(Value::Bool(false));
                    }
                    Ok(Value::Bool(as_bool(&self.eval(right)?, "&&")?))
                }
                BinaryOp::Or => {
                    if as_bool(&self.eval(left)?, "||")? {
                        return Ok(Value::Bool(true));
                    }
                    Ok(Value::Bool(as_bool(&self.eval(right)?, "||")?))
                }
                _ => {
                    let left_val = self.eval(left)?;
                    let right_val = self.eval(right)?;
                    self.eval_binary(*op, &left_val, &right_val)
                }
            },

            Expr::Ternary {
                condition,
                then_expr,
                else_expr,
            } => {
                if as_bool(&self.eval(condition)?, "?:")? {
                    self.eval(then_expr)
                } else {
                    self.eval(else_expr)
                }
            }

            Expr::List(items) => {
                let values: Result<Vec<Value>, EvalError> =
                    items.iter().map(|e| self.eval(e)).collect();
                Ok(Value::Array(values?))
            }

            Expr::Map(pairs) => {
                let mut map = Map::new();
                for (key, value_expr) in pairs {
                    map.insert(key.clone(), self.eval(value_expr)?);
                }
                Ok(Value::Object(map))
            }
        }
    }

    fn eval_index(&self, object: &Value, index: &Value) -> Result<Value, EvalError> {
        match (object, index) {
            (Value::Array(arr), Value::Number(n)) => {
                let i = n
                    .as_i64()
                    .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64))
                    .ok_or_else(|| EvalError::new(format!("invalid list index {}", n)))?;
                usize::try_from(i)
                    .ok()
                    .and_then(|i| arr.get(i))
                    .cloned()
                    .ok_or_else(|| {
                        EvalError::new(format!("index {} out of range for list of size {}", i, arr.len()))
                    })
            }
            (Value::Object(map), Value::String(key)) => map
                .get(key)
                .cloned()
                .ok_or_else(|| EvalError::new(format!("no such key: {}", key))),
            _ => Err(EvalError::new(format!(
                "cannot index {} with {}",
                kind_name(object),
                kind_name(index)
            ))),
        }
    }

    fn eval_member(&self, object: &Value, property: &str) -> Result<Value, EvalError> {
        match object {
            Value::Object(map) => map
                .get(property)
                .cloned()
                .ok_or_else(|| EvalError::new(format!("no such key: {}", property))),
            _ => Err(EvalError::new(format!(
                "cannot access field '{}' on {}",
                property,
                kind_name(object)
            ))),
        }
    }

    fn eval_unary(&self, op: UnaryOp, value: &Value) -> Result<Value, EvalError> {
        match op {
            UnaryOp::Not => Ok(Value::Bool(!as_bool(value, "!")?)),
            UnaryOp::Neg => match value {
                Value::Number(n) => match n.as_i64() {
                    Some(i) => i
                        .checked_neg()
                        .map(Value::from)
                        .ok_or_else(|| EvalError::new("integer overflow")),
                    None => float_value(-n.as_f64().unwrap_or_default()),
                },
                other => Err(EvalError::new(format!("cannot negate {}", kind_name(other)))),
            },
        }
    }

    fn eval_binary(&self, op: BinaryOp, left: &Value, right: &Value) -> Result<Value, EvalError> {
        match op {
            BinaryOp::Add => self.eval_add(left, right),
            BinaryOp::Sub => self.eval_numeric_op(op, left, right, i64::checked_sub, |a, b| a - b),
            BinaryOp::Mul => self.eval_numeric_op(op, left, right, i64::checked_mul, |a, b| a * b),
            BinaryOp::Div => self.eval_numeric_op(op, left, right, i64::checked_div, |a, b| a / b),
            BinaryOp::Mod => self.eval_numeric_op(op, left, right, i64::checked_rem, |a, b| a % b),

            BinaryOp::Eq => Ok(Value::Bool(values_equal(left, right))),
            BinaryOp::Ne => Ok(Value::Bool(!values_equal(left, right))),
            BinaryOp::Lt => self.eval_comparison(op, left, right, |o| o.is_lt()),
            BinaryOp::Le => self.eval_comparison(op, left, right, |o| o.is_le()),
            BinaryOp::Gt => self.eval_comparison(op, left, right, |o| o.is_gt()),
            BinaryOp::Ge => self.eval_comparison(op, left, right, |o| o.is_ge()),
            BinaryOp::In => match right {
                Value::Array(items) => Ok(Value::Bool(items.iter().any(|i| values_equal(left, i)))),
                Value::Object(map) => match left {
                    Value::String(key) => Ok(Value::Bool(map.contains_key(key))),
                    other => Err(no_overload(op, other, right)),
                },
                other => Err(no_overload(op, left, other)),
            },

            // handled in eval() for short-circuit
            BinaryOp::And | BinaryOp::Or => Err(EvalError::new(format!("unexpected operator {}", op))),
        }
    }

    fn eval_add(&self, left: &Value, right: &Value) -> Result<Value, EvalError> {
        match (left, right) {
            (Value::Number(_), Value::Number(_)) => {
                self.eval_numeric_op(BinaryOp::Add, left, right, i64::checked_add, |a, b| a + b)
            }
            (Value::String(a), Value::String(b)) => Ok(Value::String(format!("{}{}", a, b))),
            (Value::Array(a), Value::Array(b)) => {
                Ok(Value::Array(a.iter().chain(b.iter()).cloned().collect()))
            }
            _ => Err(no_overload(BinaryOp::Add, left, right)),
        }
    }

    fn eval_numeric_op<I, F>(
        &self,
        op: BinaryOp,
        left: &Value,
        right: &Value,
        int_op: I,
        float_op: F,
    ) -> Result<Value, EvalError>
    where
        I: FnOnce(i64, i64) -> Option<i64>,
        F: FnOnce(f64, f64) -> f64,
    {
        let (Value::Number(a), Value::Number(b)) = (left, right) else {
            return Err(no_overload(op, left, right));
        };
        match (a.as_i64(), b.as_i64()) {
            (Some(a), Some(b)) => int_op(a, b).map(Value::from).ok_or_else(|| {
                EvalError::new(format!("integer {} failed: {} {} {}", op_name(op), a, op, b))
            }),
            _ => float_value(float_op(
                a.as_f64().unwrap_or_default(),
                b.as_f64().unwrap_or_default(),
            )),
        }
    }

    fn eval_comparison<F>(
        &self,
        op: BinaryOp,
        left: &Value,
        right: &Value,
        test: F,
    ) -> Result<Value, EvalError>
    where
        F: FnOnce(std::cmp::Ordering) -> bool,
    {
        let ordering = match (left, right) {
            (Value::Number(a), Value::Number(b)) => compare_numbers(a, b),
            (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
            (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            _ => None,
        };
        ordering
            .map(|o| Value::Bool(test(o)))
            .ok_or_else(|| no_overload(op, left, right))
    }
}

/// Equality with numeric comparison across int/double representations
pub fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => compare_numbers(a, b) == Some(std::cmp::Ordering::Equal),
        (Value::Array(a), Value::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| values_equal(x, y))
        }
        (Value::Object(a), Value::Object(b)) => {
            a.len() == b.len()
                && a.iter()
                    .all(|(k, v)| b.get(k).map(|w| values_equal(v, w)).unwrap_or(false))
        }
        _ => left == right,
    }
}

fn compare_numbers(a: &Number, b: &Number) -> Option<std::cmp::Ordering> {
    match (a.as_i64(), b.as_i64()) {
        (Some(a), Some(b)) => Some(a.cmp(&b)),
        _ => a.as_f64()?.partial_cmp(&b.as_f64()?),
    }
}

pub(crate) fn as_bool(value: &Value, op: &str) -> Result<bool, EvalError> {
    match value {
        Value::Bool(b) => Ok(*b),
        other => Err(EvalError::new(format!(
            "no such overload: {} applied to {}",
            op,
            kind_name(other)
        ))),
    }
}

/// JSON cannot carry NaN or infinities
pub(crate) fn float_value(n: f64) -> Result<Value, EvalError> {
    Number::from_f64(n)
        .map(Value::Number)
        .ok_or_else(|| EvalError::new(format!("{} is not a finite number", n)))
}

fn no_overload(op: BinaryOp, left: &Value, right: &Value) -> EvalError {
    EvalError::new(format!(
        "no such overload: {} {} {}",
        kind_name(left),
        op,
        kind_name(right)
    ))
}

fn op_name(op: BinaryOp) -> &'static str {
    match op {
        BinaryOp::Add => "addition",
        BinaryOp::Sub => "subtraction",
        BinaryOp::Mul => "multiplication",
        BinaryOp::Div => "division",
        BinaryOp::Mod => "modulus",
        _ => "operation",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::parser::ExprParser;
    use serde_json::json;

    fn eval(expr: &str, context: &ExpressionContext) -> Result<Value, EvalError> {
        let ast = ExprParser::parse_str(expr).unwrap();
        Evaluator::new(context).eval(&ast)
    }

    fn context() -> ExpressionContext {
        ExpressionContext::new()
            .with_variable("count", json!(3))
            .with_variable("ratio", json!(0.5))
            .with_variable("name", json!("train"))
            .with_variable("config", json!({"lr": 0.1, "layers": [64, 32]}))
    }

    #[test]
    fn test_eval_literals_and_variables() {
        let ctx = context();
        assert_eq!(eval("null", &ctx).unwrap(), Value::Null);
        assert_eq!(eval("count", &ctx).unwrap(), json!(3));
        assert_eq!(eval("config.layers[1]", &ctx).unwrap(), json!(32));
        assert_eq!(eval("config['lr']", &ctx).unwrap(), json!(0.1));
    }

    #[test]
    fn test_eval_arithmetic() {
        let ctx = context();
        assert_eq!(eval("count * 2 + 1", &ctx).unwrap(), json!(7));
        assert_eq!(eval("count / 2", &ctx).unwrap(), json!(1));
        assert_eq!(eval("ratio * 4", &ctx).unwrap(), json!(2.0));
        assert_eq!(eval("-count", &ctx).unwrap(), json!(-3));
        assert!(eval("count / 0", &ctx).is_err());
        assert_eq!(eval("name + '-v2'", &ctx).unwrap(), json!("train-v2"));
    }

    #[test]
    fn test_eval_comparison_and_logic() {
        let ctx = context();
        assert_eq!(eval("count > 2 && name == 'train'", &ctx).unwrap(), json!(true));
        assert_eq!(eval("count == 3.0", &ctx).unwrap(), json!(true));
        assert_eq!(eval("name < 'zeta'", &ctx).unwrap(), json!(true));
        assert_eq!(eval("64 in config.layers", &ctx).unwrap(), json!(true));
        assert_eq!(eval("'lr' in config", &ctx).unwrap(), json!(true));
        assert_eq!(eval("count > 5 ? 'big' : 'small'", &ctx).unwrap(), json!("small"));
    }

    #[test]
    fn test_eval_short_circuit() {
        let ctx = context();
        // the right side would fail on the undeclared variable
        assert_eq!(eval("false && missing", &ctx).unwrap(), json!(false));
        assert_eq!(eval("true || missing", &ctx).unwrap(), json!(true));
    }

    #[test]
    fn test_eval_errors() {
        let ctx = context();
        let err = eval("missing", &ctx).unwrap_err();
        assert_eq!(err.message, "undeclared reference to 'missing'");
        assert!(eval("config.epochs", &ctx).is_err());
        assert!(eval("config.layers[5]", &ctx).is_err());
        assert!(eval("count && true", &ctx).is_err());
        assert!(eval("name - 1", &ctx).is_err());
        assert!(eval("name < 1", &ctx).is_err());
    }
}
