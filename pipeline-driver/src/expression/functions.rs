// Built-in Functions
// Conversion and string helpers available to selector and condition expressions

use crate::execution::kind_name;
use crate::expression::evaluator::{float_value, EvalError};

use serde_json::Value;

/// Registry of built-in functions
pub struct BuiltinFunctions;

impl BuiltinFunctions {
    pub fn new() -> Self {
        Self
    }

    pub fn call(&self, name: &str, args: Vec<Value>) -> Result<Value, EvalError> {
        match name {
            // Conversion functions
            "parseJson" => self.fn_parse_json(args),
            "int" => self.fn_int(args),
            "double" => self.fn_double(args),
            "string" => self.fn_string(args),
            "bool" => self.fn_bool(args),

            // Collection functions
            "size" => self.fn_size(args),

            // String functions
            "contains" => self.fn_contains(args),
            "startsWith" => self.fn_starts_with(args),
            "endsWith" => self.fn_ends_with(args),
            "matches" => self.fn_matches(args),

            _ => Err(EvalError::new(format!("unknown function: {}", name))),
        }
    }

    // =========================================================================
    // Conversion Functions
    // =========================================================================

    /// Treat a string payload as embedded JSON
    fn fn_parse_json(&self, args: Vec<Value>) -> Result<Value, EvalError> {
        let text = match self.take_args::<1>(args, "parseJson")? {
            [Value::String(text)] => text,
            [other] => return Err(self.wrong_type("parseJson", &other)),
        };
        serde_json::from_str(&text)
            .map_err(|e| EvalError::new(format!("parseJson: invalid JSON {:?}: {}", text, e)))
    }

    fn fn_int(&self, args: Vec<Value>) -> Result<Value, EvalError> {
        let [value] = self.take_args::<1>(args, "int")?;
        match &value {
            Value::Number(n) => match n.as_i64() {
                Some(i) => Ok(Value::from(i)),
                None => {
                    let f = n.as_f64().unwrap_or_default();
                    if f.is_finite() && f >= i64::MIN as f64 && f <= i64::MAX as f64 {
                        Ok(Value::from(f.trunc() as i64))
                    } else {
                        Err(EvalError::new(format!("int: {} is out of range", f)))
                    }
                }
            },
            Value::String(s) => s
                .trim()
                .parse::<i64>()
                .map(Value::from)
                .map_err(|_| EvalError::new(format!("int: cannot convert {:?}", s))),
            Value::Bool(b) => Ok(Value::from(i64::from(*b))),
            other => Err(self.wrong_type("int", other)),
        }
    }

    fn fn_double(&self, args: Vec<Value>) -> Result<Value, EvalError> {
        let [value] = self.take_args::<1>(args, "double")?;
        match &value {
            Value::Number(n) => float_value(n.as_f64().unwrap_or_default()),
            Value::String(s) => {
                let parsed = s
                    .trim()
                    .parse::<f64>()
                    .map_err(|_| EvalError::new(format!("double: cannot convert {:?}", s)))?;
                float_value(parsed)
            }
            other => Err(self.wrong_type("double", other)),
        }
    }

    fn fn_string(&self, args: Vec<Value>) -> Result<Value, EvalError> {
        let [value] = self.take_args::<1>(args, "string")?;
        Ok(match value {
            Value::String(s) => Value::String(s),
            other => Value::String(other.to_string()),
        })
    }

    fn fn_bool(&self, args: Vec<Value>) -> Result<Value, EvalError> {
        let [value] = self.take_args::<1>(args, "bool")?;
        match &value {
            Value::Bool(b) => Ok(Value::Bool(*b)),
            Value::String(s) => match s.as_str() {
                "true" | "True" | "TRUE" | "t" | "1" => Ok(Value::Bool(true)),
                "false" | "False" | "FALSE" | "f" | "0" => Ok(Value::Bool(false)),
                _ => Err(EvalError::new(format!("bool: cannot convert {:?}", s))),
            },
            other => Err(self.wrong_type("bool", other)),
        }
    }

    // =========================================================================
    // Collection Functions
    // =========================================================================

    fn fn_size(&self, args: Vec<Value>) -> Result<Value, EvalError> {
        let [value] = self.take_args::<1>(args, "size")?;
        let size = match &value {
            Value::String(s) => s.chars().count(),
            Value::Array(items) => items.len(),
            Value::Object(map) => map.len(),
            other => return Err(self.wrong_type("size", other)),
        };
        Ok(Value::from(size as u64))
    }

    // =========================================================================
    // String Functions
    // =========================================================================

    fn fn_contains(&self, args: Vec<Value>) -> Result<Value, EvalError> {
        let (s, sub) = self.string_pair(args, "contains")?;
        Ok(Value::Bool(s.contains(&sub)))
    }

    fn fn_starts_with(&self, args: Vec<Value>) -> Result<Value, EvalError> {
        let (s, prefix) = self.string_pair(args, "startsWith")?;
        Ok(Value::Bool(s.starts_with(&prefix)))
    }

    fn fn_ends_with(&self, args: Vec<Value>) -> Result<Value, EvalError> {
        let (s, suffix) = self.string_pair(args, "endsWith")?;
        Ok(Value::Bool(s.ends_with(&suffix)))
    }

    fn fn_matches(&self, args: Vec<Value>) -> Result<Value, EvalError> {
        let (s, pattern) = self.string_pair(args, "matches")?;
        let re = regex::Regex::new(&pattern)
            .map_err(|e| EvalError::new(format!("matches: invalid pattern {:?}: {}", pattern, e)))?;
        Ok(Value::Bool(re.is_match(&s)))
    }

    // =========================================================================
    // Helper Functions
    // =========================================================================

    fn take_args<const N: usize>(&self, args: Vec<Value>, name: &str) -> Result<[Value; N], EvalError> {
        let count = args.len();
        args.try_into().map_err(|_| {
            EvalError::new(format!(
                "{}() requires {} argument(s), got {}",
                name, N, count
            ))
        })
    }

    fn string_pair(&self, args: Vec<Value>, name: &str) -> Result<(String, String), EvalError> {
        match self.take_args::<2>(args, name)? {
            [Value::String(a), Value::String(b)] => Ok((a, b)),
            [a, b] => Err(EvalError::new(format!(
                "no such overload: {}({}, {})",
                name,
                kind_name(&a),
                kind_name(&b)
            ))),
        }
    }

    fn wrong_type(&self, name: &str, value: &Value) -> EvalError {
        EvalError::new(format!("no such overload: {}({})", name, kind_name(value)))
    }
}

impl Default for BuiltinFunctions {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn call(name: &str, args: Vec<Value>) -> Result<Value, EvalError> {
        BuiltinFunctions::new().call(name, args)
    }

    #[test]
    fn test_parse_json() {
        assert_eq!(
            call("parseJson", vec![json!("{\"a\": [1, 2]}")]).unwrap(),
            json!({"a": [1, 2]})
        );
        assert!(call("parseJson", vec![json!("{oops")]).is_err());
        assert!(call("parseJson", vec![json!(1)]).is_err());
    }

    #[test]
    fn test_conversions() {
        assert_eq!(call("int", vec![json!("42")]).unwrap(), json!(42));
        assert_eq!(call("int", vec![json!(3.9)]).unwrap(), json!(3));
        assert_eq!(call("double", vec![json!("0.25")]).unwrap(), json!(0.25));
        assert_eq!(call("string", vec![json!(5)]).unwrap(), json!("5"));
        assert_eq!(call("string", vec![json!("x")]).unwrap(), json!("x"));
        assert_eq!(call("bool", vec![json!("true")]).unwrap(), json!(true));
        assert!(call("int", vec![json!("four")]).is_err());
    }

    #[test]
    fn test_string_functions() {
        assert_eq!(
            call("startsWith", vec![json!("gs://bucket"), json!("gs://")]).unwrap(),
            json!(true)
        );
        assert_eq!(
            call("endsWith", vec![json!("model.pt"), json!(".onnx")]).unwrap(),
            json!(false)
        );
        assert_eq!(
            call("contains", vec![json!("heads"), json!("ead")]).unwrap(),
            json!(true)
        );
        assert_eq!(
            call("matches", vec![json!("v1.2.3"), json!(r"^v\d+\.\d+\.\d+$")]).unwrap(),
            json!(true)
        );
        assert_eq!(call("size", vec![json!([1, 2, 3])]).unwrap(), json!(3));
    }

    #[test]
    fn test_argument_errors() {
        let err = call("size", vec![]).unwrap_err();
        assert_eq!(err.message, "size() requires 1 argument(s), got 0");
        assert!(call("contains", vec![json!(1), json!("a")]).is_err());
        assert!(call("nope", vec![]).is_err());
    }
}
