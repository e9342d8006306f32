// Resource Quantities
// Picks and validates CPU, memory and accelerator quantities for the main container

use crate::error::{DriverError, DriverResult, ResultExt};
use crate::resolver::resolve_pod_spec_runtime_parameter;
use crate::spec::ExecutorInput;

use regex::Regex;
use std::sync::OnceLock;

const QUANTITY_EXPRESSION: &str =
    r"^[+-]?(?:[0-9]+(?:\.[0-9]*)?|\.[0-9]+)(?:[eE][+-]?[0-9]+|[KMGTPE]i|[numkMGTPE])?$";

fn quantity_pattern() -> DriverResult<&'static Regex> {
    static PATTERN: OnceLock<Result<Regex, regex::Error>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(QUANTITY_EXPRESSION))
        .as_ref()
        .map_err(|e| DriverError::infrastructure(format!("invalid quantity pattern: {}", e)))
}

/// Check `text` is a Kubernetes quantity and return it trimmed
pub fn parse_quantity(text: &str) -> DriverResult<String> {
    let trimmed = text.trim();
    if !quantity_pattern()?.is_match(trimmed) {
        return Err(DriverError::resolution(format!(
            "quantities must match the regular expression '{}', got {:?}",
            QUANTITY_EXPRESSION, text
        )));
    }
    Ok(trimmed.to_string())
}

/// Render a legacy float field, `suffix` being `"G"` for memory and empty for CPU
pub fn legacy_quantity(value: f64, suffix: &str) -> String {
    format!("{}{}", shortest_float(value), suffix)
}

/// Shortest float text, switching to `d.ddde±XX` when the decimal exponent is
/// below -4 or at least 6
fn shortest_float(value: f64) -> String {
    if value == 0.0 || !value.is_finite() {
        return value.to_string();
    }
    let scientific = format!("{:e}", value);
    let Some((mantissa, exponent)) = scientific.split_once('e') else {
        return value.to_string();
    };
    let exponent: i32 = match exponent.parse() {
        Ok(exponent) => exponent,
        Err(_) => return value.to_string(),
    };
    if (-4..6).contains(&exponent) {
        value.to_string()
    } else {
        let sign = if exponent < 0 { '-' } else { '+' };
        format!("{}e{}{:02}", mantissa, sign, exponent.abs())
    }
}

/// Quantity of one resource field. The placeholder-capable field wins over the
/// legacy float one; `None` when neither is set.
pub fn pod_resource(
    field: &str,
    legacy: f64,
    executor_input: &ExecutorInput,
    suffix: &str,
) -> DriverResult<Option<String>> {
    let resolved = if !field.is_empty() {
        resolve_pod_spec_runtime_parameter(field, executor_input)
            .context("failed to resolve executor input when retrieving pod resource")?
    } else if legacy != 0.0 {
        legacy_quantity(legacy, suffix)
    } else {
        return Ok(None);
    };
    parse_quantity(&resolved).map(Some)
}
