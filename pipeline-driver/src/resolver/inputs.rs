// Input Resolution
// Resolves task inputs against the parent DAG, upstream tasks and runtime constants

use crate::error::{DriverError, DriverResult, ResultExt};
use crate::execution::{get_items, kind_name};
use crate::expression::ExpressionEngine;
use crate::metadata::parameter_text;
use crate::resolver::runtime::resolve_runtime_constant;
use crate::resolver::upstream::{resolve_upstream_artifact, resolve_upstream_parameter};
use crate::resolver::ResolveScope;
use crate::spec::{
    ArtifactList, ArtifactSource, ComponentSpec, ExecutorInputs, InputArtifactSpec,
    InputParameterSpec, ParameterSource, ParameterType, TaskSpec,
};

use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Resolve every input of the task in `scope.options` into executor inputs.
///
/// Iterations take the parent DAG's inputs with the items list swapped for the
/// current item; other tasks resolve each declared input. Both paths then apply
/// parameter selectors and check values against the component's declared types.
pub async fn resolve_inputs(
    scope: &ResolveScope<'_>,
    engine: &ExpressionEngine,
) -> DriverResult<ExecutorInputs> {
    collect_inputs(scope, engine)
        .await
        .context("failed to resolve inputs")
}

async fn collect_inputs(
    scope: &ResolveScope<'_>,
    engine: &ExpressionEngine,
) -> DriverResult<ExecutorInputs> {
    let options = scope.options;
    let task = options
        .task
        .as_ref()
        .ok_or_else(|| DriverError::validation("task spec is required"))?;
    let component = options
        .component
        .as_ref()
        .ok_or_else(|| DriverError::validation("component spec is required"))?;

    let dag_artifacts = scope
        .store
        .get_input_artifacts_by_execution_id(scope.dag.id())
        .await?;
    info!(
        dag = scope.dag.id(),
        parameters = scope.dag.input_parameters().len(),
        artifacts = dag_artifacts.len(),
        "resolving inputs against parent DAG"
    );

    let mut inputs = match options.iteration() {
        Some(index) => iteration_inputs(scope, task, index, dag_artifacts)?,
        None => task_inputs(scope, task, component, &dag_artifacts).await?,
    };

    apply_selectors(task, engine, &mut inputs)?;
    validate_parameter_types(task, component, options.iteration().is_some(), &mut inputs)?;
    Ok(inputs)
}

fn iteration_inputs(
    scope: &ResolveScope<'_>,
    task: &TaskSpec,
    index: usize,
    dag_artifacts: BTreeMap<String, ArtifactList>,
) -> DriverResult<ExecutorInputs> {
    let mut inputs = ExecutorInputs {
        parameter_values: scope.dag.input_parameters().clone(),
        artifacts: dag_artifacts,
    };

    if task.artifact_iterator.is_some() {
        return Err(DriverError::not_implemented(
            "artifact iterator not implemented yet",
        ));
    }
    let Some(iterator) = &task.parameter_iterator else {
        return Err(DriverError::resolution(
            "bug: iteration_index>=0, but task iterator is empty",
        ));
    };

    let items_input = match iterator.items.input_parameter.as_deref() {
        Some(name) if !name.is_empty() => name.to_string(),
        _ if !iterator.item_input.is_empty() => iterator.item_input.clone(),
        _ => {
            return Err(DriverError::resolution(
                "cannot retrieve parameter iterator",
            ))
        }
    };

    let items = get_items(
        inputs
            .parameter_values
            .get(&items_input)
            .unwrap_or(&Value::Null),
    )?;
    let Some(item) = items.get(index).cloned() else {
        return Err(DriverError::resolution(format!(
            "bug: {} items found, but getting index {}",
            items.len(),
            index
        )));
    };
    debug!(index, total = items.len(), "selected iteration item");

    inputs.parameter_values.remove(&items_input);
    inputs
        .parameter_values
        .insert(iterator.item_input.clone(), item);
    Ok(inputs)
}

async fn task_inputs(
    scope: &ResolveScope<'_>,
    task: &TaskSpec,
    component: &ComponentSpec,
    dag_artifacts: &BTreeMap<String, ArtifactList>,
) -> DriverResult<ExecutorInputs> {
    let mut inputs = ExecutorInputs::default();

    for (name, spec) in &task.inputs.parameters {
        match resolve_input_parameter(scope, spec).await {
            Ok(value) => {
                inputs.parameter_values.insert(name.clone(), value);
            }
            Err(e) if e.is_resolved_null() => {
                let optional = component
                    .input_definitions
                    .parameters
                    .get(name)
                    .map(|d| d.is_optional)
                    .unwrap_or(false);
                if !optional {
                    return Err(e);
                }
                // Left unset so the launcher applies the component default
                debug!(parameter = %name, "optional input resolved to null, skipping");
            }
            Err(e) => return Err(e),
        }
    }

    for (name, spec) in &task.inputs.artifacts {
        let list = resolve_input_artifact(scope, name, spec, dag_artifacts).await?;
        inputs.artifacts.insert(name.clone(), list);
    }

    Ok(inputs)
}

fn apply_selectors(
    task: &TaskSpec,
    engine: &ExpressionEngine,
    inputs: &mut ExecutorInputs,
) -> DriverResult<()> {
    for (name, spec) in &task.inputs.parameters {
        let selector = spec.parameter_expression_selector.as_str();
        if selector.is_empty() {
            continue;
        }
        let context = format!(
            "resolving parameter {:?}: evaluation of parameter expression selector {:?} failed",
            name, selector
        );
        let Some(value) = inputs.parameter_values.get(name) else {
            return Err(DriverError::resolution("value not found in inputs").wrap(context));
        };
        let selected = engine.select(value, selector).context(context)?;
        inputs.parameter_values.insert(name.clone(), selected);
    }
    Ok(())
}

fn validate_parameter_types(
    task: &TaskSpec,
    component: &ComponentSpec,
    is_iteration: bool,
    inputs: &mut ExecutorInputs,
) -> DriverResult<()> {
    for (name, definition) in &component.input_definitions.parameters {
        if let Some(iterator) = &task.parameter_iterator {
            // Only iterations receive the item; only the iterator receives the items list
            if !is_iteration && iterator.item_input == *name {
                continue;
            }
            if is_iteration && iterator.items.input_parameter.as_deref() == Some(name.as_str()) {
                continue;
            }
        }

        let Some(value) = inputs.parameter_values.get(name) else {
            if !definition.is_optional && definition.default_value.is_none() {
                return Err(DriverError::resolution(format!(
                    "neither value nor default value provided for non-optional parameter {:?}",
                    name
                )));
            }
            continue;
        };

        let expected = definition.parameter_type;
        if expected == ParameterType::String {
            if !value.is_string() {
                let text = parameter_text(value);
                inputs
                    .parameter_values
                    .insert(name.clone(), Value::String(text));
            }
            continue;
        }

        let matches = match value {
            Value::Null => {
                return Err(DriverError::resolution(format!(
                    "got null for input parameter {:?}",
                    name
                )))
            }
            Value::String(_) => false,
            Value::Number(_) => matches!(
                expected,
                ParameterType::NumberDouble | ParameterType::NumberInteger
            ),
            Value::Bool(_) => expected == ParameterType::Boolean,
            Value::Array(_) => expected == ParameterType::List,
            Value::Object(_) => expected == ParameterType::Struct,
        };
        if !matches {
            return Err(DriverError::resolution(format!(
                "input parameter {:?} type mismatch: expect {}, got {}",
                name,
                expected,
                kind_name(value)
            )));
        }
    }
    Ok(())
}

/// Resolve one input parameter declaration.
///
/// A component input that is null yields the resolved-null sentinel so callers
/// can decide whether an absent optional value is acceptable.
pub async fn resolve_input_parameter(
    scope: &ResolveScope<'_>,
    spec: &InputParameterSpec,
) -> DriverResult<Value> {
    let context = || format!("resolving input parameter with spec {}", spec);

    match &spec.kind {
        Some(ParameterSource::ComponentInputParameter(name)) => {
            if name.is_empty() {
                return Err(DriverError::resolution("empty component input").wrap(context()));
            }
            match scope.dag.input_parameters().get(name) {
                None => Err(DriverError::resolution(format!(
                    "parent DAG does not have input parameter {}",
                    name
                ))
                .wrap(context())),
                Some(Value::Null) => Err(DriverError::ResolvedParameterNull(name.clone())),
                Some(value) => Ok(value.clone()),
            }
        }
        Some(ParameterSource::TaskOutputParameter(output)) => {
            resolve_upstream_parameter(scope, output)
                .await
                .with_context(context)
        }
        Some(ParameterSource::RuntimeValue(runtime)) => match &runtime.constant {
            Some(constant) => Ok(resolve_runtime_constant(constant, scope.options)),
            None => Err(DriverError::not_implemented(format!(
                "param runtime value spec of type {} not implemented",
                spec
            ))
            .wrap(context())),
        },
        Some(ParameterSource::TaskFinalStatus(_)) | None => Err(DriverError::not_implemented(
            format!("parameter spec of type {} not implemented yet", spec),
        )
        .wrap(context())),
    }
}

/// Resolve a parameter that must be a non-empty string
pub async fn resolve_input_parameter_str(
    scope: &ResolveScope<'_>,
    spec: &InputParameterSpec,
) -> DriverResult<String> {
    match resolve_input_parameter(scope, spec).await? {
        Value::String(text) if !text.is_empty() => Ok(text),
        Value::String(_) => Err(DriverError::resolution(format!(
            "resolving input parameter with spec {}. Expected a non-empty string.",
            spec
        ))),
        other => Err(DriverError::resolution(format!(
            "resolving input parameter with spec {}. Expected a string but got: {}",
            spec,
            kind_name(&other)
        ))),
    }
}

/// Resolve a parameter holding a JSON object and decode it as `T`
pub async fn resolve_json_parameter<T: DeserializeOwned>(
    scope: &ResolveScope<'_>,
    spec: &InputParameterSpec,
) -> DriverResult<T> {
    let value = resolve_input_parameter(scope, spec)
        .await
        .context("failed to resolve k8s parameter")?;
    serde_json::from_value(value).context(
        "failed to unmarshal k8s Resource json ensure that k8s Resource json correctly adheres to its respective k8s spec",
    )
}

/// Resolve one input artifact declaration
pub async fn resolve_input_artifact(
    scope: &ResolveScope<'_>,
    name: &str,
    spec: &InputArtifactSpec,
    dag_artifacts: &BTreeMap<String, ArtifactList>,
) -> DriverResult<ArtifactList> {
    let context = || {
        format!(
            "failed to resolve input artifact {} with spec {}",
            name, spec
        )
    };

    match &spec.kind {
        Some(ArtifactSource::ComponentInputArtifact(key)) => {
            if key.is_empty() {
                return Err(
                    DriverError::resolution("component input artifact key is empty")
                        .wrap(context()),
                );
            }
            dag_artifacts.get(key).cloned().ok_or_else(|| {
                DriverError::resolution(format!(
                    "parent DAG does not have input artifact {}",
                    key
                ))
                .wrap(context())
            })
        }
        Some(ArtifactSource::TaskOutputArtifact(output)) => {
            resolve_upstream_artifact(scope, output)
                .await
                .with_context(context)
        }
        None => Err(DriverError::not_implemented(format!(
            "artifact spec of type {} not implemented yet",
            spec
        ))
        .wrap(context())),
    }
}
