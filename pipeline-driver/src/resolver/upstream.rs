// Upstream Resolution
// Follows producer pointers through nested DAGs down to the leaf task that made an output

use crate::error::{DriverError, DriverResult};
use crate::metadata::producer::{ARTIFACT_PRODUCER_PROPERTY, PARAMETER_PRODUCER_PROPERTY};
use crate::metadata::{Dag, ExecutionRecord, MetadataStore, OutputProducer, Pipeline};
use crate::resolver::ResolveScope;
use crate::spec::{ArtifactList, TaskOutputArtifactSpec, TaskOutputParameterSpec};

use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, info};

/// Deepest DAG nesting (and longest producer chain) followed before giving up
pub const MAX_DAG_DEPTH: usize = 64;

/// Every task reachable from `dag`, keyed by task name. Nested DAGs are descended
/// into; fan-out iterators are not, their iterations are not addressable by name.
pub async fn flatten_dag_tasks(
    store: &dyn MetadataStore,
    dag: &Dag,
    pipeline: &Pipeline,
) -> DriverResult<BTreeMap<String, ExecutionRecord>> {
    let mut flattened = BTreeMap::new();
    let mut visited = HashSet::new();
    let mut pending = vec![(dag.clone(), 0usize)];

    while let Some((current, depth)) = pending.pop() {
        if depth > MAX_DAG_DEPTH {
            return Err(DriverError::resolution(format!(
                "DAG nesting under execution {} exceeds depth {}",
                dag.id(),
                MAX_DAG_DEPTH
            )));
        }
        if !visited.insert(current.id()) {
            return Err(DriverError::resolution(format!(
                "DAG execution {} visited twice while collecting tasks",
                current.id()
            )));
        }

        let tasks = store.get_executions_in_dag(&current, pipeline, true).await?;
        for task in tasks.values() {
            if !task.is_dag() {
                continue;
            }
            if task.is_iterator() {
                info!(task = %task.task_name, "found a ParallelFor task, skipping it");
                continue;
            }
            debug!(task = %task.task_name, "adding tasks of nested DAG");
            let sub_dag = store.get_dag(task.id).await?;
            pending.push((sub_dag, depth + 1));
        }
        flattened.extend(tasks);
    }

    Ok(flattened)
}

/// Pick the sub-task and key a DAG output points at
fn select_producer(
    producer: &OutputProducer,
    tasks: &BTreeMap<String, ExecutionRecord>,
) -> DriverResult<(String, String)> {
    match producer {
        OutputProducer::Direct { subtask, key } => Ok((subtask.clone(), key.clone())),
        OutputProducer::OneOf { selectors } => selectors
            .iter()
            .find(|s| {
                tasks
                    .get(&s.subtask)
                    .map(|t| t.state.is_successful())
                    .unwrap_or(false)
            })
            .map(|s| (s.subtask.clone(), s.key.clone()))
            .ok_or_else(|| DriverError::resolution("processing OneOf: No successful task found")),
    }
}

/// Walk from `producer` through DAG producer maps until a leaf task is reached
fn descend_to_leaf<'t>(
    tasks: &'t BTreeMap<String, ExecutionRecord>,
    producer: &'t ExecutionRecord,
    key: &str,
    producers_of: impl Fn(&ExecutionRecord) -> Option<&BTreeMap<String, OutputProducer>>,
    property: &str,
) -> DriverResult<(&'t ExecutionRecord, String)> {
    let mut current = producer;
    let mut key = key.to_string();

    for _ in 0..=MAX_DAG_DEPTH {
        if !current.is_dag() {
            return Ok((current, key));
        }
        let producers = producers_of(current).ok_or_else(|| {
            DriverError::resolution(format!(
                "task, {}, does not have a {} custom property",
                current.task_name, property
            ))
        })?;
        let (subtask, sub_key) = match producers.get(&key) {
            Some(producer) => select_producer(producer, tasks)?,
            None => (String::new(), String::new()),
        };
        if subtask.is_empty() {
            return Err(DriverError::resolution("producer_subtask not in outputParams"));
        }
        debug!(
            task = %current.task_name,
            subtask = %subtask,
            key = %sub_key,
            "following DAG output to its producer"
        );
        current = tasks.get(&subtask).ok_or_else(|| {
            DriverError::resolution(format!("subTaskName, {}, not in tasks", subtask))
        })?;
        key = sub_key;
    }

    Err(DriverError::resolution(format!(
        "producer chain of task {} exceeds depth {}",
        producer.task_name, MAX_DAG_DEPTH
    )))
}

/// Value of an upstream task's output parameter
pub async fn resolve_upstream_parameter(
    scope: &ResolveScope<'_>,
    spec: &TaskOutputParameterSpec,
) -> DriverResult<Value> {
    if spec.producer_task.is_empty() {
        return Err(DriverError::resolution("producerTaskName is empty"));
    }
    if spec.output_parameter_key.is_empty() {
        return Err(DriverError::resolution("output parameter key is empty"));
    }

    let tasks = flatten_dag_tasks(scope.store, scope.dag, scope.pipeline).await?;
    let producer = tasks.get(&spec.producer_task).ok_or_else(|| {
        DriverError::resolution(format!("producer task, {}, not in tasks", spec.producer_task))
    })?;

    let (leaf, key) = descend_to_leaf(
        &tasks,
        producer,
        &spec.output_parameter_key,
        |t| t.parameter_producers.as_ref(),
        PARAMETER_PRODUCER_PROPERTY,
    )?;

    leaf.output_parameters.get(&key).cloned().ok_or_else(|| {
        DriverError::resolution(format!(
            "cannot find output parameter key {:?} in producer task {:?}",
            key, leaf.task_name
        ))
    })
}

/// An upstream task's output artifact, as a one-element list
pub async fn resolve_upstream_artifact(
    scope: &ResolveScope<'_>,
    spec: &TaskOutputArtifactSpec,
) -> DriverResult<ArtifactList> {
    if spec.producer_task.is_empty() {
        return Err(DriverError::resolution("producer task is empty"));
    }
    if spec.output_artifact_key.is_empty() {
        return Err(DriverError::resolution("output artifact key is empty"));
    }

    let tasks = flatten_dag_tasks(scope.store, scope.dag, scope.pipeline).await?;
    let producer = tasks.get(&spec.producer_task).ok_or_else(|| {
        DriverError::resolution(format!("cannot find producer task {:?}", spec.producer_task))
    })?;

    let (leaf, key) = descend_to_leaf(
        &tasks,
        producer,
        &spec.output_artifact_key,
        |t| t.artifact_producers.as_ref(),
        ARTIFACT_PRODUCER_PROPERTY,
    )?;

    let outputs = scope.store.get_output_artifacts_by_execution_id(leaf.id).await?;
    let artifact = outputs.get(&key).ok_or_else(|| {
        DriverError::resolution(format!(
            "cannot find output artifact key {:?} in producer task {:?}",
            spec.output_artifact_key, spec.producer_task
        ))
    })?;
    Ok(ArtifactList::single(artifact.to_runtime_artifact()))
}
