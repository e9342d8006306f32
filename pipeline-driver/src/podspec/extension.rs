// Pod Spec Extensions
// Hook that merges Kubernetes executor config into a container's pod spec patch

use crate::error::{DriverResult, ResultExt};
use crate::podspec::types::PodSpec;
use crate::resolver::{resolve_json_parameter, ResolveScope};
use crate::spec::InputParameterSpec;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::debug;

/// Applies a task's Kubernetes executor config to its pod spec patch.
/// Only called when the task carries such a config.
#[async_trait]
pub trait PodSpecExtension: Send + Sync {
    async fn extend(
        &self,
        pod_spec: &mut PodSpec,
        scope: &ResolveScope<'_>,
        dag_inputs: &BTreeMap<String, Value>,
    ) -> DriverResult<()>;
}

/// Leaves the patch as built
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopExtension;

#[async_trait]
impl PodSpecExtension for NoopExtension {
    async fn extend(
        &self,
        _pod_spec: &mut PodSpec,
        _scope: &ResolveScope<'_>,
        _dag_inputs: &BTreeMap<String, Value>,
    ) -> DriverResult<()> {
        Ok(())
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct NodeSelectorConfig {
    labels: BTreeMap<String, String>,
    node_selector_json: Option<InputParameterSpec>,
}

/// Sets `nodeSelector` from the `nodeSelector` executor config entry, either static
/// labels or a JSON object resolved from an input parameter
#[derive(Debug, Clone, Copy, Default)]
pub struct NodeSelectorExtension;

#[async_trait]
impl PodSpecExtension for NodeSelectorExtension {
    async fn extend(
        &self,
        pod_spec: &mut PodSpec,
        scope: &ResolveScope<'_>,
        _dag_inputs: &BTreeMap<String, Value>,
    ) -> DriverResult<()> {
        let Some(entry) = scope
            .options
            .kubernetes_executor_config
            .as_ref()
            .and_then(|c| c.get("nodeSelector"))
        else {
            return Ok(());
        };
        let config: NodeSelectorConfig =
            serde_json::from_value(entry.clone()).context("failed to parse nodeSelector config")?;

        let labels = match &config.node_selector_json {
            Some(spec) => resolve_json_parameter::<BTreeMap<String, String>>(scope, spec).await?,
            None => config.labels,
        };
        debug!(count = labels.len(), "applying node selector");
        pod_spec.node_selector.extend(labels);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{
        ExecutionRecord, MemoryStore, MetadataStore, PipelineQuery, DAG_EXECUTION_TYPE,
    };
    use crate::options::Options;
    use serde_json::json;

    async fn run(config: Value, dag_inputs: Value) -> DriverResult<PodSpec> {
        let store = MemoryStore::new();
        let pipeline = store
            .get_pipeline(&PipelineQuery {
                pipeline_name: "p".to_string(),
                run_id: "run-1".to_string(),
                ..Default::default()
            })
            .await?;
        let record = store
            .insert_execution(ExecutionRecord {
                run_id: "run-1".to_string(),
                execution_type: DAG_EXECUTION_TYPE.to_string(),
                input_parameters: serde_json::from_value(dag_inputs)?,
                ..Default::default()
            })
            .await;
        let dag = store.get_dag(record.id).await?;
        let options = Options {
            kubernetes_executor_config: serde_json::from_value(config)?,
            ..Default::default()
        };
        let scope = ResolveScope::new(&store, &dag, &pipeline, &options);

        let mut pod = PodSpec::default();
        NodeSelectorExtension
            .extend(&mut pod, &scope, dag.input_parameters())
            .await?;
        Ok(pod)
    }

    #[tokio::test]
    async fn test_static_node_selector() {
        let pod = run(
            json!({"nodeSelector": {"labels": {"accelerator": "a100"}}}),
            json!({}),
        )
        .await
        .unwrap();
        assert_eq!(pod.node_selector["accelerator"], "a100");
    }

    #[tokio::test]
    async fn test_node_selector_from_parameter() {
        let pod = run(
            json!({"nodeSelector": {
                "labels": {"ignored": "yes"},
                "nodeSelectorJson": {"componentInputParameter": "pipelinechannel--selector"}
            }}),
            json!({"pipelinechannel--selector": {"pool": "gpu"}}),
        )
        .await
        .unwrap();
        assert_eq!(pod.node_selector.len(), 1);
        assert_eq!(pod.node_selector["pool"], "gpu");
    }

    #[tokio::test]
    async fn test_without_node_selector_entry() {
        let pod = run(json!({"tolerations": []}), json!({})).await.unwrap();
        assert!(pod.node_selector.is_empty());

        let mut pod = PodSpec::default();
        let store = MemoryStore::new();
        let dag = Default::default();
        let pipeline = Default::default();
        let options = Options::default();
        let scope = ResolveScope::new(&store, &dag, &pipeline, &options);
        NoopExtension
            .extend(&mut pod, &scope, &BTreeMap::new())
            .await
            .unwrap();
        assert_eq!(pod, PodSpec::default());
    }
}
