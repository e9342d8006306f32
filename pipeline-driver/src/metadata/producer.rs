// Output Producers
// Which sub-task produces each declared output of a DAG execution

use crate::spec::{DagOutputArtifactSpec, DagOutputParameterSpec, DagOutputsSpec};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Custom property holding the parameter producer map of a DAG execution
pub const PARAMETER_PRODUCER_PROPERTY: &str = "parameter_producer_task";

/// Custom property holding the artifact producer map of a DAG execution
pub const ARTIFACT_PRODUCER_PROPERTY: &str = "artifact_producer_task";

/// One candidate `(sub-task, key)` pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProducerSelector {
    pub subtask: String,
    pub key: String,
}

impl ProducerSelector {
    pub fn new(subtask: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            subtask: subtask.into(),
            key: key.into(),
        }
    }
}

/// Where a DAG output really comes from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OutputProducer {
    /// A single sub-task output
    Direct { subtask: String, key: String },
    /// The first candidate whose sub-task succeeded, in declared order
    OneOf { selectors: Vec<ProducerSelector> },
}

impl OutputProducer {
    pub fn direct(subtask: impl Into<String>, key: impl Into<String>) -> Self {
        OutputProducer::Direct {
            subtask: subtask.into(),
            key: key.into(),
        }
    }

    pub fn from_parameter_spec(spec: &DagOutputParameterSpec) -> Self {
        match spec {
            DagOutputParameterSpec::ValueFromParameter(selector) => OutputProducer::Direct {
                subtask: selector.producer_subtask.clone(),
                key: selector.output_parameter_key.clone(),
            },
            DagOutputParameterSpec::ValueFromOneof(list) => OutputProducer::OneOf {
                selectors: list
                    .parameter_selectors
                    .iter()
                    .map(|s| ProducerSelector::new(&s.producer_subtask, &s.output_parameter_key))
                    .collect(),
            },
        }
    }

    /// A single artifact selector is a direct pointer; several form a oneOf
    pub fn from_artifact_spec(spec: &DagOutputArtifactSpec) -> Self {
        match spec.artifact_selectors.as_slice() {
            [only] => OutputProducer::Direct {
                subtask: only.producer_subtask.clone(),
                key: only.output_artifact_key.clone(),
            },
            selectors => OutputProducer::OneOf {
                selectors: selectors
                    .iter()
                    .map(|s| ProducerSelector::new(&s.producer_subtask, &s.output_artifact_key))
                    .collect(),
            },
        }
    }
}

pub fn parameter_producers(outputs: &DagOutputsSpec) -> BTreeMap<String, OutputProducer> {
    outputs
        .parameters
        .iter()
        .map(|(name, spec)| (name.clone(), OutputProducer::from_parameter_spec(spec)))
        .collect()
}

pub fn artifact_producers(outputs: &DagOutputsSpec) -> BTreeMap<String, OutputProducer> {
    outputs
        .artifacts
        .iter()
        .map(|(name, spec)| (name.clone(), OutputProducer::from_artifact_spec(spec)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn outputs() -> DagOutputsSpec {
        serde_json::from_value(json!({
            "parameters": {
                "direct": {"valueFromParameter": {"producerSubtask": "a", "outputParameterKey": "Output"}},
                "either": {"valueFromOneof": {"parameterSelectors": [
                    {"producerSubtask": "b", "outputParameterKey": "x"},
                    {"producerSubtask": "c", "outputParameterKey": "y"}
                ]}}
            },
            "artifacts": {
                "model": {"artifactSelectors": [{"producerSubtask": "a", "outputArtifactKey": "model"}]},
                "picked": {"artifactSelectors": [
                    {"producerSubtask": "b", "outputArtifactKey": "m1"},
                    {"producerSubtask": "c", "outputArtifactKey": "m2"}
                ]}
            }
        }))
        .unwrap()
    }

    #[test]
    fn test_parameter_producers_from_spec() {
        let producers = parameter_producers(&outputs());
        assert_eq!(producers["direct"], OutputProducer::direct("a", "Output"));
        assert_eq!(
            producers["either"],
            OutputProducer::OneOf {
                selectors: vec![ProducerSelector::new("b", "x"), ProducerSelector::new("c", "y")]
            }
        );
    }

    #[test]
    fn test_artifact_selector_count_decides_kind() {
        let producers = artifact_producers(&outputs());
        assert_eq!(producers["model"], OutputProducer::direct("a", "model"));
        assert!(matches!(producers["picked"], OutputProducer::OneOf { .. }));
    }
}
