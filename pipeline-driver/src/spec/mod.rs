// Pipeline IR Module
// Typed views of the compiled pipeline and the executor input contract

pub mod executor;
pub mod pipeline;

pub use executor::{
    ArtifactList, ExecutorInput, ExecutorInputs, ExecutorOutputs, OutputParameter,
    RuntimeArtifact, OUTPUT_METADATA_FILEPATH,
};
pub use pipeline::{
    AcceleratorConfig, ArtifactIteratorSpec, ArtifactSelectorSpec, ArtifactSource,
    ArtifactTypeSchema, CachingOptions, ComponentInputsSpec, ComponentOutputsSpec, ComponentSpec,
    ContainerSpec, DagOutputArtifactSpec, DagOutputParameterSpec, DagOutputsSpec, DagSpec, EnvVar,
    InputArtifactDefinition, InputArtifactSpec, InputParameterDefinition, InputParameterSpec,
    OutputArtifactDefinition, OutputParameterDefinition, ParameterItemsSpec,
    ParameterIteratorSpec, ParameterSelectorList, ParameterSelectorSpec, ParameterSource,
    ParameterType, ResourceSpec, RuntimeConfig, RuntimeValueSpec, TaskFinalStatusSpec, TaskInfo,
    TaskInputsSpec, TaskOutputArtifactSpec, TaskOutputParameterSpec, TaskSpec, TriggerPolicy,
};

/// Kubernetes-specific executor config; opaque to the core
pub type KubernetesExecutorConfig = serde_json::Map<String, serde_json::Value>;
