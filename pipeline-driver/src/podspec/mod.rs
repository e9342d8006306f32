// Pod Spec Module
// Pod spec patch built for container tasks: launcher wrapping, resources and model cars

pub mod extension;
pub mod modelcar;
pub mod patch;
pub mod quantity;
pub mod types;

pub use extension::{NodeSelectorExtension, NoopExtension, PodSpecExtension};
pub use modelcar::{add_modelcars_to_pod_spec, local_path_for_uri};
pub use patch::{init_pod_spec_patch, PodSpecPatchRequest};
pub use types::{
    Container, EmptyDirVolumeSource, EnvVar, PodSpec, ResourceRequirements, Volume, VolumeMount,
};
