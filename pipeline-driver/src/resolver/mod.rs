// Resolver Module
// Turns a task's input declarations into concrete executor inputs

pub mod inputs;
pub mod runtime;
pub mod upstream;

pub use inputs::{
    resolve_input_artifact, resolve_input_parameter, resolve_input_parameter_str,
    resolve_inputs, resolve_json_parameter,
};
pub use runtime::{resolve_pod_spec_runtime_parameter, resolve_runtime_constant};
pub use upstream::{
    flatten_dag_tasks, resolve_upstream_artifact, resolve_upstream_parameter, MAX_DAG_DEPTH,
};

use crate::metadata::{Dag, MetadataStore, Pipeline};
use crate::options::Options;

/// Everything input resolution reads from: the store, the enclosing DAG and the invocation
#[derive(Clone, Copy)]
pub struct ResolveScope<'a> {
    pub store: &'a dyn MetadataStore,
    pub dag: &'a Dag,
    pub pipeline: &'a Pipeline,
    pub options: &'a Options,
}

impl<'a> ResolveScope<'a> {
    pub fn new(
        store: &'a dyn MetadataStore,
        dag: &'a Dag,
        pipeline: &'a Pipeline,
        options: &'a Options,
    ) -> Self {
        Self {
            store,
            dag,
            pipeline,
            options,
        }
    }
}
