// Pod Spec Patch
// Builds the main container patch that wraps the user command in the launcher

use crate::error::{DriverResult, ResultExt};
use crate::options::ProxyConfig;
use crate::podspec::modelcar::add_modelcars_to_pod_spec;
use crate::podspec::quantity::{parse_quantity, pod_resource};
use crate::podspec::types::{Container, EnvVar, PodSpec, ResourceRequirements, MAIN_CONTAINER_NAME};
use crate::resolver::resolve_pod_spec_runtime_parameter;
use crate::spec::{ComponentSpec, ContainerSpec, ExecutorInput, ResourceSpec};

pub const ENV_POD_NAME: &str = "KFP_POD_NAME";
pub const ENV_POD_UID: &str = "KFP_POD_UID";
pub const ENV_METADATA_HOST: &str = "METADATA_GRPC_SERVICE_HOST";
pub const ENV_METADATA_PORT: &str = "METADATA_GRPC_SERVICE_PORT";

const RESOURCE_CPU: &str = "cpu";
const RESOURCE_MEMORY: &str = "memory";

/// Inputs of one pod spec patch
#[derive(Debug, Clone, Copy)]
pub struct PodSpecPatchRequest<'a> {
    pub container: &'a ContainerSpec,
    pub component: &'a ComponentSpec,
    pub executor_input: &'a ExecutorInput,
    pub execution_id: i64,
    pub parent_execution_id: i64,
    pub pipeline_name: &'a str,
    pub run_id: &'a str,
    pub pipeline_log_level: &'a str,
    pub publish_logs: &'a str,
    pub launcher_path: &'a str,
    pub proxy: &'a ProxyConfig,
}

/// Build the patch merged over the compiled pod template
pub fn init_pod_spec_patch(request: &PodSpecPatchRequest<'_>) -> DriverResult<PodSpec> {
    build_patch(request).context("failed to init podSpecPatch")
}

fn build_patch(request: &PodSpecPatchRequest<'_>) -> DriverResult<PodSpec> {
    let executor_input_json = serde_json::to_string(request.executor_input)?;
    let component_json = serde_json::to_string(request.component)?;

    let mut env: Vec<EnvVar> = request
        .container
        .env
        .iter()
        .map(|e| EnvVar::new(&e.name, &e.value))
        .collect();
    env.extend(
        request
            .proxy
            .env_vars()
            .into_iter()
            .map(|(name, value)| EnvVar::new(name, value)),
    );

    let args: Vec<String> = request
        .container
        .command
        .iter()
        .chain(request.container.args.iter())
        .cloned()
        .collect();

    let resources = match &request.container.resources {
        Some(spec) => resource_requirements(spec, request.executor_input)?,
        None => ResourceRequirements::default(),
    };

    let image = resolve_pod_spec_runtime_parameter(&request.container.image, request.executor_input)?;

    let mut pod_spec = PodSpec {
        containers: vec![Container {
            name: MAIN_CONTAINER_NAME.to_string(),
            command: launcher_command(request, executor_input_json, component_json),
            args,
            image,
            resources,
            env: env.clone(),
            ..Default::default()
        }],
        ..Default::default()
    };

    add_modelcars_to_pod_spec(&request.executor_input.inputs.artifacts, &env, &mut pod_spec);
    Ok(pod_spec)
}

fn launcher_command(
    request: &PodSpecPatchRequest<'_>,
    executor_input_json: String,
    component_json: String,
) -> Vec<String> {
    let mut command = vec![
        request.launcher_path.to_string(),
        "--pipeline_name".to_string(),
        request.pipeline_name.to_string(),
        "--parent_dag_id".to_string(),
        request.parent_execution_id.to_string(),
        "--run_id".to_string(),
        request.run_id.to_string(),
        "--execution_id".to_string(),
        request.execution_id.to_string(),
        "--executor_input".to_string(),
        executor_input_json,
        "--component_spec".to_string(),
        component_json,
        "--pod_name".to_string(),
        format!("$({})", ENV_POD_NAME),
        "--pod_uid".to_string(),
        format!("$({})", ENV_POD_UID),
        "--mlmd_server_address".to_string(),
        format!("$({})", ENV_METADATA_HOST),
        "--mlmd_server_port".to_string(),
        format!("$({})", ENV_METADATA_PORT),
        "--publish_logs".to_string(),
        request.publish_logs.to_string(),
    ];
    if request.pipeline_log_level != "1" {
        command.push("--log_level".to_string());
        command.push(request.pipeline_log_level.to_string());
    }
    command.push("--".to_string());
    command
}

fn resource_requirements(
    spec: &ResourceSpec,
    executor_input: &ExecutorInput,
) -> DriverResult<ResourceRequirements> {
    let mut resources = ResourceRequirements::default();

    let fields = [
        (&spec.resource_memory_limit, spec.memory_limit, "G", RESOURCE_MEMORY, true),
        (&spec.resource_memory_request, spec.memory_request, "G", RESOURCE_MEMORY, false),
        (&spec.resource_cpu_limit, spec.cpu_limit, "", RESOURCE_CPU, true),
        (&spec.resource_cpu_request, spec.cpu_request, "", RESOURCE_CPU, false),
    ];
    for (field, legacy, suffix, name, is_limit) in fields {
        let Some(quantity) = pod_resource(field, legacy, executor_input, suffix)? else {
            continue;
        };
        let target = if is_limit {
            &mut resources.limits
        } else {
            &mut resources.requests
        };
        target.insert(name.to_string(), quantity);
    }

    if let Some(accelerator) = &spec.accelerator {
        let accelerator_type = if !accelerator.resource_type.is_empty() {
            resolve_pod_spec_runtime_parameter(&accelerator.resource_type, executor_input)?
        } else {
            accelerator.accelerator_type.clone()
        };
        let count = if !accelerator.resource_count.is_empty() {
            resolve_pod_spec_runtime_parameter(&accelerator.resource_count, executor_input)?
        } else if accelerator.count > 0 {
            accelerator.count.to_string()
        } else {
            String::new()
        };
        if !accelerator_type.is_empty() && !count.is_empty() {
            resources
                .limits
                .insert(accelerator_type, parse_quantity(&count)?);
        }
    }

    Ok(resources)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::{
        AcceleratorConfig, ArtifactList, ArtifactTypeSchema, EnvVar as SpecEnvVar,
        ExecutorInputs, RuntimeArtifact,
    };
    use serde_json::json;

    struct Fixture {
        container: ContainerSpec,
        component: ComponentSpec,
        executor_input: ExecutorInput,
        proxy: ProxyConfig,
    }

    impl Fixture {
        fn new() -> Self {
            let mut inputs = ExecutorInputs::default();
            inputs
                .parameter_values
                .insert("pipelinechannel--memory".to_string(), json!("8Gi"));
            inputs
                .parameter_values
                .insert("pipelinechannel--gpu".to_string(), json!("nvidia.com/gpu"));
            Self {
                container: ContainerSpec {
                    image: "python:3.11".to_string(),
                    command: vec!["python".to_string(), "-m".to_string()],
                    args: vec!["train".to_string()],
                    env: vec![SpecEnvVar {
                        name: "MODE".to_string(),
                        value: "fast".to_string(),
                    }],
                    resources: None,
                },
                component: ComponentSpec::default(),
                executor_input: ExecutorInput::new(inputs),
                proxy: ProxyConfig::default(),
            }
        }

        fn request(&self) -> PodSpecPatchRequest<'_> {
            PodSpecPatchRequest {
                container: &self.container,
                component: &self.component,
                executor_input: &self.executor_input,
                execution_id: 42,
                parent_execution_id: 7,
                pipeline_name: "training",
                run_id: "run-1",
                pipeline_log_level: "1",
                publish_logs: "false",
                launcher_path: "/kfp-launcher/launch",
                proxy: &self.proxy,
            }
        }
    }

    #[test]
    fn test_launcher_command_wraps_user_command() {
        let fixture = Fixture::new();
        let pod = init_pod_spec_patch(&fixture.request()).unwrap();
        let main = pod.main_container().unwrap();

        assert_eq!(main.name, "main");
        assert_eq!(main.image, "python:3.11");
        assert_eq!(main.args, vec!["python", "-m", "train"]);
        assert_eq!(main.command[0], "/kfp-launcher/launch");
        assert_eq!(main.command[1..3].to_vec(), vec!["--pipeline_name", "training"]);
        assert_eq!(main.command[3..5].to_vec(), vec!["--parent_dag_id", "7"]);
        assert_eq!(main.command[7..9].to_vec(), vec!["--execution_id", "42"]);
        assert_eq!(main.command.last().map(String::as_str), Some("--"));
        assert!(!main.command.contains(&"--log_level".to_string()));
        assert_eq!(
            main.command
                .iter()
                .filter(|a| a.as_str() == "--publish_logs")
                .count(),
            1
        );
        assert!(main.command.contains(&"$(KFP_POD_NAME)".to_string()));
        assert_eq!(main.env, vec![EnvVar::new("MODE", "fast")]);
    }

    #[test]
    fn test_log_level_and_proxy_env() {
        let mut fixture = Fixture::new();
        fixture.proxy.https_proxy = "http://proxy:3128".to_string();
        let mut request = fixture.request();
        request.pipeline_log_level = "3";

        let pod = init_pod_spec_patch(&request).unwrap();
        let main = pod.main_container().unwrap();
        let position = main
            .command
            .iter()
            .position(|a| a == "--log_level")
            .unwrap();
        assert_eq!(main.command[position + 1], "3");
        assert_eq!(
            main.env,
            vec![
                EnvVar::new("MODE", "fast"),
                EnvVar::new("HTTPS_PROXY", "http://proxy:3128"),
                EnvVar::new("https_proxy", "http://proxy:3128"),
            ]
        );
    }

    #[test]
    fn test_resources_and_accelerator() {
        let mut fixture = Fixture::new();
        fixture.container.resources = Some(ResourceSpec {
            cpu_limit: 2.0,
            cpu_request: 0.5,
            memory_limit: 16.0,
            resource_memory_request: "{{$.inputs.parameters['pipelinechannel--memory']}}"
                .to_string(),
            accelerator: Some(AcceleratorConfig {
                resource_type: "{{$.inputs.parameters['pipelinechannel--gpu']}}".to_string(),
                count: 2,
                ..Default::default()
            }),
            ..Default::default()
        });

        let pod = init_pod_spec_patch(&fixture.request()).unwrap();
        let resources = &pod.main_container().unwrap().resources;
        assert_eq!(resources.limits["cpu"], "2");
        assert_eq!(resources.limits["memory"], "16G");
        assert_eq!(resources.limits["nvidia.com/gpu"], "2");
        assert_eq!(resources.requests["cpu"], "0.5");
        assert_eq!(resources.requests["memory"], "8Gi");
    }

    #[test]
    fn test_invalid_accelerator_count() {
        let mut fixture = Fixture::new();
        fixture.container.resources = Some(ResourceSpec {
            accelerator: Some(AcceleratorConfig {
                accelerator_type: "nvidia.com/gpu".to_string(),
                resource_count: "many".to_string(),
                ..Default::default()
            }),
            ..Default::default()
        });
        let err = init_pod_spec_patch(&fixture.request()).unwrap_err();
        assert!(err.to_string().starts_with("failed to init podSpecPatch: quantities must match"));
    }

    #[test]
    fn test_image_placeholder_and_modelcar() {
        let mut fixture = Fixture::new();
        fixture.container.image = "{{$.inputs.parameters['pipelinechannel--image']}}".to_string();
        let err = init_pod_spec_patch(&fixture.request()).unwrap_err();
        assert!(err.to_string().contains("did not contain container Image input parameter"));

        fixture
            .executor_input
            .inputs
            .parameter_values
            .insert("pipelinechannel--image".to_string(), json!("registry.io/serve:2"));
        fixture.executor_input.inputs.artifacts.insert(
            "model".to_string(),
            ArtifactList::single(RuntimeArtifact {
                uri: "oci://registry.io/llm:7b".to_string(),
                artifact_type: ArtifactTypeSchema::titled("system.Model"),
                ..Default::default()
            }),
        );
        let pod = init_pod_spec_patch(&fixture.request()).unwrap();
        assert_eq!(pod.main_container().unwrap().image, "registry.io/serve:2");
        assert_eq!(pod.containers.len(), 2);
        assert_eq!(pod.main_container().unwrap().volume_mounts.len(), 1);

        let value = serde_json::to_value(&pod).unwrap();
        assert_eq!(value["shareProcessNamespace"], json!(true));
        assert_eq!(value["initContainers"][0]["terminationMessagePolicy"], json!("FallbackToLogsOnError"));
        assert_eq!(value["volumes"][0]["emptyDir"], json!({}));
    }
}
