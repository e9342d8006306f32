// Model Cars
// Mounts OCI image artifacts into the pod through a sidecar sharing its filesystem

use crate::podspec::types::{
    Container, EnvVar, PodSpec, Volume, VolumeMount, PULL_IF_NOT_PRESENT,
    TERMINATION_FALLBACK_TO_LOGS_ON_ERROR,
};
use crate::spec::{ArtifactList, RuntimeArtifact};

use std::collections::BTreeMap;
use tracing::debug;

pub const OCI_SCHEME: &str = "oci://";
const OCI_MOUNT_ROOT: &str = "/oci/";
const MODELS_DIR: &str = "/models";

/// Where the launcher expects an OCI artifact's model directory
pub fn local_path_for_uri(uri: &str) -> Option<String> {
    let image = uri.strip_prefix(OCI_SCHEME)?;
    Some(format!(
        "{}{}{}",
        OCI_MOUNT_ROOT,
        image.replace('/', "_"),
        MODELS_DIR
    ))
}

fn prepull_command(image: &str) -> Vec<String> {
    vec![
        "sh".to_string(),
        "-c".to_string(),
        format!(
            "echo 'Pre-fetching modelcar {}: ' && [ -d /models ] && [ \"$$(ls -A /models)\" ] && echo 'OK ... Prefetched and valid (/models exists)' || (echo 'NOK ... Prefetched but modelcar is invalid (/models does not exist or is empty)' &&  exit 1)",
            image
        ),
    ]
}

// `$$$$` reaches the shell as `$$`, the sidecar's own pid
fn sidecar_command(local_path: &str, mount_path: &str) -> Vec<String> {
    vec![
        "sh".to_string(),
        "-c".to_string(),
        format!(
            "ln -s /proc/$$$$/root/models \"{}\" && echo \"Running Modelcar container...\" && until [ -f \"{}/launcher-complete\" ]; do sleep 1; done",
            local_path, mount_path
        ),
    ]
}

/// Add a pre-pull init container, a shared volume and an idling sidecar for every
/// input artifact whose first entry is an OCI image. Artifacts are numbered in
/// name order so container and volume names are stable.
pub fn add_modelcars_to_pod_spec(
    artifacts: &BTreeMap<String, ArtifactList>,
    env: &[EnvVar],
    pod_spec: &mut PodSpec,
) {
    let modelcars: Vec<&RuntimeArtifact> = artifacts
        .values()
        .filter_map(ArtifactList::first)
        .filter(|a| a.uri.starts_with(OCI_SCHEME))
        .collect();

    for (index, artifact) in modelcars.into_iter().enumerate() {
        let Some(local_path) = local_path_for_uri(&artifact.uri) else {
            continue;
        };
        let image = artifact
            .uri
            .strip_prefix(OCI_SCHEME)
            .unwrap_or(&artifact.uri)
            .to_string();
        debug!(image = %image, index, "adding modelcar");

        pod_spec.share_process_namespace = Some(true);

        pod_spec.init_containers.push(Container {
            name: format!("oci-prepull-{}", index),
            image: image.clone(),
            command: prepull_command(&image),
            env: env.to_vec(),
            termination_message_policy: TERMINATION_FALLBACK_TO_LOGS_ON_ERROR.to_string(),
            ..Default::default()
        });

        let volume_name = format!("oci-{}", index);
        pod_spec.volumes.push(Volume::empty_dir(&volume_name));

        let mount_path = local_path
            .strip_suffix(MODELS_DIR)
            .unwrap_or(&local_path)
            .to_string();
        let mount = VolumeMount {
            name: volume_name.clone(),
            sub_path: mount_path
                .strip_prefix(OCI_MOUNT_ROOT)
                .unwrap_or(&mount_path)
                .to_string(),
            mount_path: mount_path.clone(),
        };

        if let Some(main) = pod_spec.main_container_mut() {
            main.volume_mounts.push(mount.clone());
        }

        pod_spec.containers.push(Container {
            name: volume_name,
            image,
            image_pull_policy: PULL_IF_NOT_PRESENT.to_string(),
            env: env.to_vec(),
            volume_mounts: vec![mount],
            command: sidecar_command(&local_path, &mount_path),
            termination_message_policy: TERMINATION_FALLBACK_TO_LOGS_ON_ERROR.to_string(),
            ..Default::default()
        });
    }
}
