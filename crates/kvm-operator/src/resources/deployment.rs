//! Virtual machine workloads: one single-replica deployment per node

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec, DeploymentStrategy};
use k8s_openapi::api::core::v1::{
    ConfigMapVolumeSource, Container, EmptyDirVolumeSource, EnvVar, HostPathVolumeSource,
    PersistentVolumeClaimVolumeSource, PodSpec, PodTemplateSpec, ResourceRequirements,
    SecurityContext, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use kube::api::ObjectMeta;
use kvm_operator_common::key::{self, annotations, NodeRole};
use kvm_operator_common::{KvmClusterSpec, Node, NodeCapabilities, StorageType, ValidationResult};

use super::configmap::USER_DATA_KEY;
use super::{same_name, DesiredState};
use crate::framework::ResourceKind;

const CLOUD_CONFIG_VOLUME: &str = "cloud-config";
const CLOUD_CONFIG_MOUNT: &str = "/cloudconfig/";
const IMAGES_VOLUME: &str = "images";
const IMAGES_HOST_PATH: &str = "/home/core/images/";
const DATA_VOLUME: &str = "data";

pub struct DeploymentGenerator;

impl DesiredState for DeploymentGenerator {
    type Object = Deployment;

    const KIND: ResourceKind = ResourceKind::Deployment;

    fn build(&self, spec: &KvmClusterSpec) -> ValidationResult<Vec<Deployment>> {
        let storage_type = spec.storage_type()?;
        let mut deployments = Vec::new();

        for role in NodeRole::ALL {
            for (index, (node, capabilities)) in
                spec.nodes_with_capabilities(role)?.into_iter().enumerate()
            {
                let data_volume = data_volume(spec, role, index, storage_type);
                deployments.push(vm_deployment(spec, role, node, capabilities, data_volume));
            }
        }

        Ok(deployments)
    }

    fn is_same(current: &Deployment, desired: &Deployment) -> bool {
        same_name(current, desired)
    }

    fn has_drifted(current: &Deployment, desired: &Deployment) -> bool {
        version_annotation(current) != version_annotation(desired)
    }
}

fn version_annotation(deployment: &Deployment) -> Option<&str> {
    deployment
        .metadata
        .annotations
        .as_ref()?
        .get(annotations::VERSION_BUNDLE_VERSION)
        .map(String::as_str)
}

/// Volume holding the machine's persistent data.
///
/// Workers on persistent-volume storage mount their claim; everything else
/// lives on the host.
fn data_volume(
    spec: &KvmClusterSpec,
    role: NodeRole,
    index: usize,
    storage_type: StorageType,
) -> Volume {
    let cluster_id = key::cluster_id(spec);
    match (role, storage_type) {
        (NodeRole::Worker, StorageType::PersistentVolume) => Volume {
            name: DATA_VOLUME.to_string(),
            persistent_volume_claim: Some(PersistentVolumeClaimVolumeSource {
                claim_name: key::worker_pvc_name(cluster_id, index),
                ..Default::default()
            }),
            ..Default::default()
        },
        (NodeRole::Worker, StorageType::HostPath) => host_path_volume(
            DATA_VOLUME,
            key::worker_host_path(cluster_id, index),
        ),
        (NodeRole::Master, _) => host_path_volume(
            DATA_VOLUME,
            key::master_host_path(cluster_id, index),
        ),
    }
}

fn host_path_volume(name: &str, path: String) -> Volume {
    Volume {
        name: name.to_string(),
        host_path: Some(HostPathVolumeSource {
            path,
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn env(name: &str, value: impl Into<String>) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value: Some(value.into()),
        ..Default::default()
    }
}

fn vm_deployment(
    spec: &KvmClusterSpec,
    role: NodeRole,
    node: &Node,
    capabilities: &NodeCapabilities,
    data_volume: Volume,
) -> Deployment {
    let labels = key::node_labels(spec, role, node);
    let privileged = Some(SecurityContext {
        privileged: Some(true),
        ..Default::default()
    });

    let endpoint_updater = Container {
        name: "k8s-endpoint-updater".to_string(),
        image: Some(spec.kvm.endpoint_updater_image.clone()),
        image_pull_policy: Some("IfNotPresent".to_string()),
        args: Some(vec![
            "update".to_string(),
            format!("--service.kubernetes.cluster.namespace={}", key::cluster_namespace(spec)),
            format!("--service.kubernetes.cluster.service={}", role),
        ]),
        security_context: privileged.clone(),
        ..Default::default()
    };

    let k8s_kvm = Container {
        name: "k8s-kvm".to_string(),
        image: Some(spec.kvm.k8s_kvm_image.clone()),
        image_pull_policy: Some("IfNotPresent".to_string()),
        args: Some(vec![role.to_string()]),
        env: Some(vec![
            env("CORES", key::cpu_quantity(capabilities)),
            env("DISK", key::disk_quantity(capabilities)),
            env("MEMORY", capabilities.memory.clone()),
            env("ROLE", role.as_str()),
            env("CLOUD_CONFIG_PATH", format!("{CLOUD_CONFIG_MOUNT}{USER_DATA_KEY}")),
        ]),
        resources: Some(ResourceRequirements {
            requests: Some(BTreeMap::from([
                ("cpu".to_string(), Quantity(key::cpu_quantity(capabilities))),
                ("memory".to_string(), Quantity(capabilities.memory.clone())),
            ])),
            ..Default::default()
        }),
        volume_mounts: Some(vec![
            VolumeMount {
                name: CLOUD_CONFIG_VOLUME.to_string(),
                mount_path: CLOUD_CONFIG_MOUNT.to_string(),
                ..Default::default()
            },
            VolumeMount {
                name: IMAGES_VOLUME.to_string(),
                mount_path: "/usr/code/images/".to_string(),
                ..Default::default()
            },
            VolumeMount {
                name: DATA_VOLUME.to_string(),
                mount_path: "/usr/code/data/".to_string(),
                ..Default::default()
            },
        ]),
        security_context: privileged,
        ..Default::default()
    };

    Deployment {
        metadata: ObjectMeta {
            name: Some(key::deployment_name(role, node)),
            namespace: Some(key::cluster_namespace(spec)),
            labels: Some(labels.clone()),
            annotations: Some(BTreeMap::from([(
                annotations::VERSION_BUNDLE_VERSION.to_string(),
                key::version_bundle_version(spec).to_string(),
            )])),
            ..Default::default()
        },
        spec: Some(DeploymentSpec {
            replicas: Some(1),
            selector: LabelSelector {
                match_labels: Some(labels.clone()),
                ..Default::default()
            },
            // Never run two copies of the same machine
            strategy: Some(DeploymentStrategy {
                type_: Some("Recreate".to_string()),
                ..Default::default()
            }),
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    name: Some(role.to_string()),
                    labels: Some(labels),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    host_network: Some(true),
                    node_selector: Some(BTreeMap::from([(
                        key::labels::ROLE.to_string(),
                        role.to_string(),
                    )])),
                    volumes: Some(vec![
                        Volume {
                            name: CLOUD_CONFIG_VOLUME.to_string(),
                            config_map: Some(ConfigMapVolumeSource {
                                name: key::config_map_name(spec, node, role),
                                ..Default::default()
                            }),
                            ..Default::default()
                        },
                        host_path_volume(IMAGES_VOLUME, IMAGES_HOST_PATH.to_string()),
                        Volume {
                            name: "rootfs".to_string(),
                            empty_dir: Some(EmptyDirVolumeSource::default()),
                            ..Default::default()
                        },
                        data_volume,
                    ]),
                    containers: vec![endpoint_updater, k8s_kvm],
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}
