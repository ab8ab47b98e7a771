//! KvmCluster custom resource: the declarative description of a workload cluster

use std::str::FromStr;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::key::NodeRole;
use crate::validation::{validate_quantity, ValidationError, ValidationResult};

/// Cluster identity and endpoints
#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClusterInfo {
    /// Cluster ID, also used as the cluster namespace
    pub id: String,
    /// Customer owning the cluster
    #[serde(default)]
    pub customer: String,
    /// Public domain of the Kubernetes API
    #[serde(default)]
    pub api_domain: String,
    /// Public domain of etcd
    #[serde(default)]
    pub etcd_domain: String,
}

/// A control-plane or worker node
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub id: String,
}

/// Capacity of one virtual machine
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NodeCapabilities {
    /// Number of virtual CPUs
    pub cpus: u32,
    /// Memory quantity, e.g. "2G"
    pub memory: String,
    /// Disk size in gigabytes
    pub disk: f64,
}

/// Virtualization settings
#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct KvmSettings {
    /// Capabilities of each master, by position
    #[serde(default)]
    pub masters: Vec<NodeCapabilities>,
    /// Capabilities of each worker, by position
    #[serde(default)]
    pub workers: Vec<NodeCapabilities>,
    /// Storage backend: "hostPath" (default) or "persistentVolume"
    #[serde(default)]
    pub storage_type: String,
    /// Image running the virtual machine
    #[serde(default = "default_k8s_kvm_image")]
    pub k8s_kvm_image: String,
    /// Image keeping service endpoints pointed at the virtual machine
    #[serde(default = "default_endpoint_updater_image")]
    pub endpoint_updater_image: String,
}

fn default_k8s_kvm_image() -> String {
    "quay.io/kvm-operator/k8s-kvm:latest".to_string()
}

fn default_endpoint_updater_image() -> String {
    "quay.io/kvm-operator/k8s-endpoint-updater:latest".to_string()
}

/// Version metadata stamped on workloads
#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct VersionBundle {
    #[serde(default)]
    pub version: String,
}

/// KvmCluster spec
#[derive(CustomResource, Clone, Debug, Default, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "kvm-operator.io",
    version = "v1alpha1",
    kind = "KvmCluster",
    plural = "kvmclusters",
    shortname = "kvmc",
    namespaced = false
)]
#[serde(rename_all = "camelCase")]
pub struct KvmClusterSpec {
    pub cluster: ClusterInfo,
    /// Control-plane nodes, in order
    #[serde(default)]
    pub masters: Vec<Node>,
    /// Worker nodes, in order
    #[serde(default)]
    pub workers: Vec<Node>,
    pub kvm: KvmSettings,
    #[serde(default)]
    pub version_bundle: VersionBundle,
}

/// Where etcd and worker data live
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StorageType {
    HostPath,
    PersistentVolume,
}

impl FromStr for StorageType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            // Specs written before the field existed carry no storage type
            "" | "hostPath" => Ok(StorageType::HostPath),
            "persistentVolume" => Ok(StorageType::PersistentVolume),
            other => Err(ValidationError::UnknownStorageType(other.to_string())),
        }
    }
}

impl KvmClusterSpec {
    pub fn storage_type(&self) -> ValidationResult<StorageType> {
        self.kvm.storage_type.parse()
    }

    pub fn nodes(&self, role: NodeRole) -> &[Node] {
        match role {
            NodeRole::Master => &self.masters,
            NodeRole::Worker => &self.workers,
        }
    }

    /// Pair every node of a role with its capabilities.
    ///
    /// Nodes and capabilities are matched by position, so both lists must
    /// have the same length and every capability must be usable.
    pub fn nodes_with_capabilities(
        &self,
        role: NodeRole,
    ) -> ValidationResult<Vec<(&Node, &NodeCapabilities)>> {
        let nodes = self.nodes(role);
        let capabilities = match role {
            NodeRole::Master => &self.kvm.masters,
            NodeRole::Worker => &self.kvm.workers,
        };

        if nodes.len() != capabilities.len() {
            return Err(ValidationError::CapabilityMismatch {
                role: role.to_string(),
                nodes: nodes.len(),
                capabilities: capabilities.len(),
            });
        }

        for (node, caps) in nodes.iter().zip(capabilities) {
            let invalid = |field: &str, reason: String| ValidationError::InvalidCapability {
                role: role.to_string(),
                node: node.id.clone(),
                field: field.to_string(),
                reason,
            };
            if caps.cpus == 0 {
                return Err(invalid("cpus", "must be at least 1".to_string()));
            }
            if !validate_quantity(&caps.memory) {
                return Err(invalid(
                    "memory",
                    format!("'{}' is not a valid quantity", caps.memory),
                ));
            }
            if !caps.disk.is_finite() || caps.disk <= 0.0 {
                return Err(invalid("disk", format!("{} must be positive", caps.disk)));
            }
        }

        Ok(nodes.iter().zip(capabilities.iter()).collect())
    }
}
