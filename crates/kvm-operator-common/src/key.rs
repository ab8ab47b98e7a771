//! Deterministic names, labels and selectors derived from a cluster spec.
//!
//! Every object the operator manages is named from these helpers, so names
//! stay stable across reconciliation passes for as long as the spec does.

use std::collections::BTreeMap;
use std::fmt;

use crate::cluster::{KvmClusterSpec, Node, NodeCapabilities};

/// Labels attached to every managed object
pub mod labels {
    pub const CLUSTER: &str = "cluster";
    pub const CUSTOMER: &str = "customer";
    pub const APP: &str = "app";
    pub const NODE: &str = "node";
    pub const ROLE: &str = "role";
}

/// Annotations attached to managed workloads
pub mod annotations {
    /// Version bundle the workload was generated from
    pub const VERSION_BUNDLE_VERSION: &str = "kvm-operator.io/version-bundle-version";
}

/// Role of a node in the workload cluster
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NodeRole {
    Master,
    Worker,
}

impl NodeRole {
    pub const ALL: [NodeRole; 2] = [NodeRole::Master, NodeRole::Worker];

    pub fn as_str(&self) -> &'static str {
        match self {
            NodeRole::Master => "master",
            NodeRole::Worker => "worker",
        }
    }
}

impl fmt::Display for NodeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn cluster_id(spec: &KvmClusterSpec) -> &str {
    &spec.cluster.id
}

/// Every cluster gets its own namespace, named after the cluster ID
pub fn cluster_namespace(spec: &KvmClusterSpec) -> String {
    spec.cluster.id.clone()
}

/// Label selector matching everything managed for the cluster
pub fn cluster_selector(spec: &KvmClusterSpec) -> String {
    format!("{}={}", labels::CLUSTER, spec.cluster.id)
}

pub fn cluster_labels(spec: &KvmClusterSpec) -> BTreeMap<String, String> {
    BTreeMap::from([
        (labels::CLUSTER.to_string(), spec.cluster.id.clone()),
        (labels::CUSTOMER.to_string(), spec.cluster.customer.clone()),
    ])
}

pub fn role_labels(spec: &KvmClusterSpec, role: NodeRole) -> BTreeMap<String, String> {
    let mut result = cluster_labels(spec);
    result.insert(labels::APP.to_string(), role.to_string());
    result
}

pub fn node_labels(spec: &KvmClusterSpec, role: NodeRole, node: &Node) -> BTreeMap<String, String> {
    let mut result = role_labels(spec, role);
    result.insert(labels::NODE.to_string(), node.id.clone());
    result
}

pub fn config_map_name(spec: &KvmClusterSpec, node: &Node, role: NodeRole) -> String {
    format!("{}-{}-{}", role, spec.cluster.id, node.id)
}

pub fn deployment_name(role: NodeRole, node: &Node) -> String {
    format!("{}-{}", role, node.id)
}

/// Name of the claim backing the worker at `index` in the worker list
pub fn worker_pvc_name(cluster_id: &str, index: usize) -> String {
    format!("{}-worker-data-{}", cluster_id, index)
}

pub fn master_host_path(cluster_id: &str, index: usize) -> String {
    format!("/home/core/volumes/{}-master-{}/", cluster_id, index)
}

pub fn worker_host_path(cluster_id: &str, index: usize) -> String {
    format!("/home/core/volumes/{}-worker-{}/", cluster_id, index)
}

pub fn version_bundle_version(spec: &KvmClusterSpec) -> &str {
    &spec.version_bundle.version
}

pub fn cpu_quantity(capabilities: &NodeCapabilities) -> String {
    capabilities.cpus.to_string()
}

pub fn disk_quantity(capabilities: &NodeCapabilities) -> String {
    format!("{:.0}G", capabilities.disk)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::ClusterInfo;

    fn test_spec() -> KvmClusterSpec {
        KvmClusterSpec {
            cluster: ClusterInfo {
                id: "abc12".to_string(),
                customer: "acme".to_string(),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_names() {
        let spec = test_spec();
        let node = Node {
            id: "w1".to_string(),
        };
        assert_eq!(cluster_namespace(&spec), "abc12");
        assert_eq!(cluster_selector(&spec), "cluster=abc12");
        assert_eq!(
            config_map_name(&spec, &node, NodeRole::Worker),
            "worker-abc12-w1"
        );
        assert_eq!(deployment_name(NodeRole::Master, &node), "master-w1");
        assert_eq!(worker_pvc_name("abc12", 2), "abc12-worker-data-2");
    }

    #[test]
    fn test_labels() {
        let spec = test_spec();
        let node = Node {
            id: "m1".to_string(),
        };
        let labels = node_labels(&spec, NodeRole::Master, &node);
        assert_eq!(labels.get("cluster").map(String::as_str), Some("abc12"));
        assert_eq!(labels.get("customer").map(String::as_str), Some("acme"));
        assert_eq!(labels.get("app").map(String::as_str), Some("master"));
        assert_eq!(labels.get("node").map(String::as_str), Some("m1"));
    }

    #[test]
    fn test_quantities() {
        let caps = NodeCapabilities {
            cpus: 4,
            memory: "8G".to_string(),
            disk: 49.6,
        };
        assert_eq!(cpu_quantity(&caps), "4");
        assert_eq!(disk_quantity(&caps), "50G");
    }
}
