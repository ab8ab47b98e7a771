pub mod cluster;
pub mod key;
pub mod validation;

pub use cluster::{
    ClusterInfo, KvmCluster, KvmClusterSpec, KvmSettings, Node, NodeCapabilities, StorageType,
    VersionBundle,
};
pub use key::NodeRole;
pub use validation::{
    validate_cluster_id, validate_hostname, validate_quantity, validate_resource_name,
    ValidationError, ValidationResult,
};
