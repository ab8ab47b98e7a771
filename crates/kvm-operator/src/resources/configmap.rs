//! Cloud-config bundles, one per virtual machine

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::ConfigMap;
use kube::api::ObjectMeta;
use kvm_operator_common::key::{self, NodeRole};
use kvm_operator_common::{KvmClusterSpec, Node, ValidationResult};

use super::{same_name, DesiredState};
use crate::framework::ResourceKind;

/// Key the virtual machine reads its cloud-config from
pub const USER_DATA_KEY: &str = "user_data";

pub struct ConfigMapGenerator;

impl DesiredState for ConfigMapGenerator {
    type Object = ConfigMap;

    const KIND: ResourceKind = ResourceKind::ConfigMap;

    fn build(&self, spec: &KvmClusterSpec) -> ValidationResult<Vec<ConfigMap>> {
        let mut config_maps = Vec::new();

        for role in NodeRole::ALL {
            for (node, _) in spec.nodes_with_capabilities(role)? {
                config_maps.push(ConfigMap {
                    metadata: ObjectMeta {
                        name: Some(key::config_map_name(spec, node, role)),
                        namespace: Some(key::cluster_namespace(spec)),
                        labels: Some(key::node_labels(spec, role, node)),
                        ..Default::default()
                    },
                    data: Some(BTreeMap::from([(
                        USER_DATA_KEY.to_string(),
                        render_user_data(spec, role, node),
                    )])),
                    ..Default::default()
                });
            }
        }

        Ok(config_maps)
    }

    fn is_same(current: &ConfigMap, desired: &ConfigMap) -> bool {
        same_name(current, desired)
    }

    fn has_drifted(current: &ConfigMap, desired: &ConfigMap) -> bool {
        current.data != desired.data
    }
}

/// Minimal cloud-config identifying the machine. Full machine provisioning
/// is rendered elsewhere.
fn render_user_data(spec: &KvmClusterSpec, role: NodeRole, node: &Node) -> String {
    format!(
        "#cloud-config\n\
         hostname: {role}-{node}\n\
         write_files:\n\
         - path: /etc/kvm-operator/cluster\n\
         \x20 content: |\n\
         \x20   CLUSTER_ID={cluster}\n\
         \x20   ROLE={role}\n\
         \x20   API_DOMAIN={api}\n\
         \x20   VERSION={version}\n",
        role = role,
        node = node.id,
        cluster = key::cluster_id(spec),
        api = spec.cluster.api_domain,
        version = key::version_bundle_version(spec),
    )
}
