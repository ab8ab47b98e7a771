//! Persistent storage claims for worker data

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{
    PersistentVolumeClaim, PersistentVolumeClaimSpec, VolumeResourceRequirements,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use kube::api::ObjectMeta;
use kvm_operator_common::key::{self, NodeRole};
use kvm_operator_common::{KvmClusterSpec, StorageType, ValidationResult};

use super::{same_namespaced_name, DesiredState};
use crate::framework::ResourceKind;

pub struct PersistentVolumeClaimGenerator;

impl DesiredState for PersistentVolumeClaimGenerator {
    type Object = PersistentVolumeClaim;

    const KIND: ResourceKind = ResourceKind::PersistentVolumeClaim;

    /// One claim per worker, and only on persistent-volume storage.
    fn build(&self, spec: &KvmClusterSpec) -> ValidationResult<Vec<PersistentVolumeClaim>> {
        if spec.storage_type()? != StorageType::PersistentVolume {
            return Ok(Vec::new());
        }

        let cluster_id = key::cluster_id(spec);
        let claims = spec
            .nodes_with_capabilities(NodeRole::Worker)?
            .into_iter()
            .enumerate()
            .map(|(index, (node, capabilities))| PersistentVolumeClaim {
                metadata: ObjectMeta {
                    name: Some(key::worker_pvc_name(cluster_id, index)),
                    namespace: Some(key::cluster_namespace(spec)),
                    labels: Some(key::node_labels(spec, NodeRole::Worker, node)),
                    ..Default::default()
                },
                spec: Some(PersistentVolumeClaimSpec {
                    access_modes: Some(vec!["ReadWriteOnce".to_string()]),
                    resources: Some(VolumeResourceRequirements {
                        requests: Some(BTreeMap::from([(
                            "storage".to_string(),
                            Quantity(key::disk_quantity(capabilities)),
                        )])),
                        ..Default::default()
                    }),
                    ..Default::default()
                }),
                ..Default::default()
            })
            .collect();

        Ok(claims)
    }

    fn is_same(current: &PersistentVolumeClaim, desired: &PersistentVolumeClaim) -> bool {
        same_namespaced_name(current, desired)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ObjectApi;
    use crate::framework::Resource;
    use crate::metrics::ReconcileMetrics;
    use crate::resources::KubeResource;
    use crate::test_utils::{test_spec, FakeObjectApi};
    use kube::ResourceExt;
    use std::sync::Arc;

    #[test]
    fn test_no_claims_on_host_path_storage() {
        assert!(PersistentVolumeClaimGenerator
            .build(&test_spec("abc12", 3, ""))
            .unwrap()
            .is_empty());
        assert!(PersistentVolumeClaimGenerator
            .build(&test_spec("abc12", 3, "hostPath"))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_claim_requests_worker_disk() {
        let claims = PersistentVolumeClaimGenerator
            .build(&test_spec("abc12", 1, "persistentVolume"))
            .unwrap();

        let requests = claims[0]
            .spec
            .as_ref()
            .unwrap()
            .resources
            .as_ref()
            .unwrap()
            .requests
            .as_ref()
            .unwrap();
        assert_eq!(requests["storage"], Quantity("20G".to_string()));
    }

    #[tokio::test]
    async fn test_three_workers_on_persistent_volumes() {
        let spec = test_spec("abc12", 3, "persistentVolume");
        let api = FakeObjectApi::<PersistentVolumeClaim>::new();
        let resource = KubeResource::new(
            api.clone(),
            PersistentVolumeClaimGenerator,
            Arc::new(ReconcileMetrics::new().unwrap()),
        );

        let desired = resource.desired_state(&spec).unwrap();
        let names: Vec<String> = desired.iter().map(ResourceExt::name_any).collect();
        assert_eq!(
            names,
            vec![
                "abc12-worker-data-0",
                "abc12-worker-data-1",
                "abc12-worker-data-2"
            ]
        );

        let current = resource.current_state(&spec).await.unwrap();
        assert!(current.is_empty());
        assert_eq!(resource.new_create_patch(&current, &desired).to_create.len(), 3);
        assert!(resource.new_delete_patch(&current, &desired).to_delete.is_empty());

        // Existing claims are never recreated
        for claim in &desired {
            api.create("abc12", claim).await.unwrap();
        }
        let current = resource.current_state(&spec).await.unwrap();
        assert!(resource.new_create_patch(&current, &desired).to_create.is_empty());
    }

    #[test]
    fn test_unknown_storage_type_rejected() {
        assert!(PersistentVolumeClaimGenerator
            .build(&test_spec("abc12", 3, "ceph"))
            .is_err());
    }
}
