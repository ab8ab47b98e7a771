//! Resource-kind adapters
//!
//! Each kind pairs a desired-state generator ([`DesiredState`]) with the
//! orchestration API through [`KubeResource`], which implements the
//! framework's [`Resource`] capability uniformly. [`ManagedResource`] is the
//! closed set of adapters a pass iterates over.

pub mod configmap;
pub mod deployment;
pub mod ingress;
pub mod pvc;
pub mod service;

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use kube::{Resource as KubeObject, ResourceExt};
use kvm_operator_common::key;
use kvm_operator_common::{
    validate_cluster_id, validate_resource_name, KvmClusterSpec, ValidationError,
    ValidationResult,
};
use tracing::debug;

use crate::api::{ObjectApi, ObjectApis};
use crate::error::{classify, ErrorClass, ReconcileError};
use crate::framework::{diff, ChangeAction, Patch, Resource, ResourceKind};
use crate::metrics::ReconcileMetrics;
use crate::reconciler::{reconcile_resource, KindReport};

pub use configmap::ConfigMapGenerator;
pub use deployment::DeploymentGenerator;
pub use ingress::IngressGenerator;
pub use pvc::PersistentVolumeClaimGenerator;
pub use service::ServiceGenerator;

/// Desired-state generator and identity rules for one kind
pub trait DesiredState: Send + Sync {
    type Object: KubeObject + Clone + Send + Sync + 'static;

    const KIND: ResourceKind;

    /// Build every object the cluster needs of this kind.
    fn build(&self, spec: &KvmClusterSpec) -> ValidationResult<Vec<Self::Object>>;

    /// Whether two objects are the same logical item.
    fn is_same(current: &Self::Object, desired: &Self::Object) -> bool;

    /// Whether an existing item must be rewritten to match the desired one.
    fn has_drifted(_current: &Self::Object, _desired: &Self::Object) -> bool {
        false
    }
}

/// Identity by name
pub fn same_name<K: KubeObject>(a: &K, b: &K) -> bool {
    a.meta().name == b.meta().name
}

/// Identity by namespace and name
pub fn same_namespaced_name<K: KubeObject>(a: &K, b: &K) -> bool {
    a.meta().namespace == b.meta().namespace && same_name(a, b)
}

/// Adapter driving one kind against the orchestration API
pub struct KubeResource<G: DesiredState> {
    api: Arc<dyn ObjectApi<G::Object>>,
    generator: G,
    metrics: Arc<ReconcileMetrics>,
}

impl<G: DesiredState> KubeResource<G> {
    pub fn new(
        api: Arc<dyn ObjectApi<G::Object>>,
        generator: G,
        metrics: Arc<ReconcileMetrics>,
    ) -> Self {
        Self {
            api,
            generator,
            metrics,
        }
    }

    /// Apply `action` to every item, stopping at the first failure that is
    /// not an idempotent conflict.
    async fn apply_change(
        &self,
        spec: &KvmClusterSpec,
        action: ChangeAction,
        items: &[G::Object],
    ) -> Result<usize, ReconcileError> {
        let namespace = key::cluster_namespace(spec);
        let operation = action.operation();

        for object in items {
            let name = object.name_any();
            let started = Instant::now();
            let result = match action {
                ChangeAction::Created => self.api.create(&namespace, object).await,
                ChangeAction::Updated => self.api.replace(&namespace, &name, object).await,
                ChangeAction::Deleted => self.api.delete(&namespace, &name).await,
            };

            if let Err(source) = result {
                match classify(operation, &source) {
                    ErrorClass::Idempotent => {
                        debug!(
                            namespace = %namespace,
                            kind = %G::KIND,
                            name = %name,
                            action = %action,
                            error = %source,
                            "Object already in desired state"
                        );
                    }
                    class => {
                        return Err(ReconcileError::Apply {
                            operation,
                            kind: G::KIND,
                            namespace,
                            name,
                            class,
                            source,
                        });
                    }
                }
            } else {
                debug!(
                    namespace = %namespace,
                    kind = %G::KIND,
                    name = %name,
                    action = %action,
                    "Applied change"
                );
            }

            self.metrics
                .record_modification(&namespace, G::KIND, action, started.elapsed());
        }

        Ok(items.len())
    }
}

#[async_trait]
impl<G: DesiredState> Resource for KubeResource<G> {
    type Item = G::Object;

    fn kind(&self) -> ResourceKind {
        G::KIND
    }

    async fn current_state(
        &self,
        spec: &KvmClusterSpec,
    ) -> Result<Vec<G::Object>, ReconcileError> {
        let namespace = key::cluster_namespace(spec);
        let selector = key::cluster_selector(spec);
        let result = self.api.list(&namespace, &selector).await;
        result.map_err(|source| ReconcileError::Observation {
            kind: G::KIND,
            namespace,
            source,
        })
    }

    fn desired_state(&self, spec: &KvmClusterSpec) -> Result<Vec<G::Object>, ReconcileError> {
        let invalid = |source: ValidationError| ReconcileError::SpecValidation {
            kind: G::KIND,
            source,
        };

        validate_cluster_id(key::cluster_id(spec)).map_err(invalid)?;
        let objects = self.generator.build(spec).map_err(invalid)?;
        for object in &objects {
            validate_resource_name(&object.name_any()).map_err(invalid)?;
        }
        Ok(objects)
    }

    fn new_create_patch(&self, current: &[G::Object], desired: &[G::Object]) -> Patch<G::Object> {
        let mut patch = Patch::new(G::KIND);
        patch.to_create = diff::create_set(current, desired, G::is_same);
        patch
    }

    fn new_update_patch(&self, current: &[G::Object], desired: &[G::Object]) -> Patch<G::Object> {
        let mut patch = Patch::new(G::KIND);
        patch.to_update = diff::update_set(current, desired, G::is_same, G::has_drifted)
            .into_iter()
            .map(|(current, desired)| {
                // Replace is rejected unless it targets the observed revision
                let mut object = desired.clone();
                object.meta_mut().resource_version = current.meta().resource_version.clone();
                object
            })
            .collect();
        patch
    }

    fn new_delete_patch(&self, current: &[G::Object], desired: &[G::Object]) -> Patch<G::Object> {
        let mut patch = Patch::new(G::KIND);
        patch.to_delete = diff::delete_set(current, desired, G::is_same);
        patch
    }

    async fn apply_create_change(
        &self,
        spec: &KvmClusterSpec,
        patch: &Patch<G::Object>,
    ) -> Result<usize, ReconcileError> {
        self.apply_change(spec, ChangeAction::Created, &patch.to_create)
            .await
    }

    async fn apply_update_change(
        &self,
        spec: &KvmClusterSpec,
        patch: &Patch<G::Object>,
    ) -> Result<usize, ReconcileError> {
        self.apply_change(spec, ChangeAction::Updated, &patch.to_update)
            .await
    }

    async fn apply_delete_change(
        &self,
        spec: &KvmClusterSpec,
        patch: &Patch<G::Object>,
    ) -> Result<usize, ReconcileError> {
        self.apply_change(spec, ChangeAction::Deleted, &patch.to_delete)
            .await
    }
}

pub type ConfigMapResource = KubeResource<ConfigMapGenerator>;
pub type DeploymentResource = KubeResource<DeploymentGenerator>;
pub type PersistentVolumeClaimResource = KubeResource<PersistentVolumeClaimGenerator>;
pub type ServiceResource = KubeResource<ServiceGenerator>;
pub type IngressResource = KubeResource<IngressGenerator>;

/// The closed set of adapters reconciled for every cluster
pub enum ManagedResource {
    ConfigMap(ConfigMapResource),
    Deployment(DeploymentResource),
    PersistentVolumeClaim(PersistentVolumeClaimResource),
    Service(ServiceResource),
    Ingress(IngressResource),
}

impl ManagedResource {
    /// Adapters in reconciliation order: configuration and storage before
    /// the workloads consuming them, network front-ends last.
    pub fn registered(apis: &ObjectApis, metrics: Arc<ReconcileMetrics>) -> Vec<ManagedResource> {
        vec![
            ManagedResource::ConfigMap(KubeResource::new(
                apis.config_maps.clone(),
                ConfigMapGenerator,
                metrics.clone(),
            )),
            ManagedResource::PersistentVolumeClaim(KubeResource::new(
                apis.persistent_volume_claims.clone(),
                PersistentVolumeClaimGenerator,
                metrics.clone(),
            )),
            ManagedResource::Deployment(KubeResource::new(
                apis.deployments.clone(),
                DeploymentGenerator,
                metrics.clone(),
            )),
            ManagedResource::Service(KubeResource::new(
                apis.services.clone(),
                ServiceGenerator,
                metrics.clone(),
            )),
            ManagedResource::Ingress(KubeResource::new(
                apis.ingresses.clone(),
                IngressGenerator,
                metrics,
            )),
        ]
    }

    pub fn kind(&self) -> ResourceKind {
        match self {
            ManagedResource::ConfigMap(r) => r.kind(),
            ManagedResource::Deployment(r) => r.kind(),
            ManagedResource::PersistentVolumeClaim(r) => r.kind(),
            ManagedResource::Service(r) => r.kind(),
            ManagedResource::Ingress(r) => r.kind(),
        }
    }

    /// Run one full observe/diff/apply cycle for this kind.
    pub async fn reconcile(&self, spec: &KvmClusterSpec) -> Result<KindReport, ReconcileError> {
        match self {
            ManagedResource::ConfigMap(r) => reconcile_resource(r, spec).await,
            ManagedResource::Deployment(r) => reconcile_resource(r, spec).await,
            ManagedResource::PersistentVolumeClaim(r) => reconcile_resource(r, spec).await,
            ManagedResource::Service(r) => reconcile_resource(r, spec).await,
            ManagedResource::Ingress(r) => reconcile_resource(r, spec).await,
        }
    }
}
