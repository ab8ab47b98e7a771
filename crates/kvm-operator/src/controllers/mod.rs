//! Controller loop: runs reconciliation passes per cluster namespace.
//!
//! This is the only layer that logs pass outcomes. Lower layers return
//! errors carrying their context and leave reporting to the pass.

pub mod kvmcluster;
pub mod retry;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, PersistentVolumeClaim, Service};
use k8s_openapi::api::networking::v1::Ingress;
use kube::ResourceExt;
use kvm_operator_common::{key, validate_cluster_id, KvmClusterSpec};
use tracing::{debug, error, info};

use crate::api::{ObjectApi, ObjectApis};
use crate::error::{classify, ErrorClass, Operation, ReconcileError};
use crate::framework::{ChangeAction, ResourceKind};
use crate::metrics::ReconcileMetrics;
use crate::reconciler::KindReport;
use crate::resources::ManagedResource;

use self::retry::RetryTracker;

/// Shared state for the cluster controller
pub struct ControllerContext {
    pub reconciler: Arc<Reconciler>,
    /// Consecutive failed passes per cluster
    pub retry_tracker: RetryTracker,
    /// Delay before re-running a successful pass
    pub resync: Duration,
}

/// A fully built object handed to [`Reconciler::reconcile_namespace`]
#[derive(Clone, Debug)]
pub enum DesiredObject {
    ConfigMap(ConfigMap),
    Deployment(Deployment),
    PersistentVolumeClaim(PersistentVolumeClaim),
    Service(Service),
    Ingress(Ingress),
}

impl DesiredObject {
    pub fn kind(&self) -> ResourceKind {
        match self {
            DesiredObject::ConfigMap(_) => ResourceKind::ConfigMap,
            DesiredObject::Deployment(_) => ResourceKind::Deployment,
            DesiredObject::PersistentVolumeClaim(_) => ResourceKind::PersistentVolumeClaim,
            DesiredObject::Service(_) => ResourceKind::Service,
            DesiredObject::Ingress(_) => ResourceKind::Ingress,
        }
    }

    pub fn name(&self) -> String {
        match self {
            DesiredObject::ConfigMap(o) => o.name_any(),
            DesiredObject::Deployment(o) => o.name_any(),
            DesiredObject::PersistentVolumeClaim(o) => o.name_any(),
            DesiredObject::Service(o) => o.name_any(),
            DesiredObject::Ingress(o) => o.name_any(),
        }
    }
}

macro_rules! desired_object_from {
    ($($variant:ident),* $(,)?) => {
        $(
            impl From<$variant> for DesiredObject {
                fn from(object: $variant) -> Self {
                    DesiredObject::$variant(object)
                }
            }
        )*
    };
}

desired_object_from!(ConfigMap, Deployment, PersistentVolumeClaim, Service, Ingress);

/// Outcome of a successful pass
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PassReport {
    pub namespace: String,
    pub kinds: Vec<KindReport>,
}

impl PassReport {
    pub fn created(&self) -> usize {
        self.kinds.iter().map(|k| k.created).sum()
    }

    pub fn updated(&self) -> usize {
        self.kinds.iter().map(|k| k.updated).sum()
    }

    pub fn deleted(&self) -> usize {
        self.kinds.iter().map(|k| k.deleted).sum()
    }

    pub fn kind(&self, kind: ResourceKind) -> Option<&KindReport> {
        self.kinds.iter().find(|k| k.kind == kind)
    }
}

/// Pass bookkeeping: attempt counter on start, duration and outcome log on
/// finish.
struct PassTimer<'a> {
    metrics: &'a ReconcileMetrics,
    namespace: String,
    started: Instant,
}

impl<'a> PassTimer<'a> {
    fn start(metrics: &'a ReconcileMetrics, namespace: &str) -> Self {
        metrics.pass_started(namespace);
        info!(namespace = %namespace, "Reconciliation pass started");
        Self {
            metrics,
            namespace: namespace.to_string(),
            started: Instant::now(),
        }
    }

    fn finish(
        self,
        result: Result<PassReport, ReconcileError>,
    ) -> Result<PassReport, ReconcileError> {
        let elapsed = self.started.elapsed();
        self.metrics.pass_finished(&self.namespace, elapsed);

        match &result {
            Ok(report) => info!(
                namespace = %self.namespace,
                created = report.created(),
                updated = report.updated(),
                deleted = report.deleted(),
                elapsed_ms = elapsed.as_millis() as u64,
                "Reconciliation pass succeeded"
            ),
            Err(e) => error!(
                namespace = %self.namespace,
                error = %e,
                transient = e.is_transient(),
                elapsed_ms = elapsed.as_millis() as u64,
                "Reconciliation pass failed"
            ),
        }

        result
    }
}

/// Runs reconciliation passes over the registered resource kinds.
///
/// Holds no per-pass state, so one instance serves concurrent passes for
/// different namespaces.
pub struct Reconciler {
    apis: ObjectApis,
    resources: Vec<ManagedResource>,
    metrics: Arc<ReconcileMetrics>,
}

impl Reconciler {
    pub fn new(apis: ObjectApis, metrics: Arc<ReconcileMetrics>) -> Self {
        let resources = ManagedResource::registered(&apis, metrics.clone());
        Self {
            apis,
            resources,
            metrics,
        }
    }

    pub fn metrics(&self) -> &ReconcileMetrics {
        &self.metrics
    }

    /// Reconcile every managed kind of a cluster.
    ///
    /// Kinds are reconciled one after another. A failing kind does not stop
    /// the others; all failures are reported together once every kind ran.
    /// An invalid cluster id fails every kind before any API call.
    pub async fn reconcile_cluster(
        &self,
        spec: &KvmClusterSpec,
    ) -> Result<PassReport, ReconcileError> {
        let namespace = key::cluster_namespace(spec);
        let timer = PassTimer::start(&self.metrics, &namespace);

        if let Err(source) = validate_cluster_id(key::cluster_id(spec)) {
            let failures = self
                .resources
                .iter()
                .map(|resource| ReconcileError::SpecValidation {
                    kind: resource.kind(),
                    source: source.clone(),
                })
                .collect();
            return timer.finish(Err(ReconcileError::Pass {
                namespace,
                failures,
            }));
        }

        let mut kinds = Vec::with_capacity(self.resources.len());
        let mut failures = Vec::new();
        for resource in &self.resources {
            match resource.reconcile(spec).await {
                Ok(report) => kinds.push(report),
                Err(e) => failures.push(e),
            }
        }

        let result = if failures.is_empty() {
            Ok(PassReport {
                namespace: namespace.clone(),
                kinds,
            })
        } else {
            Err(ReconcileError::Pass {
                namespace: namespace.clone(),
                failures,
            })
        };

        timer.finish(result)
    }

    /// Create pre-built objects in `namespace`.
    ///
    /// Objects that already exist count as created. Any other failure ends
    /// the pass.
    pub async fn reconcile_namespace(
        &self,
        namespace: &str,
        desired: &[DesiredObject],
    ) -> Result<PassReport, ReconcileError> {
        let timer = PassTimer::start(&self.metrics, namespace);
        let result = self.create_all(namespace, desired).await;
        timer.finish(result)
    }

    async fn create_all(
        &self,
        namespace: &str,
        desired: &[DesiredObject],
    ) -> Result<PassReport, ReconcileError> {
        let mut kinds: BTreeMap<ResourceKind, KindReport> = BTreeMap::new();

        for object in desired {
            let kind = object.kind();
            let started = Instant::now();

            if let Err(source) = self.create(namespace, object).await {
                match classify(Operation::Create, &source) {
                    ErrorClass::Idempotent => {
                        debug!(
                            namespace = %namespace,
                            kind = %kind,
                            name = %object.name(),
                            "Object already exists"
                        );
                    }
                    class => {
                        return Err(ReconcileError::Pass {
                            namespace: namespace.to_string(),
                            failures: vec![ReconcileError::Apply {
                                operation: Operation::Create,
                                kind,
                                namespace: namespace.to_string(),
                                name: object.name(),
                                class,
                                source,
                            }],
                        });
                    }
                }
            }

            self.metrics
                .record_modification(namespace, kind, ChangeAction::Created, started.elapsed());
            kinds
                .entry(kind)
                .or_insert_with(|| KindReport {
                    kind,
                    created: 0,
                    updated: 0,
                    deleted: 0,
                })
                .created += 1;
        }

        Ok(PassReport {
            namespace: namespace.to_string(),
            kinds: kinds.into_values().collect(),
        })
    }

    async fn create(&self, namespace: &str, object: &DesiredObject) -> Result<(), kube::Error> {
        match object {
            DesiredObject::ConfigMap(o) => self.apis.config_maps.create(namespace, o).await,
            DesiredObject::Deployment(o) => self.apis.deployments.create(namespace, o).await,
            DesiredObject::PersistentVolumeClaim(o) => {
                self.apis.persistent_volume_claims.create(namespace, o).await
            }
            DesiredObject::Service(o) => self.apis.services.create(namespace, o).await,
            DesiredObject::Ingress(o) => self.apis.ingresses.create(namespace, o).await,
        }
    }
}
