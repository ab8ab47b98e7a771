//! Reconciliation driver: one observe/diff/apply cycle for a single kind.

use kvm_operator_common::{key, KvmClusterSpec};
use tracing::{debug, instrument};

use crate::error::ReconcileError;
use crate::framework::{Resource, ResourceKind};

/// Outcome of reconciling one kind
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KindReport {
    pub kind: ResourceKind,
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
}

impl KindReport {
    pub fn changes(&self) -> usize {
        self.created + self.updated + self.deleted
    }
}

/// Observe current state, derive desired state, then compute and apply the
/// create, update and delete patches in that order.
///
/// Every patch is computed from the same snapshot. The first failing stage
/// ends the cycle for this kind.
#[instrument(skip_all, fields(kind = %resource.kind(), namespace = %key::cluster_namespace(spec)))]
pub async fn reconcile_resource<R>(
    resource: &R,
    spec: &KvmClusterSpec,
) -> Result<KindReport, ReconcileError>
where
    R: Resource + ?Sized,
{
    let current = resource.current_state(spec).await?;
    let desired = resource.desired_state(spec)?;
    debug!(
        current = current.len(),
        desired = desired.len(),
        "Computed resource state"
    );

    let create = resource.new_create_patch(&current, &desired);
    let created = resource.apply_create_change(spec, &create).await?;

    let update = resource.new_update_patch(&current, &desired);
    let updated = resource.apply_update_change(spec, &update).await?;

    let delete = resource.new_delete_patch(&current, &desired);
    let deleted = resource.apply_delete_change(spec, &delete).await?;

    Ok(KindReport {
        kind: resource.kind(),
        created,
        updated,
        deleted,
    })
}
