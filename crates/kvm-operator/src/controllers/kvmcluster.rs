//! KvmCluster controller
//!
//! Watches cluster-scoped `KvmCluster` resources and runs one reconciliation
//! pass per event or resync. Failed passes are requeued according to
//! [`retry`](super::retry).

use std::sync::Arc;

use futures::StreamExt;
use kube::runtime::controller::Action;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::Controller;
use kube::{Api, Client, ResourceExt};
use kvm_operator_common::KvmCluster;
use tracing::{error, info, instrument, warn};

use crate::error::ReconcileError;

use super::retry::{compute_backoff, ErrorKind};
use super::ControllerContext;

/// Reconcile a single KvmCluster
#[instrument(skip(cluster, ctx), fields(cluster = %cluster.name_any()))]
pub(crate) async fn reconcile(
    cluster: Arc<KvmCluster>,
    ctx: Arc<ControllerContext>,
) -> Result<Action, ReconcileError> {
    ctx.reconciler.reconcile_cluster(&cluster.spec).await?;

    ctx.retry_tracker.reset(&cluster.name_any());

    Ok(Action::requeue(ctx.resync))
}

/// Classify error type for retry behavior
pub(crate) fn classify_error(error: &ReconcileError) -> ErrorKind {
    if error.is_transient() {
        ErrorKind::Transient
    } else {
        ErrorKind::Permanent
    }
}

/// Error policy for the controller with exponential backoff
fn error_policy(
    cluster: Arc<KvmCluster>,
    error: &ReconcileError,
    ctx: Arc<ControllerContext>,
) -> Action {
    let kind = classify_error(error);
    let attempt = ctx.retry_tracker.increment(&cluster.name_any());

    // The pass already logged the failure itself
    warn!(
        cluster = %cluster.name_any(),
        attempt = attempt,
        error_kind = ?kind,
        "Scheduling next reconciliation after failure"
    );

    compute_backoff(attempt, kind)
}

/// Run the KvmCluster controller.
///
/// Signal handling belongs to the caller; this only returns if the watch
/// stream ends.
pub async fn run(client: Client, ctx: Arc<ControllerContext>) {
    let clusters: Api<KvmCluster> = Api::all(client);

    info!("Starting KvmCluster controller");

    Controller::new(clusters, WatcherConfig::default())
        .run(reconcile, error_policy, ctx)
        .for_each(|result| async move {
            if let Err(e) = result {
                error!(error = ?e, "KvmCluster controller stream error");
            }
        })
        .await;
}
