//! Reconciliation metrics
//!
//! Constructed once at startup, registered on an explicit
//! [`prometheus::Registry`] and handed to the controller and adapters
//! through `Arc`. Prometheus collectors are internally synchronized, so
//! concurrent passes can record without extra locking.

use std::time::Duration;

use prometheus::{GaugeVec, IntCounterVec, Opts, Registry};

use crate::framework::{ChangeAction, ResourceKind};

const NAMESPACE_LABEL: &str = "namespace";
const KIND_LABEL: &str = "kind";
const ACTION_LABEL: &str = "action";

#[derive(Clone)]
pub struct ReconcileMetrics {
    reconciliation_total: IntCounterVec,
    reconciliation_milliseconds: GaugeVec,
    resource_modification_total: IntCounterVec,
    resource_modification_time: GaugeVec,
}

impl ReconcileMetrics {
    pub fn new() -> prometheus::Result<Self> {
        Ok(Self {
            reconciliation_total: IntCounterVec::new(
                Opts::new(
                    "reconciliation_total",
                    "Number of reconciliation passes attempted per namespace",
                ),
                &[NAMESPACE_LABEL],
            )?,
            reconciliation_milliseconds: GaugeVec::new(
                Opts::new(
                    "reconciliation_milliseconds",
                    "Duration of the last reconciliation pass per namespace",
                ),
                &[NAMESPACE_LABEL],
            )?,
            resource_modification_total: IntCounterVec::new(
                Opts::new(
                    "resource_modification_total",
                    "Number of resource modifications per namespace, kind and action",
                ),
                &[NAMESPACE_LABEL, KIND_LABEL, ACTION_LABEL],
            )?,
            resource_modification_time: GaugeVec::new(
                Opts::new(
                    "resource_modification_time",
                    "Duration in milliseconds of the last resource modification",
                ),
                &[NAMESPACE_LABEL, KIND_LABEL, ACTION_LABEL],
            )?,
        })
    }

    /// Register all collectors on `registry`.
    pub fn register(self, registry: &Registry) -> prometheus::Result<Self> {
        registry.register(Box::new(self.reconciliation_total.clone()))?;
        registry.register(Box::new(self.reconciliation_milliseconds.clone()))?;
        registry.register(Box::new(self.resource_modification_total.clone()))?;
        registry.register(Box::new(self.resource_modification_time.clone()))?;
        Ok(self)
    }

    /// Count one pass attempt, successful or not.
    pub fn pass_started(&self, namespace: &str) {
        self.reconciliation_total
            .with_label_values(&[namespace])
            .inc();
    }

    pub fn pass_finished(&self, namespace: &str, elapsed: Duration) {
        self.reconciliation_milliseconds
            .with_label_values(&[namespace])
            .set(as_millis(elapsed));
    }

    pub fn record_modification(
        &self,
        namespace: &str,
        kind: ResourceKind,
        action: ChangeAction,
        elapsed: Duration,
    ) {
        let labels = [namespace, kind.as_str(), action.as_str()];
        self.resource_modification_total
            .with_label_values(&labels)
            .inc();
        self.resource_modification_time
            .with_label_values(&labels)
            .set(as_millis(elapsed));
    }

    pub fn reconciliations(&self, namespace: &str) -> u64 {
        self.reconciliation_total
            .with_label_values(&[namespace])
            .get()
    }

    pub fn last_pass_millis(&self, namespace: &str) -> f64 {
        self.reconciliation_milliseconds
            .with_label_values(&[namespace])
            .get()
    }

    pub fn modifications(&self, namespace: &str, kind: ResourceKind, action: ChangeAction) -> u64 {
        self.resource_modification_total
            .with_label_values(&[namespace, kind.as_str(), action.as_str()])
            .get()
    }
}

fn as_millis(elapsed: Duration) -> f64 {
    elapsed.as_micros() as f64 / 1000.0
}
