//! Kind-agnostic reconciliation framework
//!
//! Every managed kind implements [`Resource`]: observe the current state,
//! derive the desired state, compute patches with the [`diff`] engine and
//! apply them. Implementations hold no state between invocations.

pub mod diff;

use std::fmt;

use async_trait::async_trait;
use kvm_operator_common::KvmClusterSpec;

use crate::error::{Operation, ReconcileError};

/// The closed set of kinds the operator manages
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceKind {
    ConfigMap,
    Deployment,
    PersistentVolumeClaim,
    Service,
    Ingress,
}

impl ResourceKind {
    /// Metric and log label
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::ConfigMap => "configmap",
            ResourceKind::Deployment => "deployment",
            ResourceKind::PersistentVolumeClaim => "persistentvolumeclaim",
            ResourceKind::Service => "service",
            ResourceKind::Ingress => "ingress",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mutation applied to a single item
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChangeAction {
    Created,
    Updated,
    Deleted,
}

impl ChangeAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeAction::Created => "created",
            ChangeAction::Updated => "updated",
            ChangeAction::Deleted => "deleted",
        }
    }

    /// API call carrying out the action
    pub fn operation(&self) -> Operation {
        match self {
            ChangeAction::Created => Operation::Create,
            ChangeAction::Updated => Operation::Replace,
            ChangeAction::Deleted => Operation::Delete,
        }
    }
}

impl fmt::Display for ChangeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Items to create, update and delete for one kind.
///
/// The three sets are disjoint. A patch lives for a single pass and is
/// dropped once applied.
#[derive(Clone, Debug, PartialEq)]
pub struct Patch<T> {
    pub kind: ResourceKind,
    pub to_create: Vec<T>,
    pub to_update: Vec<T>,
    pub to_delete: Vec<T>,
}

impl<T> Patch<T> {
    pub fn new(kind: ResourceKind) -> Self {
        Self {
            kind,
            to_create: Vec::new(),
            to_update: Vec::new(),
            to_delete: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.to_create.is_empty() && self.to_update.is_empty() && self.to_delete.is_empty()
    }

    /// Items affected by `action`
    pub fn items(&self, action: ChangeAction) -> &[T] {
        match action {
            ChangeAction::Created => &self.to_create,
            ChangeAction::Updated => &self.to_update,
            ChangeAction::Deleted => &self.to_delete,
        }
    }
}

/// Capability every managed kind provides to the reconciliation driver
#[async_trait]
pub trait Resource: Send + Sync {
    type Item: Clone + Send + Sync;

    fn kind(&self) -> ResourceKind;

    /// Query the API for every item of this kind belonging to the cluster.
    async fn current_state(&self, spec: &KvmClusterSpec) -> Result<Vec<Self::Item>, ReconcileError>;

    /// Derive the target items from the spec alone.
    fn desired_state(&self, spec: &KvmClusterSpec) -> Result<Vec<Self::Item>, ReconcileError>;

    fn new_create_patch(&self, current: &[Self::Item], desired: &[Self::Item]) -> Patch<Self::Item>;

    fn new_update_patch(&self, current: &[Self::Item], desired: &[Self::Item]) -> Patch<Self::Item>;

    fn new_delete_patch(&self, current: &[Self::Item], desired: &[Self::Item]) -> Patch<Self::Item>;

    /// Returns the number of items handled.
    async fn apply_create_change(
        &self,
        spec: &KvmClusterSpec,
        patch: &Patch<Self::Item>,
    ) -> Result<usize, ReconcileError>;

    async fn apply_update_change(
        &self,
        spec: &KvmClusterSpec,
        patch: &Patch<Self::Item>,
    ) -> Result<usize, ReconcileError>;

    async fn apply_delete_change(
        &self,
        spec: &KvmClusterSpec,
        patch: &Patch<Self::Item>,
    ) -> Result<usize, ReconcileError>;
}
