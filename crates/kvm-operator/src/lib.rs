//! kvm-operator: keeps the Kubernetes objects backing a virtualized workload
//! cluster in line with its `KvmCluster` resource.

pub mod api;
pub mod config;
pub mod controllers;
pub mod error;
pub mod framework;
pub mod health;
pub mod metrics;
pub mod reconciler;
pub mod resources;

#[cfg(test)]
pub mod test_utils;

pub use config::OperatorConfig;
pub use controllers::{DesiredObject, PassReport, Reconciler};
pub use error::{ErrorClass, ReconcileError};
pub use metrics::ReconcileMetrics;
