//! Error taxonomy of a reconciliation pass
//!
//! Every API failure goes through [`classify`], the single place deciding
//! whether an error means "already done" ([`ErrorClass::Idempotent`]),
//! "try again on the next pass" ([`ErrorClass::Transient`]) or "needs
//! intervention" ([`ErrorClass::Fatal`]).

use std::fmt;

use kvm_operator_common::ValidationError;
use thiserror::Error;

use crate::framework::ResourceKind;

/// Orchestration API call
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operation {
    Observe,
    Create,
    Replace,
    Delete,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Observe => "observe",
            Operation::Create => "create",
            Operation::Replace => "replace",
            Operation::Delete => "delete",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorClass {
    /// The desired end state already holds
    Idempotent,
    /// Likely to succeed on a later pass
    Transient,
    Fatal,
}

/// Classify an API error for the operation that produced it
pub fn classify(operation: Operation, error: &kube::Error) -> ErrorClass {
    match error {
        kube::Error::Api(response) => match (operation, response.code) {
            (Operation::Create, 409) => ErrorClass::Idempotent,
            (Operation::Delete, 404) => ErrorClass::Idempotent,
            // Object changed or vanished between observe and replace
            (Operation::Replace, 404 | 409) => ErrorClass::Transient,
            (_, 429) => ErrorClass::Transient,
            (_, code) if code >= 500 => ErrorClass::Transient,
            _ => ErrorClass::Fatal,
        },
        kube::Error::HyperError(_) | kube::Error::Service(_) => ErrorClass::Transient,
        _ => ErrorClass::Fatal,
    }
}

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("failed to observe {kind} in namespace {namespace}: {source}")]
    Observation {
        kind: ResourceKind,
        namespace: String,
        #[source]
        source: kube::Error,
    },

    #[error("invalid cluster spec for {kind}: {source}")]
    SpecValidation {
        kind: ResourceKind,
        #[source]
        source: ValidationError,
    },

    #[error("failed to {operation} {kind} {namespace}/{name}: {source}")]
    Apply {
        operation: Operation,
        kind: ResourceKind,
        namespace: String,
        name: String,
        class: ErrorClass,
        #[source]
        source: kube::Error,
    },

    #[error("reconciliation failed in namespace {namespace}: {}", describe(.failures))]
    Pass {
        namespace: String,
        failures: Vec<ReconcileError>,
    },
}

fn describe(failures: &[ReconcileError]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl ReconcileError {
    /// Kind the error belongs to, if it is scoped to one
    pub fn kind(&self) -> Option<ResourceKind> {
        match self {
            ReconcileError::Observation { kind, .. }
            | ReconcileError::SpecValidation { kind, .. }
            | ReconcileError::Apply { kind, .. } => Some(*kind),
            ReconcileError::Pass { .. } => None,
        }
    }

    /// Whether a later pass can succeed without the spec changing
    pub fn is_transient(&self) -> bool {
        match self {
            ReconcileError::Observation { source, .. } => {
                classify(Operation::Observe, source) == ErrorClass::Transient
            }
            ReconcileError::SpecValidation { .. } => false,
            ReconcileError::Apply { class, .. } => *class == ErrorClass::Transient,
            ReconcileError::Pass { failures, .. } => failures.iter().any(Self::is_transient),
        }
    }
}
