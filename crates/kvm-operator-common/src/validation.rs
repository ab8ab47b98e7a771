use regex::Regex;
use std::sync::LazyLock;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Invalid resource name '{name}': {reason}")]
    InvalidName { name: String, reason: String },

    #[error("Invalid cluster id '{id}': {reason}")]
    InvalidClusterId { id: String, reason: String },

    #[error("Invalid hostname: {0}")]
    InvalidHostname(String),

    #[error("Unknown storage type: '{0}'")]
    UnknownStorageType(String),

    #[error("{role} node count ({nodes}) does not match capability count ({capabilities})")]
    CapabilityMismatch {
        role: String,
        nodes: usize,
        capabilities: usize,
    },

    #[error("Invalid {field} for {role} node {node}: {reason}")]
    InvalidCapability {
        role: String,
        node: String,
        field: String,
        reason: String,
    },
}

pub type ValidationResult<T> = Result<T, ValidationError>;

// RFC 1123 label: lowercase alphanumerics and hyphens, 1-63 chars, no leading/trailing hyphen
static NAME_LABEL_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9]([-a-z0-9]{0,61}[a-z0-9])?$").unwrap());

// Plain or suffixed resource quantity, e.g. "2", "0.5", "2G", "512Mi"
static QUANTITY_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[0-9]+(\.[0-9]+)?(Ki|Mi|Gi|Ti|Pi|Ei|k|K|M|G|T|P|E|m)?$").unwrap()
});

/// Validates a Kubernetes object name (RFC 1123 subdomain).
/// Rules:
/// - Total length: 1-253 characters
/// - Lowercase alphanumerics, '-' and '.'
/// - Each dot-separated label starts and ends with an alphanumeric
pub fn validate_resource_name(name: &str) -> ValidationResult<String> {
    let invalid = |reason: &str| ValidationError::InvalidName {
        name: name.to_string(),
        reason: reason.to_string(),
    };

    if name.is_empty() {
        return Err(invalid("name cannot be empty"));
    }

    if name.len() > 253 {
        return Err(invalid("name exceeds maximum length of 253 characters"));
    }

    if name.split('.').any(|label| !NAME_LABEL_REGEX.is_match(label)) {
        return Err(invalid(
            "must consist of lowercase alphanumerics, '-' or '.', and start and end with an alphanumeric",
        ));
    }

    Ok(name.to_string())
}

/// Validates a cluster id.
///
/// The id names the cluster namespace and is embedded in object names and
/// label values, so it must be a non-empty RFC 1123 label.
pub fn validate_cluster_id(id: &str) -> ValidationResult<String> {
    let invalid = |reason: &str| ValidationError::InvalidClusterId {
        id: id.to_string(),
        reason: reason.to_string(),
    };

    if id.is_empty() {
        return Err(invalid("cluster id cannot be empty"));
    }

    if !NAME_LABEL_REGEX.is_match(id) {
        return Err(invalid(
            "must be at most 63 lowercase alphanumerics or '-', starting and ending with an alphanumeric",
        ));
    }

    Ok(id.to_string())
}

/// Validates a DNS hostname (with or without domain) as accepted for
/// ingress hosts
/// Rules:
/// - Total length: 1-253 characters (RFC 1035)
/// - Labels separated by dots
/// - Each label: 1-63 chars, lowercase alphanumeric and hyphens
/// - Cannot start or end with hyphen
/// - Cannot start or end with dot
pub fn validate_hostname(hostname: &str) -> ValidationResult<String> {
    if hostname.is_empty() {
        return Err(ValidationError::InvalidHostname(
            "hostname cannot be empty".to_string(),
        ));
    }

    // RFC 1035: Maximum hostname length is 253 characters
    if hostname.len() > 253 {
        return Err(ValidationError::InvalidHostname(
            "hostname exceeds maximum length of 253 characters".to_string(),
        ));
    }

    if hostname.starts_with('.') || hostname.ends_with('.') {
        return Err(ValidationError::InvalidHostname(
            "hostname cannot start or end with dot".to_string(),
        ));
    }

    for label in hostname.split('.') {
        if !NAME_LABEL_REGEX.is_match(label) {
            return Err(ValidationError::InvalidHostname(format!(
                "invalid label '{}' in hostname",
                label
            )));
        }
    }

    Ok(hostname.to_string())
}

/// Validates a resource quantity string such as a memory size
pub fn validate_quantity(quantity: &str) -> bool {
    QUANTITY_REGEX.is_match(quantity)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_resource_names() {
        assert!(validate_resource_name("master").is_ok());
        assert!(validate_resource_name("worker-abc12-node1").is_ok());
        assert!(validate_resource_name("abc12-worker-data-0").is_ok());
        assert!(validate_resource_name("config.v1").is_ok());
    }

    #[test]
    fn test_invalid_resource_names() {
        assert!(validate_resource_name("").is_err());
        assert!(validate_resource_name("Worker").is_err()); // uppercase not allowed
        assert!(validate_resource_name("-worker").is_err());
        assert!(validate_resource_name("worker-").is_err());
        assert!(validate_resource_name("worker_1").is_err());
        assert!(validate_resource_name("a..b").is_err());
        assert!(validate_resource_name(&"a".repeat(254)).is_err());
    }

    #[test]
    fn test_invalid_resource_name_reports_name() {
        let err = validate_resource_name("Bad_Name").unwrap_err();
        match err {
            ValidationError::InvalidName { name, .. } => assert_eq!(name, "Bad_Name"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_valid_hostnames() {
        assert!(validate_hostname("localhost").is_ok());
        assert!(validate_hostname("api.abc12.k8s.example.com").is_ok());
        assert!(validate_hostname("etcd.abc12.k8s.example.com").is_ok());
    }

    #[test]
    fn test_invalid_hostnames() {
        assert!(validate_hostname("").is_err());
        assert!(validate_hostname("-invalid").is_err());
        assert!(validate_hostname("in..valid").is_err());
        assert!(validate_hostname("invalid_host").is_err());
        assert!(validate_hostname(".invalid").is_err());
        assert!(validate_hostname("invalid.").is_err());
        assert!(validate_hostname("API.Abc12.Example.com").is_err()); // uppercase not allowed
    }

    #[test]
    fn test_valid_cluster_ids() {
        assert!(validate_cluster_id("abc12").is_ok());
        assert!(validate_cluster_id("a").is_ok());
        assert!(validate_cluster_id(&"a".repeat(63)).is_ok());
    }

    #[test]
    fn test_invalid_cluster_ids() {
        assert!(validate_cluster_id("").is_err());
        assert!(validate_cluster_id("Bad_ID").is_err());
        assert!(validate_cluster_id("ABC12").is_err());
        assert!(validate_cluster_id("abc.12").is_err());
        assert!(validate_cluster_id("-abc12").is_err());
        assert!(validate_cluster_id(&"a".repeat(64)).is_err());
    }

    #[test]
    fn test_invalid_cluster_id_reports_id() {
        match validate_cluster_id("Bad_ID").unwrap_err() {
            ValidationError::InvalidClusterId { id, .. } => assert_eq!(id, "Bad_ID"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_quantities() {
        assert!(validate_quantity("2G"));
        assert!(validate_quantity("512Mi"));
        assert!(validate_quantity("1.5Gi"));
        assert!(validate_quantity("4"));
        assert!(!validate_quantity(""));
        assert!(!validate_quantity("lots"));
        assert!(!validate_quantity("2 G"));
    }

    #[test]
    fn test_capability_mismatch_display() {
        let err = ValidationError::CapabilityMismatch {
            role: "worker".to_string(),
            nodes: 3,
            capabilities: 2,
        };
        assert_eq!(
            err.to_string(),
            "worker node count (3) does not match capability count (2)"
        );
    }
}
