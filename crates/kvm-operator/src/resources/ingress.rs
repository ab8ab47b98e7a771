//! Ingress rules exposing the cluster's API and etcd domains through the
//! master service

use k8s_openapi::api::networking::v1::{
    HTTPIngressPath, HTTPIngressRuleValue, Ingress, IngressBackend, IngressRule,
    IngressServiceBackend, IngressSpec, ServiceBackendPort,
};
use kube::api::ObjectMeta;
use kvm_operator_common::key::{self, NodeRole};
use kvm_operator_common::{validate_hostname, KvmClusterSpec, ValidationResult};

use super::service::MASTER_API_PORT;
use super::{same_name, DesiredState};
use crate::framework::ResourceKind;

pub const ETCD_PORT: i32 = 2379;

pub struct IngressGenerator;

impl DesiredState for IngressGenerator {
    type Object = Ingress;

    const KIND: ResourceKind = ResourceKind::Ingress;

    fn build(&self, spec: &KvmClusterSpec) -> ValidationResult<Vec<Ingress>> {
        let endpoints = [
            ("api", &spec.cluster.api_domain, MASTER_API_PORT),
            ("etcd", &spec.cluster.etcd_domain, ETCD_PORT),
        ];

        let mut ingresses = Vec::new();
        for (name, domain, port) in endpoints {
            // No public domain, no rule
            if domain.is_empty() {
                continue;
            }
            ingresses.push(ingress(spec, name, validate_hostname(domain)?, port));
        }
        Ok(ingresses)
    }

    fn is_same(current: &Ingress, desired: &Ingress) -> bool {
        same_name(current, desired)
    }
}

fn ingress(spec: &KvmClusterSpec, name: &str, host: String, port: i32) -> Ingress {
    let backend = IngressBackend {
        service: Some(IngressServiceBackend {
            name: NodeRole::Master.to_string(),
            port: Some(ServiceBackendPort {
                number: Some(port),
                ..Default::default()
            }),
        }),
        ..Default::default()
    };

    Ingress {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(key::cluster_namespace(spec)),
            labels: Some(key::role_labels(spec, NodeRole::Master)),
            ..Default::default()
        },
        spec: Some(IngressSpec {
            rules: Some(vec![IngressRule {
                host: Some(host),
                http: Some(HTTPIngressRuleValue {
                    paths: vec![HTTPIngressPath {
                        path: Some("/".to_string()),
                        path_type: "Prefix".to_string(),
                        backend,
                    }],
                }),
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}
