//! Network front-ends for the master API and worker ingress traffic.
//!
//! Neither service has a selector: endpoints are pointed at the virtual
//! machines by the endpoint updater running next to each of them.

use k8s_openapi::api::core::v1::{Service, ServicePort, ServiceSpec};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::api::ObjectMeta;
use kvm_operator_common::key::{self, NodeRole};
use kvm_operator_common::{KvmClusterSpec, ValidationResult};

use super::{same_name, DesiredState};
use crate::framework::ResourceKind;

pub const MASTER_API_PORT: i32 = 443;
pub const WORKER_HTTP_PORT: i32 = 30010;
pub const WORKER_HTTPS_PORT: i32 = 30011;

pub struct ServiceGenerator;

impl DesiredState for ServiceGenerator {
    type Object = Service;

    const KIND: ResourceKind = ResourceKind::Service;

    fn build(&self, spec: &KvmClusterSpec) -> ValidationResult<Vec<Service>> {
        Ok(vec![
            service(
                spec,
                NodeRole::Master,
                "ClusterIP",
                vec![tcp_port("https", MASTER_API_PORT)],
            ),
            service(
                spec,
                NodeRole::Worker,
                "LoadBalancer",
                vec![
                    tcp_port("http", WORKER_HTTP_PORT),
                    tcp_port("https", WORKER_HTTPS_PORT),
                ],
            ),
        ])
    }

    fn is_same(current: &Service, desired: &Service) -> bool {
        same_name(current, desired)
    }
}

fn tcp_port(name: &str, port: i32) -> ServicePort {
    ServicePort {
        name: Some(name.to_string()),
        port,
        protocol: Some("TCP".to_string()),
        target_port: Some(IntOrString::Int(port)),
        ..Default::default()
    }
}

fn service(
    spec: &KvmClusterSpec,
    role: NodeRole,
    type_: &str,
    ports: Vec<ServicePort>,
) -> Service {
    Service {
        metadata: ObjectMeta {
            name: Some(role.to_string()),
            namespace: Some(key::cluster_namespace(spec)),
            labels: Some(key::role_labels(spec, role)),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            type_: Some(type_.to_string()),
            ports: Some(ports),
            ..Default::default()
        }),
        ..Default::default()
    }
}
