//! Test utilities for kvm-operator tests.
//!
//! Provides an in-memory orchestration API with failure injection and
//! common cluster spec fixtures.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, PersistentVolumeClaim, Service};
use k8s_openapi::api::networking::v1::Ingress;
use kube::{Resource, ResourceExt};
use kvm_operator_common::{
    ClusterInfo, KvmClusterSpec, KvmSettings, Node, NodeCapabilities, VersionBundle,
};
use serde_json::json;

use crate::api::{ObjectApi, ObjectApis};

/// Builds a `kube::Error::Api` with the given HTTP status code and reason.
pub fn api_error(code: u16, reason: &str) -> kube::Error {
    let response = serde_json::from_value(json!({
        "status": "Failure",
        "message": format!("simulated {reason}"),
        "reason": reason,
        "code": code,
    }))
    .expect("valid error response");
    kube::Error::Api(response)
}

#[derive(Default)]
struct Failures {
    list: Option<u16>,
    create: Option<u16>,
    replace: Option<u16>,
    delete: Option<u16>,
}

/// In-memory [`ObjectApi`] keyed by namespace and name.
///
/// Mirrors the API server's existence semantics: creating an existing
/// object is a 409, deleting or replacing a missing one a 404, and a
/// replace carrying a stale resourceVersion a 409.
pub struct FakeObjectApi<K> {
    objects: Mutex<BTreeMap<(String, String), K>>,
    failures: Mutex<Failures>,
    next_version: AtomicUsize,
    lists: AtomicUsize,
    creates: AtomicUsize,
    replaces: AtomicUsize,
    deletes: AtomicUsize,
}

impl<K> Default for FakeObjectApi<K> {
    fn default() -> Self {
        Self {
            objects: Mutex::new(BTreeMap::new()),
            failures: Mutex::new(Failures::default()),
            next_version: AtomicUsize::new(1),
            lists: AtomicUsize::new(0),
            creates: AtomicUsize::new(0),
            replaces: AtomicUsize::new(0),
            deletes: AtomicUsize::new(0),
        }
    }
}

impl<K> FakeObjectApi<K>
where
    K: Resource + Clone + Send + Sync,
{
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Store an object as if it had been created earlier.
    pub fn seed(&self, namespace: &str, mut object: K) {
        object.meta_mut().resource_version = Some(self.bump_version());
        self.objects
            .lock()
            .unwrap()
            .insert((namespace.to_string(), object.name_any()), object);
    }

    pub fn get(&self, namespace: &str, name: &str) -> Option<K> {
        self.objects
            .lock()
            .unwrap()
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    /// Sorted names of the objects stored in `namespace`.
    pub fn names(&self, namespace: &str) -> Vec<String> {
        self.objects
            .lock()
            .unwrap()
            .keys()
            .filter(|(ns, _)| ns == namespace)
            .map(|(_, name)| name.clone())
            .collect()
    }

    pub fn fail_list(&self, code: u16) {
        self.failures.lock().unwrap().list = Some(code);
    }

    pub fn fail_create(&self, code: u16) {
        self.failures.lock().unwrap().create = Some(code);
    }

    pub fn fail_replace(&self, code: u16) {
        self.failures.lock().unwrap().replace = Some(code);
    }

    pub fn fail_delete(&self, code: u16) {
        self.failures.lock().unwrap().delete = Some(code);
    }

    pub fn lists(&self) -> usize {
        self.lists.load(Ordering::SeqCst)
    }

    pub fn creates(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }

    pub fn replaces(&self) -> usize {
        self.replaces.load(Ordering::SeqCst)
    }

    pub fn deletes(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }

    fn bump_version(&self) -> String {
        self.next_version.fetch_add(1, Ordering::SeqCst).to_string()
    }

    fn injected(&self, pick: impl Fn(&Failures) -> Option<u16>) -> Result<(), kube::Error> {
        let failures = self.failures.lock().unwrap();
        match pick(&*failures) {
            Some(code) => Err(api_error(code, "Injected")),
            None => Ok(()),
        }
    }
}

fn matches_selector(labels: &BTreeMap<String, String>, selector: &str) -> bool {
    selector
        .split(',')
        .filter(|term| !term.is_empty())
        .all(|term| match term.split_once('=') {
            Some((key, value)) => labels.get(key).map(String::as_str) == Some(value),
            None => labels.contains_key(term),
        })
}

#[async_trait]
impl<K> ObjectApi<K> for FakeObjectApi<K>
where
    K: Resource + Clone + Send + Sync,
{
    async fn list(&self, namespace: &str, selector: &str) -> Result<Vec<K>, kube::Error> {
        self.lists.fetch_add(1, Ordering::SeqCst);
        self.injected(|f| f.list)?;
        Ok(self
            .objects
            .lock()
            .unwrap()
            .iter()
            .filter(|((ns, _), object)| {
                ns == namespace && matches_selector(object.labels(), selector)
            })
            .map(|(_, object)| object.clone())
            .collect())
    }

    async fn create(&self, namespace: &str, object: &K) -> Result<(), kube::Error> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        self.injected(|f| f.create)?;
        let key = (namespace.to_string(), object.name_any());
        if self.objects.lock().unwrap().contains_key(&key) {
            return Err(api_error(409, "AlreadyExists"));
        }
        let mut stored = object.clone();
        stored.meta_mut().resource_version = Some(self.bump_version());
        self.objects.lock().unwrap().insert(key, stored);
        Ok(())
    }

    async fn replace(&self, namespace: &str, name: &str, object: &K) -> Result<(), kube::Error> {
        self.replaces.fetch_add(1, Ordering::SeqCst);
        self.injected(|f| f.replace)?;
        let key = (namespace.to_string(), name.to_string());
        let mut objects = self.objects.lock().unwrap();
        let Some(existing) = objects.get(&key) else {
            return Err(api_error(404, "NotFound"));
        };
        if existing.meta().resource_version != object.meta().resource_version {
            return Err(api_error(409, "Conflict"));
        }
        let mut stored = object.clone();
        stored.meta_mut().resource_version = Some(self.bump_version());
        objects.insert(key, stored);
        Ok(())
    }

    async fn delete(&self, namespace: &str, name: &str) -> Result<(), kube::Error> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        self.injected(|f| f.delete)?;
        match self
            .objects
            .lock()
            .unwrap()
            .remove(&(namespace.to_string(), name.to_string()))
        {
            Some(_) => Ok(()),
            None => Err(api_error(404, "NotFound")),
        }
    }
}

/// One fake per managed kind, with typed handles kept for assertions.
#[derive(Clone)]
pub struct FakeApis {
    pub config_maps: Arc<FakeObjectApi<ConfigMap>>,
    pub deployments: Arc<FakeObjectApi<Deployment>>,
    pub persistent_volume_claims: Arc<FakeObjectApi<PersistentVolumeClaim>>,
    pub services: Arc<FakeObjectApi<Service>>,
    pub ingresses: Arc<FakeObjectApi<Ingress>>,
}

impl FakeApis {
    pub fn new() -> Self {
        Self {
            config_maps: FakeObjectApi::new(),
            deployments: FakeObjectApi::new(),
            persistent_volume_claims: FakeObjectApi::new(),
            services: FakeObjectApi::new(),
            ingresses: FakeObjectApi::new(),
        }
    }

    pub fn object_apis(&self) -> ObjectApis {
        ObjectApis {
            config_maps: self.config_maps.clone(),
            deployments: self.deployments.clone(),
            persistent_volume_claims: self.persistent_volume_claims.clone(),
            services: self.services.clone(),
            ingresses: self.ingresses.clone(),
        }
    }
}

fn capabilities() -> NodeCapabilities {
    NodeCapabilities {
        cpus: 2,
        memory: "2G".to_string(),
        disk: 20.0,
    }
}

/// Cluster spec with one master and `workers` workers.
pub fn test_spec(id: &str, workers: usize, storage_type: &str) -> KvmClusterSpec {
    KvmClusterSpec {
        cluster: ClusterInfo {
            id: id.to_string(),
            customer: "acme".to_string(),
            api_domain: format!("api.{id}.k8s.example.com"),
            etcd_domain: format!("etcd.{id}.k8s.example.com"),
        },
        masters: vec![Node {
            id: "m1".to_string(),
        }],
        workers: (1..=workers)
            .map(|i| Node {
                id: format!("w{i}"),
            })
            .collect(),
        kvm: KvmSettings {
            masters: vec![capabilities()],
            workers: (0..workers).map(|_| capabilities()).collect(),
            storage_type: storage_type.to_string(),
            k8s_kvm_image: "quay.io/kvm-operator/k8s-kvm:1.0.0".to_string(),
            endpoint_updater_image: "quay.io/kvm-operator/k8s-endpoint-updater:1.0.0".to_string(),
        },
        version_bundle: VersionBundle {
            version: "1.0.0".to_string(),
        },
    }
}
