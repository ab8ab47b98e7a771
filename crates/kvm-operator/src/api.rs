//! Orchestration API seam
//!
//! Reconciliation talks to the cluster only through [`ObjectApi`], so tests
//! can swap the live API server for an in-memory fake.

use std::fmt::Debug;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, PersistentVolumeClaim, Service};
use k8s_openapi::api::networking::v1::Ingress;
use k8s_openapi::NamespaceResourceScope;
use kube::api::{Api, DeleteParams, ListParams, PostParams};
use kube::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, instrument};

/// Namespaced list/create/replace/delete for one object type
#[async_trait]
pub trait ObjectApi<K>: Send + Sync {
    /// List objects in `namespace` matching the label selector.
    async fn list(&self, namespace: &str, selector: &str) -> Result<Vec<K>, kube::Error>;

    async fn create(&self, namespace: &str, object: &K) -> Result<(), kube::Error>;

    /// Replace an object; `object` must carry the observed resourceVersion.
    async fn replace(&self, namespace: &str, name: &str, object: &K) -> Result<(), kube::Error>;

    async fn delete(&self, namespace: &str, name: &str) -> Result<(), kube::Error>;
}

/// [`ObjectApi`] backed by the Kubernetes API server
pub struct KubeObjectApi<K> {
    client: Client,
    _kind: PhantomData<fn() -> K>,
}

impl<K> KubeObjectApi<K> {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            _kind: PhantomData,
        }
    }
}

impl<K> KubeObjectApi<K>
where
    K: kube::Resource<Scope = NamespaceResourceScope, DynamicType = ()>,
{
    fn api(&self, namespace: &str) -> Api<K> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait]
impl<K> ObjectApi<K> for KubeObjectApi<K>
where
    K: kube::Resource<Scope = NamespaceResourceScope, DynamicType = ()>
        + Clone
        + Debug
        + Serialize
        + DeserializeOwned
        + Send
        + Sync
        + 'static,
{
    #[instrument(skip(self), fields(kind = %K::kind(&())))]
    async fn list(&self, namespace: &str, selector: &str) -> Result<Vec<K>, kube::Error> {
        let lp = ListParams::default().labels(selector);
        let list = self.api(namespace).list(&lp).await?;
        debug!(count = list.items.len(), "Listed objects");
        Ok(list.items)
    }

    #[instrument(skip(self, object), fields(kind = %K::kind(&())))]
    async fn create(&self, namespace: &str, object: &K) -> Result<(), kube::Error> {
        self.api(namespace)
            .create(&PostParams::default(), object)
            .await?;
        Ok(())
    }

    #[instrument(skip(self, object), fields(kind = %K::kind(&())))]
    async fn replace(&self, namespace: &str, name: &str, object: &K) -> Result<(), kube::Error> {
        self.api(namespace)
            .replace(name, &PostParams::default(), object)
            .await?;
        Ok(())
    }

    #[instrument(skip(self), fields(kind = %K::kind(&())))]
    async fn delete(&self, namespace: &str, name: &str) -> Result<(), kube::Error> {
        self.api(namespace)
            .delete(name, &DeleteParams::default())
            .await?;
        Ok(())
    }
}

/// One API handle per managed kind
#[derive(Clone)]
pub struct ObjectApis {
    pub config_maps: Arc<dyn ObjectApi<ConfigMap>>,
    pub deployments: Arc<dyn ObjectApi<Deployment>>,
    pub persistent_volume_claims: Arc<dyn ObjectApi<PersistentVolumeClaim>>,
    pub services: Arc<dyn ObjectApi<Service>>,
    pub ingresses: Arc<dyn ObjectApi<Ingress>>,
}

impl ObjectApis {
    pub fn from_client(client: &Client) -> Self {
        Self {
            config_maps: Arc::new(KubeObjectApi::new(client.clone())),
            deployments: Arc::new(KubeObjectApi::new(client.clone())),
            persistent_volume_claims: Arc::new(KubeObjectApi::new(client.clone())),
            services: Arc::new(KubeObjectApi::new(client.clone())),
            ingresses: Arc::new(KubeObjectApi::new(client.clone())),
        }
    }
}

/// Reachability check used by the readiness endpoint
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ApiProbe: Send + Sync {
    async fn check(&self) -> Result<(), kube::Error>;
}

#[async_trait]
impl ApiProbe for Client {
    async fn check(&self) -> Result<(), kube::Error> {
        self.apiserver_version().await.map(|_| ())
    }
}
