//! Cluster reader backed by the Kubernetes API

use super::ClusterReader;
use crate::error::{MeterError, MeterResult};
use crate::observability::MeterMetrics;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Namespace, PersistentVolumeClaim, Pod, ResourceQuota};
use k8s_openapi::api::networking::v1::Ingress;
use k8s_openapi::api::storage::v1::StorageClass;
use kube::{
    api::{Api, ListParams},
    Client,
};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default bound on a single cluster API call
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Reads tenant objects through a `kube` client
#[derive(Clone)]
pub struct KubeClusterReader {
    client: Client,
    request_timeout: Duration,
}

impl KubeClusterReader {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Connect with in-cluster configuration or the local kubeconfig
    pub async fn try_default() -> MeterResult<Self> {
        let client = Client::try_default()
            .await
            .map_err(|e| MeterError::cluster_read("client configuration", e))?;
        info!("Kubernetes API client initialized");
        Ok(Self::new(client))
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Run one API call under the request timeout, mapping 404 to `None`
    async fn call<T, F>(&self, resource: &str, fut: F) -> MeterResult<Option<T>>
    where
        F: Future<Output = Result<T, kube::Error>>,
    {
        match tokio::time::timeout(self.request_timeout, fut).await {
            Ok(Ok(value)) => Ok(Some(value)),
            Ok(Err(e)) if is_not_found(&e) => {
                debug!(resource = %resource, "Cluster object not found, treating as empty");
                Ok(None)
            }
            Ok(Err(e)) => {
                warn!(resource = %resource, error = %e, "Cluster read failed");
                MeterMetrics::new().inc_cluster_read_errors();
                Err(MeterError::cluster_read(resource, e))
            }
            Err(_) => {
                warn!(
                    resource = %resource,
                    timeout_secs = self.request_timeout.as_secs(),
                    "Cluster read timed out"
                );
                MeterMetrics::new().inc_cluster_read_errors();
                Err(MeterError::cluster_read(
                    resource,
                    format!("timed out after {:?}", self.request_timeout),
                ))
            }
        }
    }

    async fn list_in<K>(&self, resource: &str, api: Api<K>, params: ListParams) -> MeterResult<Vec<K>>
    where
        K: kube::Resource + Clone + serde::de::DeserializeOwned + std::fmt::Debug,
    {
        let list = self.call(resource, async move { api.list(&params).await }).await?;
        Ok(list.map(|l| l.items).unwrap_or_default())
    }
}

fn is_not_found(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(response) if response.code == 404)
}

#[async_trait]
impl ClusterReader for KubeClusterReader {
    async fn list_namespaces(&self, label_selector: &str) -> MeterResult<Vec<Namespace>> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        let params = ListParams::default().labels(label_selector);
        self.list_in("namespaces", api, params).await
    }

    async fn list_pods(&self, namespace: &str) -> MeterResult<Vec<Pod>> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        self.list_in("pods", api, ListParams::default()).await
    }

    async fn list_pvcs(&self, namespace: &str) -> MeterResult<Vec<PersistentVolumeClaim>> {
        let api: Api<PersistentVolumeClaim> = Api::namespaced(self.client.clone(), namespace);
        self.list_in("persistentvolumeclaims", api, ListParams::default())
            .await
    }

    async fn list_ingresses(&self, namespace: &str) -> MeterResult<Vec<Ingress>> {
        let api: Api<Ingress> = Api::namespaced(self.client.clone(), namespace);
        self.list_in("ingresses", api, ListParams::default()).await
    }

    async fn get_resource_quota(
        &self,
        namespace: &str,
        name: &str,
    ) -> MeterResult<Option<ResourceQuota>> {
        let api: Api<ResourceQuota> = Api::namespaced(self.client.clone(), namespace);
        self.call("resourcequotas", async move { api.get(name).await })
            .await
    }

    async fn list_storage_classes(&self) -> MeterResult<Vec<StorageClass>> {
        let api: Api<StorageClass> = Api::all(self.client.clone());
        self.list_in("storageclasses", api, ListParams::default())
            .await
    }
}
