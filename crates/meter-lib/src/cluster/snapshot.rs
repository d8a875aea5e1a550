//! In-memory cluster snapshot
//!
//! Serves a fixed set of objects through [`ClusterReader`]. Used to meter
//! exported cluster state offline and as the cluster double in tests.

use super::ClusterReader;
use crate::error::{MeterError, MeterResult};
use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use k8s_openapi::api::core::v1::{Namespace, PersistentVolumeClaim, Pod, ResourceQuota};
use k8s_openapi::api::networking::v1::Ingress;
use k8s_openapi::api::storage::v1::StorageClass;
use std::collections::BTreeMap;
use std::sync::RwLock;

#[derive(Debug, Clone, Default)]
struct NamespaceObjects {
    pods: Vec<Pod>,
    pvcs: Vec<PersistentVolumeClaim>,
    ingresses: Vec<Ingress>,
    quotas: Vec<ResourceQuota>,
}

/// A static set of cluster objects keyed by namespace
#[derive(Debug, Default)]
pub struct StaticCluster {
    namespaces: DashMap<String, Namespace>,
    objects: DashMap<String, NamespaceObjects>,
    storage_classes: RwLock<Vec<StorageClass>>,
    failing: DashSet<String>,
}

impl StaticCluster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_namespace(&self, namespace: Namespace) {
        if let Some(name) = namespace.metadata.name.clone() {
            self.namespaces.insert(name, namespace);
        }
    }

    pub fn add_pod(&self, pod: Pod) {
        let ns = pod.metadata.namespace.clone().unwrap_or_default();
        self.objects.entry(ns).or_default().pods.push(pod);
    }

    pub fn add_pvc(&self, pvc: PersistentVolumeClaim) {
        let ns = pvc.metadata.namespace.clone().unwrap_or_default();
        self.objects.entry(ns).or_default().pvcs.push(pvc);
    }

    pub fn add_ingress(&self, ingress: Ingress) {
        let ns = ingress.metadata.namespace.clone().unwrap_or_default();
        self.objects.entry(ns).or_default().ingresses.push(ingress);
    }

    pub fn add_resource_quota(&self, quota: ResourceQuota) {
        let ns = quota.metadata.namespace.clone().unwrap_or_default();
        self.objects.entry(ns).or_default().quotas.push(quota);
    }

    pub fn add_storage_class(&self, class: StorageClass) {
        if let Ok(mut classes) = self.storage_classes.write() {
            classes.push(class);
        }
    }

    /// Make every read of `resource` (e.g. `"pods"`) fail
    pub fn fail_reads_of(&self, resource: &str) {
        self.failing.insert(resource.to_string());
    }

    fn check(&self, resource: &str) -> MeterResult<()> {
        if self.failing.contains(resource) {
            return Err(MeterError::cluster_read(resource, "injected failure"));
        }
        Ok(())
    }

    fn in_namespace<T>(
        &self,
        namespace: &str,
        pick: impl Fn(&NamespaceObjects) -> Vec<T>,
    ) -> Vec<T> {
        self.objects
            .get(namespace)
            .map(|o| pick(o.value()))
            .unwrap_or_default()
    }
}

/// Match equality (`key=value`) and existence (`key`) selectors, comma separated
fn matches_selector(labels: Option<&BTreeMap<String, String>>, selector: &str) -> bool {
    selector
        .split(',')
        .map(str::trim)
        .filter(|term| !term.is_empty())
        .all(|term| {
            let Some(labels) = labels else {
                return false;
            };
            match term.split_once('=') {
                Some((key, value)) => labels.get(key.trim()).is_some_and(|v| v == value.trim()),
                None => labels.contains_key(term),
            }
        })
}

#[async_trait]
impl ClusterReader for StaticCluster {
    async fn list_namespaces(&self, label_selector: &str) -> MeterResult<Vec<Namespace>> {
        self.check("namespaces")?;
        let mut matching: Vec<Namespace> = self
            .namespaces
            .iter()
            .filter(|ns| matches_selector(ns.metadata.labels.as_ref(), label_selector))
            .map(|ns| ns.value().clone())
            .collect();
        matching.sort_by(|a, b| a.metadata.name.cmp(&b.metadata.name));
        Ok(matching)
    }

    async fn list_pods(&self, namespace: &str) -> MeterResult<Vec<Pod>> {
        self.check("pods")?;
        Ok(self.in_namespace(namespace, |o| o.pods.clone()))
    }

    async fn list_pvcs(&self, namespace: &str) -> MeterResult<Vec<PersistentVolumeClaim>> {
        self.check("persistentvolumeclaims")?;
        Ok(self.in_namespace(namespace, |o| o.pvcs.clone()))
    }

    async fn list_ingresses(&self, namespace: &str) -> MeterResult<Vec<Ingress>> {
        self.check("ingresses")?;
        Ok(self.in_namespace(namespace, |o| o.ingresses.clone()))
    }

    async fn get_resource_quota(
        &self,
        namespace: &str,
        name: &str,
    ) -> MeterResult<Option<ResourceQuota>> {
        self.check("resourcequotas")?;
        Ok(self
            .in_namespace(namespace, |o| o.quotas.clone())
            .into_iter()
            .find(|q| q.metadata.name.as_deref() == Some(name)))
    }

    async fn list_storage_classes(&self) -> MeterResult<Vec<StorageClass>> {
        self.check("storageclasses")?;
        self.storage_classes
            .read()
            .map(|classes| classes.clone())
            .map_err(|_| MeterError::cluster_read("storageclasses", "snapshot lock poisoned"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_selector_matching() {
        let l = labels(&[("natron.io/tenant", "acme"), ("env", "prod")]);
        assert!(matches_selector(Some(&l), "natron.io/tenant=acme"));
        assert!(matches_selector(Some(&l), "natron.io/tenant"));
        assert!(matches_selector(Some(&l), "natron.io/tenant=acme,env=prod"));
        assert!(!matches_selector(Some(&l), "natron.io/tenant=globex"));
        assert!(!matches_selector(None, "natron.io/tenant"));
        assert!(matches_selector(None, ""));
    }

    #[tokio::test]
    async fn test_injected_failure() {
        let cluster = StaticCluster::new();
        cluster.fail_reads_of("pods");
        assert!(cluster.list_pods("acme").await.is_err());
        assert!(cluster.list_pvcs("acme").await.unwrap().is_empty());
    }
}
