//! Cluster resource reading
//!
//! This module provides:
//! - The [`ClusterReader`] trait over the few Kubernetes list/get calls metering needs
//! - A live implementation backed by `kube` and an in-memory [`StaticCluster`]
//! - [`ClusterInventory`], which maps tenant names to namespaces and raw objects
//!
//! Readers never report "not found": a missing namespace or quota reads as empty.

mod live;
pub mod objects;
pub mod quantity;
mod snapshot;

#[cfg(test)]
mod tests;

pub use live::KubeClusterReader;
pub use snapshot::StaticCluster;

use crate::error::MeterResult;
use crate::models::TenantQuota;
use crate::settings::MeterSettings;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Namespace, PersistentVolumeClaim, Pod, ResourceQuota};
use k8s_openapi::api::networking::v1::Ingress;
use k8s_openapi::api::storage::v1::StorageClass;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::debug;

/// Annotation marking the cluster's default storage class
pub const DEFAULT_STORAGE_CLASS_ANNOTATION: &str = "storageclass.kubernetes.io/is-default-class";

/// Quota resource name suffix for per-storage-class storage requests
pub const STORAGE_CLASS_QUOTA_SUFFIX: &str = ".storageclass.storage.k8s.io/requests.storage";

/// Separator vcluster inserts between the virtual pod name and its host suffix
pub const VCLUSTER_NAME_SEPARATOR: &str = "-x-";

/// Read-only access to the cluster objects that carry billable requests
#[async_trait]
pub trait ClusterReader: Send + Sync {
    /// List namespaces matching a label selector
    async fn list_namespaces(&self, label_selector: &str) -> MeterResult<Vec<Namespace>>;

    /// List pods in a namespace
    async fn list_pods(&self, namespace: &str) -> MeterResult<Vec<Pod>>;

    /// List persistent volume claims in a namespace
    async fn list_pvcs(&self, namespace: &str) -> MeterResult<Vec<PersistentVolumeClaim>>;

    /// List ingresses in a namespace
    async fn list_ingresses(&self, namespace: &str) -> MeterResult<Vec<Ingress>>;

    /// Get a resource quota by name, `None` if it does not exist
    async fn get_resource_quota(
        &self,
        namespace: &str,
        name: &str,
    ) -> MeterResult<Option<ResourceQuota>>;

    /// List all storage classes in the cluster
    async fn list_storage_classes(&self) -> MeterResult<Vec<StorageClass>>;
}

/// Which object kinds to fetch for a tenant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectSelection {
    pub pods: bool,
    pub pvcs: bool,
    pub ingresses: bool,
}

impl ObjectSelection {
    pub const ALL: Self = Self {
        pods: true,
        pvcs: true,
        ingresses: true,
    };
    pub const PODS: Self = Self {
        pods: true,
        pvcs: false,
        ingresses: false,
    };
    pub const PVCS: Self = Self {
        pods: false,
        pvcs: true,
        ingresses: false,
    };
    pub const INGRESSES: Self = Self {
        pods: false,
        pvcs: false,
        ingresses: true,
    };
}

/// Raw objects owned by one tenant
#[derive(Debug, Clone, Default)]
pub struct TenantObjects {
    pub tenant: String,
    pub pods: Vec<Pod>,
    pub pvcs: Vec<PersistentVolumeClaim>,
    pub ingresses: Vec<Ingress>,
}

/// Storage classes known to the cluster
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StorageClassCatalog {
    pub names: Vec<String>,
    pub default_class: Option<String>,
}

impl StorageClassCatalog {
    pub fn from_classes(classes: &[StorageClass]) -> Self {
        let mut names = Vec::with_capacity(classes.len());
        let mut default_class = None;

        for class in classes {
            let Some(name) = class.metadata.name.clone() else {
                continue;
            };
            let is_default = class
                .metadata
                .annotations
                .as_ref()
                .and_then(|a| a.get(DEFAULT_STORAGE_CLASS_ANNOTATION))
                .is_some_and(|v| v == "true");
            if is_default && default_class.is_none() {
                default_class = Some(name.clone());
            }
            names.push(name);
        }

        names.sort();
        Self {
            names,
            default_class,
        }
    }
}

/// Resolves tenants to their namespaces and reads their objects
#[derive(Clone)]
pub struct ClusterInventory {
    reader: Arc<dyn ClusterReader>,
    settings: Arc<MeterSettings>,
}

impl ClusterInventory {
    pub fn new(reader: Arc<dyn ClusterReader>, settings: Arc<MeterSettings>) -> Self {
        Self { reader, settings }
    }

    pub fn settings(&self) -> &MeterSettings {
        &self.settings
    }

    /// Namespaces labelled `<tenant_label>=<tenant>`, falling back to the
    /// namespace named after the tenant when none carry the label
    pub async fn namespaces_for(&self, tenant: &str) -> MeterResult<Vec<String>> {
        let selector = format!("{}={}", self.settings.tenant_label, tenant);
        let mut names: Vec<String> = self
            .reader
            .list_namespaces(&selector)
            .await?
            .into_iter()
            .filter_map(|ns| ns.metadata.name)
            .collect();

        if names.is_empty() {
            debug!(tenant = %tenant, "No labelled namespaces, using tenant-named namespace");
            names.push(tenant.to_string());
        }

        names.sort();
        names.dedup();
        Ok(names)
    }

    /// Read the selected object kinds for each tenant, in the given tenant order.
    /// Any read error aborts the whole call.
    pub async fn objects_for(
        &self,
        tenants: &[String],
        selection: ObjectSelection,
    ) -> MeterResult<Vec<TenantObjects>> {
        let mut result = Vec::with_capacity(tenants.len());

        for tenant in tenants {
            let namespaces = self.namespaces_for(tenant).await?;
            let mut objects = TenantObjects {
                tenant: tenant.clone(),
                ..Default::default()
            };

            for namespace in &namespaces {
                if selection.pods {
                    objects.pods.extend(self.reader.list_pods(namespace).await?);
                }
                if selection.pvcs {
                    objects.pvcs.extend(self.reader.list_pvcs(namespace).await?);
                }
                if selection.ingresses {
                    objects
                        .ingresses
                        .extend(self.reader.list_ingresses(namespace).await?);
                }
            }

            result.push(objects);
        }

        Ok(result)
    }

    /// Distinct tenant label values across all labelled namespaces, sorted
    pub async fn discover_tenants(&self) -> MeterResult<Vec<String>> {
        let namespaces = self
            .reader
            .list_namespaces(&self.settings.tenant_label)
            .await?;

        let tenants: BTreeSet<String> = namespaces
            .into_iter()
            .filter_map(|ns| {
                ns.metadata
                    .labels
                    .and_then(|mut labels| labels.remove(&self.settings.tenant_label))
            })
            .filter(|tenant| !tenant.is_empty())
            .collect();

        Ok(tenants.into_iter().collect())
    }

    pub async fn storage_classes(&self) -> MeterResult<StorageClassCatalog> {
        let classes = self.reader.list_storage_classes().await?;
        Ok(StorageClassCatalog::from_classes(&classes))
    }

    /// Hard limits of the quota named after the tenant; zero values if absent
    pub async fn quota_for(&self, tenant: &str) -> MeterResult<TenantQuota> {
        let namespace = self.settings.quota_namespace(tenant);
        let Some(quota) = self.reader.get_resource_quota(&namespace, tenant).await? else {
            debug!(tenant = %tenant, namespace = %namespace, "No resource quota found");
            return Ok(TenantQuota::default());
        };

        let hard = quota.spec.and_then(|s| s.hard).unwrap_or_default();
        let mut result = TenantQuota::default();

        for (resource, value) in &hard {
            match resource.as_str() {
                "cpu" | "requests.cpu" => {
                    result.cpu_milli = result.cpu_milli.max(quantity::cpu_millis(value)?);
                }
                "memory" | "requests.memory" => {
                    result.memory_bytes = result.memory_bytes.max(quantity::bytes(value)?);
                }
                other => {
                    if let Some(class) = other.strip_suffix(STORAGE_CLASS_QUOTA_SUFFIX) {
                        result
                            .storage_bytes_by_class
                            .insert(class.to_string(), quantity::bytes(value)?);
                    }
                }
            }
        }

        Ok(result)
    }

    /// Pod names per tenant with vcluster host suffixes removed
    pub async fn pod_names_by_tenant(
        &self,
        tenants: &[String],
    ) -> MeterResult<BTreeMap<String, Vec<String>>> {
        let objects = self.objects_for(tenants, ObjectSelection::PODS).await?;

        Ok(objects
            .into_iter()
            .map(|o| {
                let names = o
                    .pods
                    .iter()
                    .filter_map(|p| p.metadata.name.as_deref())
                    .map(|name| virtual_name(name).to_string())
                    .collect();
                (o.tenant, names)
            })
            .collect())
    }
}

/// Strip the vcluster host suffix from a synced object name
pub fn virtual_name(name: &str) -> &str {
    name.split(VCLUSTER_NAME_SEPARATOR).next().unwrap_or(name)
}
