//! Per-tenant usage aggregation
//!
//! This module provides:
//! - [`MeteredQuantity`]: a raw quantity summed over objects, each with its own discount
//! - [`ResourceUsage`]: everything one tenant requests
//! - [`UsageAggregator`]: turns tenant names into usage through a [`ClusterInventory`]
//!
//! Quantities stay undiscounted here; discounts travel alongside each object's
//! contribution and are applied by the cost calculator.
//!
//! Map contracts, relied on by callers:
//! - CPU and memory maps contain every requested tenant (zero when idle)
//! - the storage map omits tenants without a billable PVC
//! - the ingress map omits tenants without a billable hostname

pub mod ingress;

#[cfg(test)]
mod tests;

pub use ingress::IngressHost;

use crate::cluster::{quantity, ClusterInventory, ObjectSelection, StorageClassCatalog, TenantObjects};
use crate::discount::{Discount, DiscountResolver};
use crate::error::MeterResult;
use k8s_openapi::api::core::v1::{PersistentVolumeClaim, Pod};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// One object's contribution to a metered quantity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageItem {
    /// `namespace/name` of the contributing object
    pub object: String,
    pub amount: i64,
    pub discount: Discount,
}

/// A quantity made of per-object contributions
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MeteredQuantity {
    items: Vec<UsageItem>,
}

impl MeteredQuantity {
    pub fn push(&mut self, object: impl Into<String>, amount: i64, discount: Discount) {
        self.items.push(UsageItem {
            object: object.into(),
            amount,
            discount,
        });
    }

    pub fn items(&self) -> &[UsageItem] {
        &self.items
    }

    /// Raw sum, ignoring discounts; saturates at `i64::MAX`
    pub fn total(&self) -> i64 {
        self.items
            .iter()
            .fold(0i64, |acc, i| acc.saturating_add(i.amount))
    }
}

/// Everything one tenant requests at a point in time
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResourceUsage {
    pub tenant: String,
    /// First-container CPU requests in millicores
    pub cpu_milli: MeteredQuantity,
    /// First-container memory requests in bytes
    pub memory_bytes: MeteredQuantity,
    /// PVC storage requests in bytes, keyed by storage class
    pub storage_bytes_by_class: BTreeMap<String, MeteredQuantity>,
    pub ingress_hosts: Vec<IngressHost>,
}

impl ResourceUsage {
    /// Plain totals, as reported by the raw request endpoints
    pub fn totals(&self) -> UsageTotals {
        UsageTotals {
            cpu_milli: self.cpu_milli.total(),
            memory_bytes: self.memory_bytes.total(),
            storage_bytes_by_class: storage_totals(&self.storage_bytes_by_class),
            ingress_hostnames: self
                .ingress_hosts
                .iter()
                .map(|h| h.hostname.clone())
                .collect(),
        }
    }
}

/// Undiscounted usage totals for one tenant
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageTotals {
    pub cpu_milli: i64,
    pub memory_bytes: i64,
    pub storage_bytes_by_class: BTreeMap<String, i64>,
    pub ingress_hostnames: Vec<String>,
}

pub fn storage_totals(storage: &BTreeMap<String, MeteredQuantity>) -> BTreeMap<String, i64> {
    storage
        .iter()
        .map(|(class, q)| (class.clone(), q.total()))
        .collect()
}

fn object_name(namespace: Option<&str>, name: Option<&str>) -> String {
    format!("{}/{}", namespace.unwrap_or_default(), name.unwrap_or_default())
}

/// Request of the pod's first container for `resource`, in integer units
fn first_container_request(pod: &Pod, resource: &str) -> MeterResult<i64> {
    let Some(request) = pod
        .spec
        .as_ref()
        .and_then(|spec| spec.containers.first())
        .and_then(|c| c.resources.as_ref())
        .and_then(|r| r.requests.as_ref())
        .and_then(|r| r.get(resource))
    else {
        return Ok(0);
    };

    match resource {
        "cpu" => quantity::cpu_millis(request),
        _ => quantity::bytes(request),
    }
}

fn pvc_request_bytes(pvc: &PersistentVolumeClaim) -> MeterResult<i64> {
    let request = pvc
        .spec
        .as_ref()
        .and_then(|spec| spec.resources.as_ref())
        .and_then(|r| r.requests.as_ref())
        .and_then(|r| r.get("storage"));

    match request {
        Some(q) => quantity::bytes(q),
        None => Ok(0),
    }
}

/// Builds [`ResourceUsage`] from the cluster, one tenant at a time
#[derive(Clone)]
pub struct UsageAggregator {
    inventory: ClusterInventory,
    discounts: DiscountResolver,
}

impl UsageAggregator {
    pub fn new(inventory: ClusterInventory) -> Self {
        let discounts = DiscountResolver::new(inventory.settings().discount_label.clone());
        Self {
            inventory,
            discounts,
        }
    }

    pub fn inventory(&self) -> &ClusterInventory {
        &self.inventory
    }

    /// Full usage for each tenant, in the given order
    pub async fn usage(&self, tenants: &[String]) -> MeterResult<Vec<ResourceUsage>> {
        let objects = self.inventory.objects_for(tenants, ObjectSelection::ALL).await?;
        let catalog = self.catalog_if_needed(&objects).await?;

        objects
            .iter()
            .map(|o| {
                Ok(ResourceUsage {
                    tenant: o.tenant.clone(),
                    cpu_milli: self.pod_quantity(o, "cpu")?,
                    memory_bytes: self.pod_quantity(o, "memory")?,
                    storage_bytes_by_class: self.storage(o, catalog.as_ref())?,
                    ingress_hosts: self.ingress_hosts(o),
                })
            })
            .collect()
    }

    /// CPU millicores per tenant; every tenant is present
    pub async fn cpu_by_tenant(
        &self,
        tenants: &[String],
    ) -> MeterResult<BTreeMap<String, MeteredQuantity>> {
        self.pods_by_tenant(tenants, "cpu").await
    }

    /// Memory bytes per tenant; every tenant is present
    pub async fn memory_by_tenant(
        &self,
        tenants: &[String],
    ) -> MeterResult<BTreeMap<String, MeteredQuantity>> {
        self.pods_by_tenant(tenants, "memory").await
    }

    /// Storage bytes per tenant and class; tenants without PVCs are absent
    pub async fn storage_by_tenant(
        &self,
        tenants: &[String],
    ) -> MeterResult<BTreeMap<String, BTreeMap<String, MeteredQuantity>>> {
        let objects = self.inventory.objects_for(tenants, ObjectSelection::PVCS).await?;
        let catalog = self.catalog_if_needed(&objects).await?;

        let mut result = BTreeMap::new();
        for o in &objects {
            let storage = self.storage(o, catalog.as_ref())?;
            if !storage.is_empty() {
                result.insert(o.tenant.clone(), storage);
            }
        }
        Ok(result)
    }

    /// Ingress hostnames per tenant; tenants without hostnames are absent
    pub async fn ingress_by_tenant(
        &self,
        tenants: &[String],
    ) -> MeterResult<BTreeMap<String, Vec<IngressHost>>> {
        let objects = self
            .inventory
            .objects_for(tenants, ObjectSelection::INGRESSES)
            .await?;

        Ok(objects
            .iter()
            .map(|o| (o.tenant.clone(), self.ingress_hosts(o)))
            .filter(|(_, hosts)| !hosts.is_empty())
            .collect())
    }

    async fn pods_by_tenant(
        &self,
        tenants: &[String],
        resource: &str,
    ) -> MeterResult<BTreeMap<String, MeteredQuantity>> {
        let objects = self.inventory.objects_for(tenants, ObjectSelection::PODS).await?;
        objects
            .iter()
            .map(|o| Ok((o.tenant.clone(), self.pod_quantity(o, resource)?)))
            .collect()
    }

    fn pod_quantity(&self, objects: &TenantObjects, resource: &str) -> MeterResult<MeteredQuantity> {
        let mut quantity = MeteredQuantity::default();
        for pod in &objects.pods {
            let name = object_name(pod.metadata.namespace.as_deref(), pod.metadata.name.as_deref());
            let amount = first_container_request(pod, resource)?;
            let discount = self.discounts.resolve(&name, pod.metadata.labels.as_ref());
            quantity.push(name, amount, discount);
        }
        Ok(quantity)
    }

    /// The storage class catalog, fetched only when some PVC has no class
    async fn catalog_if_needed(
        &self,
        objects: &[TenantObjects],
    ) -> MeterResult<Option<StorageClassCatalog>> {
        let needs_default = objects
            .iter()
            .flat_map(|o| o.pvcs.iter())
            .any(|pvc| explicit_class(pvc).is_none());

        if needs_default {
            Ok(Some(self.inventory.storage_classes().await?))
        } else {
            Ok(None)
        }
    }

    fn storage(
        &self,
        objects: &TenantObjects,
        catalog: Option<&StorageClassCatalog>,
    ) -> MeterResult<BTreeMap<String, MeteredQuantity>> {
        let mut by_class: BTreeMap<String, MeteredQuantity> = BTreeMap::new();

        for pvc in &objects.pvcs {
            let name = object_name(pvc.metadata.namespace.as_deref(), pvc.metadata.name.as_deref());
            let class = match explicit_class(pvc) {
                Some(class) => class.to_string(),
                None => match catalog.and_then(|c| c.default_class.clone()) {
                    Some(default) => {
                        debug!(pvc = %name, class = %default, "Using default storage class");
                        default
                    }
                    None => {
                        warn!(pvc = %name, "PVC has no storage class and the cluster has no default, not billed");
                        continue;
                    }
                },
            };

            let amount = pvc_request_bytes(pvc)?;
            let discount = self.discounts.resolve(&name, pvc.metadata.labels.as_ref());
            by_class.entry(class).or_default().push(name, amount, discount);
        }

        Ok(by_class)
    }

    fn ingress_hosts(&self, objects: &TenantObjects) -> Vec<IngressHost> {
        let mut hosts = Vec::new();

        for ing in &objects.ingresses {
            let name = object_name(
                ing.metadata.namespace.as_deref(),
                ing.metadata.name.as_deref(),
            );
            if self.inventory.settings().exclude_vcluster_ingresses
                && ingress::is_vcluster_ingress(ing)
            {
                debug!(ingress = %name, "Skipping vcluster ingress");
                continue;
            }

            let discount = self.discounts.resolve(&name, ing.metadata.labels.as_ref());
            hosts.extend(
                ingress::rule_hostnames(ing)
                    .into_iter()
                    .map(|hostname| IngressHost { hostname, discount }),
            );
        }

        hosts
    }
}

fn explicit_class(pvc: &PersistentVolumeClaim) -> Option<&str> {
    pvc.spec
        .as_ref()
        .and_then(|spec| spec.storage_class_name.as_deref())
        .filter(|class| !class.is_empty())
}
