//! Tests for usage aggregation against an in-memory cluster

use super::*;
use crate::cluster::objects::*;
use crate::cluster::StaticCluster;
use crate::error::MeterError;
use crate::settings::MeterSettings;
use std::sync::Arc;

const TENANT: &str = "natron.io/tenant";
const DISCOUNT: &str = "natron.io/discount";

fn aggregator_with(cluster: StaticCluster, settings: MeterSettings) -> UsageAggregator {
    UsageAggregator::new(ClusterInventory::new(Arc::new(cluster), Arc::new(settings)))
}

fn aggregator(cluster: StaticCluster) -> UsageAggregator {
    aggregator_with(cluster, MeterSettings::default())
}

fn tenants(names: &[&str]) -> Vec<String> {
    names.iter().map(|n| n.to_string()).collect()
}

/// Two tenants: acme (labelled namespaces) and globex (tenant-named namespace)
fn two_tenant_cluster() -> StaticCluster {
    let cluster = StaticCluster::new();
    cluster.add_namespace(namespace("acme-web", &[(TENANT, "acme")]));
    cluster.add_namespace(namespace("acme-db", &[(TENANT, "acme")]));

    cluster.add_pod(pod("acme-web", "web-1", "500m", "256Mi", &[]));
    cluster.add_pod(pod("acme-web", "web-2", "250m", "256Mi", &[(DISCOUNT, "0.5")]));
    cluster.add_pod(pod("acme-db", "db", "1", "1Gi", &[]));
    cluster.add_pvc(pvc("acme-db", "data", Some("fast"), "10Gi", &[(DISCOUNT, "0.2")]));
    cluster.add_ingress(ingress("acme-web", "web", &["a.example.com", "b.example.com"], &[]));

    cluster.add_pod(pod("globex", "api", "100m", "128Mi", &[]));
    cluster
}

#[tokio::test]
async fn test_cpu_and_memory_sum_first_containers() {
    let agg = aggregator(two_tenant_cluster());
    let list = tenants(&["acme", "globex"]);

    let cpu = agg.cpu_by_tenant(&list).await.unwrap();
    assert_eq!(cpu["acme"].total(), 1750);
    assert_eq!(cpu["globex"].total(), 100);

    let memory = agg.memory_by_tenant(&list).await.unwrap();
    assert_eq!(memory["acme"].total(), 1_610_612_736);
    assert_eq!(memory["globex"].total(), 134_217_728);
}

#[tokio::test]
async fn test_sidecar_requests_are_not_counted() {
    let cluster = StaticCluster::new();
    cluster.add_pod(with_sidecar(pod("acme", "web", "500m", "1Gi", &[]), "2", "4Gi"));

    let agg = aggregator(cluster);
    let cpu = agg.cpu_by_tenant(&tenants(&["acme"])).await.unwrap();
    assert_eq!(cpu["acme"].total(), 500);
}

#[tokio::test]
async fn test_discount_travels_with_each_pod() {
    let agg = aggregator(two_tenant_cluster());
    let cpu = agg.cpu_by_tenant(&tenants(&["acme"])).await.unwrap();

    let discounts: Vec<(i64, f64)> = cpu["acme"]
        .items()
        .iter()
        .map(|i| (i.amount, i.discount.fraction()))
        .collect();
    assert!(discounts.contains(&(250, 0.5)));
    assert!(discounts.contains(&(500, 0.0)));
    assert!(discounts.contains(&(1000, 0.0)));
}

#[tokio::test]
async fn test_invalid_discount_does_not_abort() {
    let cluster = StaticCluster::new();
    cluster.add_pod(pod("acme", "a", "1", "", &[(DISCOUNT, "half")]));
    cluster.add_pod(pod("acme", "b", "1", "", &[(DISCOUNT, "1.5")]));

    let agg = aggregator(cluster);
    let cpu = agg.cpu_by_tenant(&tenants(&["acme"])).await.unwrap();
    assert_eq!(cpu["acme"].total(), 2000);
    assert!(cpu["acme"].items().iter().all(|i| i.discount == Discount::NONE));
}

#[tokio::test]
async fn test_storage_grouped_by_class_and_omits_tenants_without_pvcs() {
    let cluster = two_tenant_cluster();
    cluster.add_pvc(pvc("acme-db", "logs", Some("slow"), "5Gi", &[]));
    cluster.add_pvc(pvc("acme-web", "cache", Some("fast"), "1Gi", &[]));

    let agg = aggregator(cluster);
    let storage = agg
        .storage_by_tenant(&tenants(&["acme", "globex"]))
        .await
        .unwrap();

    assert!(!storage.contains_key("globex"));
    let acme = &storage["acme"];
    assert_eq!(acme["fast"].total(), 11 * 1_073_741_824);
    assert_eq!(acme["slow"].total(), 5 * 1_073_741_824);
}

#[tokio::test]
async fn test_classless_pvc_uses_default_class() {
    let cluster = StaticCluster::new();
    cluster.add_storage_class(storage_class("standard", true));
    cluster.add_pvc(pvc("acme", "data", None, "2Gi", &[]));

    let agg = aggregator(cluster);
    let storage = agg.storage_by_tenant(&tenants(&["acme"])).await.unwrap();
    assert_eq!(storage["acme"]["standard"].total(), 2 * 1_073_741_824);
}

#[tokio::test]
async fn test_classless_pvc_without_default_is_skipped() {
    let cluster = StaticCluster::new();
    cluster.add_storage_class(storage_class("standard", false));
    cluster.add_pvc(pvc("acme", "data", None, "2Gi", &[]));

    let agg = aggregator(cluster);
    let storage = agg.storage_by_tenant(&tenants(&["acme"])).await.unwrap();
    assert!(storage.is_empty());
}

#[tokio::test]
async fn test_ingress_hosts_and_omission() {
    let agg = aggregator(two_tenant_cluster());
    let ingress = agg
        .ingress_by_tenant(&tenants(&["acme", "globex"]))
        .await
        .unwrap();

    assert!(!ingress.contains_key("globex"));
    let hosts: Vec<&str> = ingress["acme"].iter().map(|h| h.hostname.as_str()).collect();
    assert_eq!(hosts, vec!["a.example.com", "b.example.com"]);
}

#[tokio::test]
async fn test_vcluster_ingresses_excluded_when_configured() {
    let cluster = StaticCluster::new();
    cluster.add_ingress(ingress("acme", "vcluster-acme", &["vc.example.com"], &[]));
    cluster.add_ingress(ingress("acme", "web", &["web.example.com"], &[]));

    let settings = MeterSettings {
        exclude_vcluster_ingresses: true,
        ..Default::default()
    };
    let agg = aggregator_with(cluster, settings);
    let ingress = agg.ingress_by_tenant(&tenants(&["acme"])).await.unwrap();
    assert_eq!(ingress["acme"].len(), 1);
    assert_eq!(ingress["acme"][0].hostname, "web.example.com");
}

#[tokio::test]
async fn test_empty_tenant_list_yields_empty_results() {
    let agg = aggregator(two_tenant_cluster());
    let none: Vec<String> = Vec::new();

    assert!(agg.cpu_by_tenant(&none).await.unwrap().is_empty());
    assert!(agg.memory_by_tenant(&none).await.unwrap().is_empty());
    assert!(agg.storage_by_tenant(&none).await.unwrap().is_empty());
    assert!(agg.ingress_by_tenant(&none).await.unwrap().is_empty());
    assert!(agg.usage(&none).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_tenant_without_namespaces_has_zero_usage() {
    let agg = aggregator(two_tenant_cluster());
    let usage = agg.usage(&tenants(&["initech"])).await.unwrap();

    assert_eq!(usage.len(), 1);
    let totals = usage[0].totals();
    assert_eq!(totals, UsageTotals::default());
}

#[tokio::test]
async fn test_usage_keeps_tenant_order() {
    let agg = aggregator(two_tenant_cluster());
    let usage = agg.usage(&tenants(&["globex", "acme"])).await.unwrap();
    assert_eq!(usage[0].tenant, "globex");
    assert_eq!(usage[1].tenant, "acme");
    assert_eq!(usage[1].totals().ingress_hostnames.len(), 2);
}

#[tokio::test]
async fn test_read_error_aborts_aggregation() {
    let cluster = two_tenant_cluster();
    cluster.fail_reads_of("persistentvolumeclaims");

    let agg = aggregator(cluster);
    let err = agg.usage(&tenants(&["acme", "globex"])).await.unwrap_err();
    assert!(matches!(err, MeterError::ClusterRead { .. }));
    assert!(agg.cpu_by_tenant(&tenants(&["acme"])).await.is_ok());
}

#[tokio::test]
async fn test_huge_storage_totals_saturate() {
    let cluster = StaticCluster::new();
    cluster.add_pvc(pvc("acme", "a", Some("fast"), "5Ei", &[]));
    cluster.add_pvc(pvc("acme", "b", Some("fast"), "5Ei", &[]));

    let agg = aggregator(cluster);
    let storage = agg.storage_by_tenant(&tenants(&["acme"])).await.unwrap();
    assert_eq!(storage["acme"]["fast"].items().len(), 2);
    assert_eq!(storage["acme"]["fast"].total(), i64::MAX);
    assert_eq!(storage_totals(&storage["acme"])["fast"], i64::MAX);
}

#[tokio::test]
async fn test_out_of_range_request_is_rejected() {
    let cluster = StaticCluster::new();
    cluster.add_pvc(pvc("acme", "huge", Some("fast"), "9Ei", &[]));

    let agg = aggregator(cluster);
    let err = agg.storage_by_tenant(&tenants(&["acme"])).await.unwrap_err();
    assert!(matches!(err, MeterError::InvalidQuantity { .. }));
}
