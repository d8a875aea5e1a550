//! Tests for tenant namespace resolution and object reading

use super::objects::*;
use super::*;
use crate::error::MeterError;

const TENANT_LABEL: &str = "natron.io/tenant";

fn inventory(cluster: StaticCluster) -> ClusterInventory {
    ClusterInventory::new(Arc::new(cluster), Arc::new(MeterSettings::default()))
}

fn tenants(names: &[&str]) -> Vec<String> {
    names.iter().map(|n| n.to_string()).collect()
}

#[tokio::test]
async fn test_labelled_namespaces_resolve_to_tenant() {
    let cluster = StaticCluster::new();
    cluster.add_namespace(namespace("acme-web", &[(TENANT_LABEL, "acme")]));
    cluster.add_namespace(namespace("acme-db", &[(TENANT_LABEL, "acme")]));
    cluster.add_namespace(namespace("globex", &[(TENANT_LABEL, "globex")]));

    let inv = inventory(cluster);
    assert_eq!(
        inv.namespaces_for("acme").await.unwrap(),
        vec!["acme-db".to_string(), "acme-web".to_string()]
    );
}

#[tokio::test]
async fn test_unlabelled_tenant_falls_back_to_named_namespace() {
    let cluster = StaticCluster::new();
    cluster.add_pod(pod("acme", "web", "500m", "", &[]));

    let inv = inventory(cluster);
    assert_eq!(inv.namespaces_for("acme").await.unwrap(), vec!["acme"]);

    let objects = inv
        .objects_for(&tenants(&["acme"]), ObjectSelection::PODS)
        .await
        .unwrap();
    assert_eq!(objects[0].pods.len(), 1);
}

#[tokio::test]
async fn test_missing_tenant_reads_as_empty() {
    let inv = inventory(StaticCluster::new());
    let objects = inv
        .objects_for(&tenants(&["nobody"]), ObjectSelection::ALL)
        .await
        .unwrap();

    assert_eq!(objects.len(), 1);
    assert!(objects[0].pods.is_empty());
    assert!(objects[0].pvcs.is_empty());
    assert!(objects[0].ingresses.is_empty());
}

#[tokio::test]
async fn test_objects_follow_tenant_order() {
    let cluster = StaticCluster::new();
    cluster.add_namespace(namespace("b-ns", &[(TENANT_LABEL, "b")]));
    cluster.add_namespace(namespace("a-ns", &[(TENANT_LABEL, "a")]));

    let inv = inventory(cluster);
    let objects = inv
        .objects_for(&tenants(&["b", "a"]), ObjectSelection::ALL)
        .await
        .unwrap();
    let order: Vec<&str> = objects.iter().map(|o| o.tenant.as_str()).collect();
    assert_eq!(order, vec!["b", "a"]);
}

#[tokio::test]
async fn test_selection_limits_reads() {
    let cluster = StaticCluster::new();
    cluster.add_pod(pod("acme", "web", "1", "1Gi", &[]));
    cluster.add_pvc(pvc("acme", "data", Some("fast"), "1Gi", &[]));
    cluster.fail_reads_of("ingresses");

    let inv = inventory(cluster);
    let objects = inv
        .objects_for(&tenants(&["acme"]), ObjectSelection::PVCS)
        .await
        .unwrap();
    assert!(objects[0].pods.is_empty());
    assert_eq!(objects[0].pvcs.len(), 1);

    let err = inv
        .objects_for(&tenants(&["acme"]), ObjectSelection::ALL)
        .await
        .unwrap_err();
    assert!(matches!(err, MeterError::ClusterRead { .. }));
}

#[tokio::test]
async fn test_empty_tenant_list() {
    let inv = inventory(StaticCluster::new());
    let objects = inv.objects_for(&[], ObjectSelection::ALL).await.unwrap();
    assert!(objects.is_empty());
}

#[tokio::test]
async fn test_discover_tenants_is_distinct_and_sorted() {
    let cluster = StaticCluster::new();
    cluster.add_namespace(namespace("z1", &[(TENANT_LABEL, "zeta")]));
    cluster.add_namespace(namespace("a1", &[(TENANT_LABEL, "alpha")]));
    cluster.add_namespace(namespace("a2", &[(TENANT_LABEL, "alpha")]));
    cluster.add_namespace(namespace("kube-system", &[]));

    let inv = inventory(cluster);
    assert_eq!(inv.discover_tenants().await.unwrap(), vec!["alpha", "zeta"]);
}

#[tokio::test]
async fn test_storage_class_catalog_finds_default() {
    let cluster = StaticCluster::new();
    cluster.add_storage_class(storage_class("slow", false));
    cluster.add_storage_class(storage_class("fast", true));

    let inv = inventory(cluster);
    let catalog = inv.storage_classes().await.unwrap();
    assert_eq!(catalog.names, vec!["fast", "slow"]);
    assert_eq!(catalog.default_class.as_deref(), Some("fast"));
}

#[tokio::test]
async fn test_quota_parsing() {
    let cluster = StaticCluster::new();
    cluster.add_resource_quota(resource_quota(
        "acme",
        "acme",
        &[
            ("requests.cpu", "4"),
            ("requests.memory", "8Gi"),
            ("fast.storageclass.storage.k8s.io/requests.storage", "100Gi"),
            ("pods", "20"),
        ],
    ));

    let inv = inventory(cluster);
    let quota = inv.quota_for("acme").await.unwrap();
    assert_eq!(quota.cpu_milli, 4000);
    assert_eq!(quota.memory_bytes, 8 * 1_073_741_824);
    assert_eq!(
        quota.storage_bytes_by_class.get("fast"),
        Some(&(100 * 1_073_741_824))
    );
    assert_eq!(quota.storage_bytes_by_class.len(), 1);
}

#[tokio::test]
async fn test_missing_quota_is_zero() {
    let inv = inventory(StaticCluster::new());
    assert_eq!(inv.quota_for("acme").await.unwrap(), TenantQuota::default());
}

#[tokio::test]
async fn test_quota_namespace_suffix() {
    let cluster = StaticCluster::new();
    cluster.add_resource_quota(resource_quota("acme-config", "acme", &[("cpu", "2")]));

    let settings = MeterSettings {
        quota_namespace_suffix: Some("config".to_string()),
        ..Default::default()
    };
    let inv = ClusterInventory::new(Arc::new(cluster), Arc::new(settings));
    assert_eq!(inv.quota_for("acme").await.unwrap().cpu_milli, 2000);
}

#[tokio::test]
async fn test_pod_names_strip_vcluster_suffix() {
    let cluster = StaticCluster::new();
    cluster.add_pod(pod("acme", "web-x-default-x-vc1", "100m", "", &[]));
    cluster.add_pod(pod("acme", "worker", "100m", "", &[]));

    let inv = inventory(cluster);
    let pods = inv.pod_names_by_tenant(&tenants(&["acme"])).await.unwrap();
    let mut names = pods["acme"].clone();
    names.sort();
    assert_eq!(names, vec!["web", "worker"]);
}

#[test]
fn test_virtual_name() {
    assert_eq!(virtual_name("web-x-ns-x-vc"), "web");
    assert_eq!(virtual_name("plain"), "plain");
}
