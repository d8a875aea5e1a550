//! Constructors for minimal cluster objects
//!
//! Only the fields metering reads are populated. Handy for filling a
//! [`StaticCluster`](super::StaticCluster) from exported data or in tests.

use k8s_openapi::api::core::v1::{
    Container, Namespace, PersistentVolumeClaim, PersistentVolumeClaimSpec, Pod, PodSpec,
    ResourceQuota, ResourceQuotaSpec, ResourceRequirements,
};
use k8s_openapi::api::networking::v1::{Ingress, IngressRule, IngressSpec};
use k8s_openapi::api::storage::v1::StorageClass;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::collections::BTreeMap;

use super::DEFAULT_STORAGE_CLASS_ANNOTATION;

fn meta(namespace: Option<&str>, name: &str, labels: &[(&str, &str)]) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: namespace.map(str::to_string),
        labels: (!labels.is_empty()).then(|| {
            labels
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect()
        }),
        ..Default::default()
    }
}

fn requests(pairs: &[(&str, &str)]) -> Option<ResourceRequirements> {
    if pairs.is_empty() {
        return None;
    }
    let map: BTreeMap<String, Quantity> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), Quantity(v.to_string())))
        .collect();
    Some(ResourceRequirements {
        requests: Some(map),
        ..Default::default()
    })
}

pub fn namespace(name: &str, labels: &[(&str, &str)]) -> Namespace {
    Namespace {
        metadata: meta(None, name, labels),
        ..Default::default()
    }
}

/// A pod whose first container requests `cpu` and `memory` (either may be empty)
pub fn pod(namespace: &str, name: &str, cpu: &str, memory: &str, labels: &[(&str, &str)]) -> Pod {
    let mut resources = Vec::new();
    if !cpu.is_empty() {
        resources.push(("cpu", cpu));
    }
    if !memory.is_empty() {
        resources.push(("memory", memory));
    }

    Pod {
        metadata: meta(Some(namespace), name, labels),
        spec: Some(PodSpec {
            containers: vec![Container {
                name: "main".to_string(),
                resources: requests(&resources),
                ..Default::default()
            }],
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Append a further container to a pod
pub fn with_sidecar(mut pod: Pod, cpu: &str, memory: &str) -> Pod {
    if let Some(spec) = pod.spec.as_mut() {
        spec.containers.push(Container {
            name: format!("sidecar-{}", spec.containers.len()),
            resources: requests(&[("cpu", cpu), ("memory", memory)]),
            ..Default::default()
        });
    }
    pod
}

pub fn pvc(
    namespace: &str,
    name: &str,
    storage_class: Option<&str>,
    size: &str,
    labels: &[(&str, &str)],
) -> PersistentVolumeClaim {
    PersistentVolumeClaim {
        metadata: meta(Some(namespace), name, labels),
        spec: Some(PersistentVolumeClaimSpec {
            storage_class_name: storage_class.map(str::to_string),
            resources: requests(&[("storage", size)]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub fn ingress(
    namespace: &str,
    name: &str,
    hosts: &[&str],
    labels: &[(&str, &str)],
) -> Ingress {
    Ingress {
        metadata: meta(Some(namespace), name, labels),
        spec: Some(IngressSpec {
            rules: Some(
                hosts
                    .iter()
                    .map(|h| IngressRule {
                        host: Some(h.to_string()),
                        ..Default::default()
                    })
                    .collect(),
            ),
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub fn storage_class(name: &str, is_default: bool) -> StorageClass {
    let mut metadata = meta(None, name, &[]);
    if is_default {
        metadata.annotations = Some(BTreeMap::from([(
            DEFAULT_STORAGE_CLASS_ANNOTATION.to_string(),
            "true".to_string(),
        )]));
    }
    StorageClass {
        metadata,
        provisioner: "kubernetes.io/no-provisioner".to_string(),
        ..Default::default()
    }
}

pub fn resource_quota(namespace: &str, name: &str, hard: &[(&str, &str)]) -> ResourceQuota {
    ResourceQuota {
        metadata: meta(Some(namespace), name, &[]),
        spec: Some(ResourceQuotaSpec {
            hard: Some(
                hard.iter()
                    .map(|(k, v)| (k.to_string(), Quantity(v.to_string())))
                    .collect(),
            ),
            ..Default::default()
        }),
        ..Default::default()
    }
}
