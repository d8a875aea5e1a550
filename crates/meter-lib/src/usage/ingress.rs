//! Ingress hostname extraction and domain grouping

use crate::discount::Discount;
use k8s_openapi::api::networking::v1::Ingress;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// One billable ingress rule hostname and the discount of its ingress
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngressHost {
    pub hostname: String,
    pub discount: Discount,
}

/// Hostnames of an ingress's rules; rules without a host are skipped
pub fn rule_hostnames(ingress: &Ingress) -> Vec<String> {
    ingress
        .spec
        .as_ref()
        .and_then(|spec| spec.rules.as_ref())
        .map(|rules| {
            rules
                .iter()
                .filter_map(|rule| rule.host.as_deref())
                .filter(|host| !host.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Ingresses created by a vcluster syncer carry `vcluster` in their name
pub fn is_vcluster_ingress(ingress: &Ingress) -> bool {
    ingress
        .metadata
        .name
        .as_deref()
        .is_some_and(|name| name.contains("vcluster"))
}

/// Second-level domain of a hostname: the last two dot-separated labels
pub fn domain_of(hostname: &str) -> Option<String> {
    let parts: Vec<&str> = hostname.trim_end_matches('.').split('.').collect();
    if parts.len() < 2 {
        return None;
    }
    let (name, tld) = (parts[parts.len() - 2], parts[parts.len() - 1]);
    if name.is_empty() || tld.is_empty() {
        return None;
    }
    Some(format!("{name}.{tld}"))
}

/// Distinct domains across `hosts`, each with the smallest discount among the
/// hostnames that map to it. Invalid hostnames are logged and left out.
pub fn distinct_domains(hosts: &[IngressHost]) -> BTreeMap<String, Discount> {
    let mut domains: BTreeMap<String, Discount> = BTreeMap::new();

    for host in hosts {
        let Some(domain) = domain_of(&host.hostname) else {
            warn!(hostname = %host.hostname, "Invalid ingress hostname, not billed");
            continue;
        };
        domains
            .entry(domain)
            .and_modify(|d| {
                if host.discount < *d {
                    *d = host.discount;
                }
            })
            .or_insert(host.discount);
    }

    debug!(hosts = hosts.len(), domains = domains.len(), "Grouped ingress hosts by domain");
    domains
}
