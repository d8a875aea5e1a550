//! Immutable metering settings shared by every component

use serde::{Deserialize, Serialize};

pub const DEFAULT_TENANT_LABEL: &str = "natron.io/tenant";
pub const DEFAULT_DISCOUNT_LABEL: &str = "natron.io/discount";

/// How ingress usage is billed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IngressBilling {
    /// One unit per ingress rule hostname
    #[default]
    PerHostname,
    /// One unit per distinct second-level domain
    PerDomain,
}

/// Label keys and switches that drive aggregation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeterSettings {
    /// Namespace label whose value names the owning tenant
    pub tenant_label: String,
    /// Object label holding a discount fraction
    pub discount_label: String,
    pub ingress_billing: IngressBilling,
    /// Skip ingresses created by vcluster syncers
    pub exclude_vcluster_ingresses: bool,
    /// When set, quotas are read from `<tenant>-<suffix>` instead of the tenant namespace
    pub quota_namespace_suffix: Option<String>,
}

impl Default for MeterSettings {
    fn default() -> Self {
        Self {
            tenant_label: DEFAULT_TENANT_LABEL.to_string(),
            discount_label: DEFAULT_DISCOUNT_LABEL.to_string(),
            ingress_billing: IngressBilling::default(),
            exclude_vcluster_ingresses: false,
            quota_namespace_suffix: None,
        }
    }
}

impl MeterSettings {
    /// Namespace that holds the tenant's resource quota
    pub fn quota_namespace(&self, tenant: &str) -> String {
        match self.quota_namespace_suffix.as_deref() {
            Some(suffix) if !suffix.is_empty() => format!("{tenant}-{suffix}"),
            _ => tenant.to_string(),
        }
    }
}
