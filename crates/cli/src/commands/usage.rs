//! Tenant, raw request and quota commands

use anyhow::{bail, Result};
use serde_json::json;
use std::collections::BTreeMap;
use tabled::Tabled;

use crate::client::{ApiClient, Quota};
use crate::output::{format_by_class, format_bytes, format_cpu, print_rows, OutputFormat};

pub const REQUEST_KINDS: [&str; 4] = ["cpu", "memory", "storage", "ingress"];

#[derive(Tabled)]
struct TenantRow {
    #[tabled(rename = "Tenant")]
    tenant: String,
}

#[derive(Tabled)]
struct RequestRow {
    #[tabled(rename = "Tenant")]
    tenant: String,
    #[tabled(rename = "Requested")]
    requested: String,
}

#[derive(Tabled)]
struct QuotaRow {
    #[tabled(rename = "Tenant")]
    tenant: String,
    #[tabled(rename = "CPU")]
    cpu: String,
    #[tabled(rename = "Memory")]
    memory: String,
    #[tabled(rename = "Storage")]
    storage: String,
}

pub async fn list_tenants(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let tenants = client.tenants().await?;
    let rows: Vec<TenantRow> = tenants
        .iter()
        .map(|t| TenantRow { tenant: t.clone() })
        .collect();
    print_rows(&rows, &tenants, format)
}

/// Requested amounts of one kind, without discounts
pub async fn show_requests(
    client: &ApiClient,
    kind: &str,
    tenant: Option<String>,
    format: OutputFormat,
) -> Result<()> {
    if !REQUEST_KINDS.contains(&kind) {
        bail!("unknown kind {kind:?}, expected one of {}", REQUEST_KINDS.join(", "));
    }

    let values: BTreeMap<String, serde_json::Value> = match tenant {
        Some(tenant) => {
            let value = client.tenant_requests(&tenant, kind).await?;
            BTreeMap::from([(tenant, value)])
        }
        None => client.requests(kind).await?,
    };

    let rows: Vec<RequestRow> = values
        .iter()
        .map(|(tenant, value)| RequestRow {
            tenant: tenant.clone(),
            requested: format_request(kind, value),
        })
        .collect();
    print_rows(&rows, &values, format)
}

fn format_request(kind: &str, value: &serde_json::Value) -> String {
    match kind {
        "cpu" => format_cpu(value.as_i64().unwrap_or_default()),
        "memory" => format_bytes(value.as_i64().unwrap_or_default()),
        "storage" => {
            let by_class: BTreeMap<String, i64> =
                serde_json::from_value(value.clone()).unwrap_or_default();
            format_by_class(&by_class, |b| format_bytes(*b))
        }
        _ => value
            .as_array()
            .map(|hosts| {
                hosts
                    .iter()
                    .filter_map(|h| h.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            })
            .unwrap_or_default(),
    }
}

pub async fn show_quotas(client: &ApiClient, tenant: &str, format: OutputFormat) -> Result<()> {
    let quota = client.quota(tenant).await?;
    let rows = vec![QuotaRow::from(&quota)];
    print_rows(&rows, &json!(quota), format)
}

impl From<&Quota> for QuotaRow {
    fn from(q: &Quota) -> Self {
        Self {
            tenant: q.tenant.clone(),
            cpu: format_cpu(q.cpu_milli),
            memory: format_bytes(q.memory_bytes),
            storage: format_by_class(&q.storage_bytes_by_class, |b| format_bytes(*b)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_request() {
        assert_eq!(format_request("cpu", &json!(1750)), "1.8");
        assert_eq!(format_request("memory", &json!(268435456)), "256.00Mi");
        assert_eq!(
            format_request("storage", &json!({"fast": 10737418240i64})),
            "fast=10.00Gi"
        );
        assert_eq!(
            format_request("ingress", &json!(["a.example.com", "b.example.com"])),
            "a.example.com, b.example.com"
        );
    }

    #[tokio::test]
    async fn test_unknown_kind_is_rejected_before_request() {
        let client = ApiClient::new("http://127.0.0.1:9", None).unwrap();
        let err = show_requests(&client, "gpu", None, OutputFormat::Json)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("unknown kind"));
    }
}
