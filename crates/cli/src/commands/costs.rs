//! Cost-related CLI commands

use anyhow::Result;
use std::collections::BTreeMap;
use tabled::Tabled;

use crate::client::{ApiClient, MonthlySummary, TenantCosts};
use crate::output::{format_by_class, format_cost, print_rows, OutputFormat};

#[derive(Tabled)]
struct CostRow {
    #[tabled(rename = "Tenant")]
    tenant: String,
    #[tabled(rename = "CPU")]
    cpu: String,
    #[tabled(rename = "Memory")]
    memory: String,
    #[tabled(rename = "Storage")]
    storage: String,
    #[tabled(rename = "Ingress")]
    ingress: String,
    #[tabled(rename = "Total")]
    total: String,
}

impl From<&TenantCosts> for CostRow {
    fn from(c: &TenantCosts) -> Self {
        Self {
            tenant: c.tenant.clone(),
            cpu: format_cost(c.cpu),
            memory: format_cost(c.memory),
            storage: format_by_class(&c.storage, |v| format_cost(*v)),
            ingress: format_cost(c.ingress),
            total: format_cost(c.total()),
        }
    }
}

#[derive(Tabled)]
struct MonthlyRow {
    #[tabled(rename = "Month")]
    month: String,
    #[tabled(rename = "CPU")]
    cpu: String,
    #[tabled(rename = "Memory")]
    memory: String,
    #[tabled(rename = "Storage")]
    storage: String,
    #[tabled(rename = "Ingress")]
    ingress: String,
    #[tabled(rename = "Total")]
    total: String,
}

impl From<&MonthlySummary> for MonthlyRow {
    fn from(s: &MonthlySummary) -> Self {
        Self {
            month: month_label(s.year, s.month),
            cpu: format_cost(s.cpu_cost),
            memory: format_cost(s.memory_cost),
            storage: format_cost(s.storage_cost),
            ingress: format_cost(s.ingress_cost),
            total: format_cost(s.total_cost),
        }
    }
}

/// Current costs of one tenant, or of every tenant the token grants
pub async fn show_costs(client: &ApiClient, tenant: Option<String>, format: OutputFormat) -> Result<()> {
    let costs = match tenant {
        Some(tenant) => vec![fetch_tenant_costs(client, &tenant).await?],
        None => fetch_all_costs(client).await?,
    };

    let rows: Vec<CostRow> = costs.iter().map(CostRow::from).collect();
    print_rows(&rows, &costs, format)
}

async fn fetch_tenant_costs(client: &ApiClient, tenant: &str) -> Result<TenantCosts> {
    Ok(TenantCosts {
        tenant: tenant.to_string(),
        cpu: client.tenant_costs(tenant, "cpu").await?,
        memory: client.tenant_costs(tenant, "memory").await?,
        storage: client.tenant_costs(tenant, "storage").await?,
        ingress: client.tenant_costs(tenant, "ingress").await?,
    })
}

/// Zero costs are omitted by the API, so start from the tenant list
async fn fetch_all_costs(client: &ApiClient) -> Result<Vec<TenantCosts>> {
    let tenants = client.tenants().await?;
    let cpu: BTreeMap<String, f64> = client.costs("cpu").await?;
    let memory: BTreeMap<String, f64> = client.costs("memory").await?;
    let mut storage: BTreeMap<String, BTreeMap<String, f64>> = client.costs("storage").await?;
    let ingress: BTreeMap<String, f64> = client.costs("ingress").await?;

    Ok(tenants
        .into_iter()
        .map(|tenant| TenantCosts {
            cpu: cpu.get(&tenant).copied().unwrap_or_default(),
            memory: memory.get(&tenant).copied().unwrap_or_default(),
            storage: storage.remove(&tenant).unwrap_or_default(),
            ingress: ingress.get(&tenant).copied().unwrap_or_default(),
            tenant,
        })
        .collect())
}

/// Stored monthly summaries of a tenant
pub async fn show_monthly(client: &ApiClient, tenant: &str, format: OutputFormat) -> Result<()> {
    let summaries = client.monthly_costs(tenant).await?;
    let rows: Vec<MonthlyRow> = summaries.iter().map(MonthlyRow::from).collect();
    print_rows(&rows, &summaries, format)
}

fn month_label(year: i32, month: u32) -> String {
    u8::try_from(month)
        .ok()
        .and_then(|m| chrono::Month::try_from(m).ok())
        .map(|m| format!("{} {}", m.name(), year))
        .unwrap_or_else(|| format!("{year}-{month:02}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_month_label() {
        assert_eq!(month_label(2026, 2), "February 2026");
        assert_eq!(month_label(2026, 13), "2026-13");
    }

    #[tokio::test]
    async fn test_all_costs_fill_missing_kinds_with_zero() {
        let mut server = mockito::Server::new_async().await;
        for (path, body) in [
            ("/api/v1/tenants", r#"["acme","globex"]"#),
            ("/api/v1/costs/cpu", r#"{"acme":1.5,"globex":0.1}"#),
            ("/api/v1/costs/memory", r#"{"acme":1.0}"#),
            ("/api/v1/costs/storage", r#"{"acme":{"fast":0.8}}"#),
            ("/api/v1/costs/ingress", r#"{}"#),
        ] {
            server
                .mock("GET", path)
                .with_body(body)
                .create_async()
                .await;
        }

        let client = ApiClient::new(&server.url(), None).unwrap();
        let costs = fetch_all_costs(&client).await.unwrap();

        assert_eq!(costs.len(), 2);
        assert_eq!(costs[0].tenant, "acme");
        assert!((costs[0].total() - 3.3).abs() < 1e-9);
        assert_eq!(costs[1].tenant, "globex");
        assert_eq!(costs[1].memory, 0.0);
        assert!(costs[1].storage.is_empty());
    }
}
