//! In-memory cost store, for tests and single-replica deployments without a database

use super::CostStore;
use crate::error::{MeterError, MeterResult};
use crate::models::{CostKind, CostRecord, MonthlyCostSummary, Tenant};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct Tables {
    tenants: Vec<Tenant>,
    records: Vec<CostRecord>,
    /// Keyed by (tenant_id, year, month)
    summaries: BTreeMap<(i64, i32, u32), MonthlyCostSummary>,
}

#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    tables: Arc<RwLock<Tables>>,
    offline: Arc<AtomicBool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn record_count(&self) -> usize {
        self.tables.read().await.records.len()
    }

    pub async fn summary_count(&self) -> usize {
        self.tables.read().await.summaries.len()
    }

    /// Make `ping` fail, as an unreachable database would
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::Relaxed);
    }
}

#[async_trait]
impl CostStore for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn ping(&self) -> MeterResult<()> {
        if self.offline.load(Ordering::Relaxed) {
            return Err(MeterError::Persistence("memory store is offline".to_string()));
        }
        Ok(())
    }

    async fn ensure_tenant(&self, name: &str) -> MeterResult<Tenant> {
        let mut tables = self.tables.write().await;
        if let Some(tenant) = tables.tenants.iter().find(|t| t.name == name) {
            return Ok(tenant.clone());
        }

        let tenant = Tenant {
            id: tables.tenants.len() as i64 + 1,
            name: name.to_string(),
            created_at: Utc::now(),
        };
        tables.tenants.push(tenant.clone());
        Ok(tenant)
    }

    async fn find_tenant(&self, name: &str) -> MeterResult<Option<Tenant>> {
        let tables = self.tables.read().await;
        Ok(tables.tenants.iter().find(|t| t.name == name).cloned())
    }

    async fn list_tenants(&self) -> MeterResult<Vec<Tenant>> {
        Ok(self.tables.read().await.tenants.clone())
    }

    async fn insert_cost_records(&self, records: &[CostRecord]) -> MeterResult<()> {
        let mut tables = self.tables.write().await;
        tables.records.extend_from_slice(records);
        Ok(())
    }

    async fn cost_records(
        &self,
        tenant_id: i64,
        kind: CostKind,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> MeterResult<Vec<CostRecord>> {
        let tables = self.tables.read().await;
        Ok(tables
            .records
            .iter()
            .filter(|r| {
                r.tenant_id == tenant_id
                    && r.kind == kind
                    && r.observed_at >= from
                    && r.observed_at < to
            })
            .cloned()
            .collect())
    }

    async fn upsert_monthly_summary(&self, summary: &MonthlyCostSummary) -> MeterResult<()> {
        let mut tables = self.tables.write().await;
        tables.summaries.insert(
            (summary.tenant_id, summary.year, summary.month),
            summary.clone(),
        );
        Ok(())
    }

    async fn monthly_summaries(&self, tenant_id: i64) -> MeterResult<Vec<MonthlyCostSummary>> {
        let tables = self.tables.read().await;
        Ok(tables
            .summaries
            .range((tenant_id, i32::MIN, 0)..=(tenant_id, i32::MAX, u32::MAX))
            .map(|(_, s)| s.clone())
            .collect())
    }
}
