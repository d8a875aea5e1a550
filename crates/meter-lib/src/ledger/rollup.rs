//! Monthly rollup of cost records into summaries

use crate::error::MeterResult;
use crate::models::{CostKind, CostRecord, MonthPeriod, MonthlyCostSummary};
use crate::store::CostStore;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = values.fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

/// Mean per storage class, summed over classes
fn storage_mean(records: &[CostRecord]) -> f64 {
    let mut by_class: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
    for record in records {
        let class = record.storage_class.as_deref().unwrap_or_default();
        by_class.entry(class).or_default().push(record.value);
    }
    by_class.values().map(|v| mean(v.iter().copied())).sum()
}

#[derive(Clone)]
pub struct MonthlyRollup {
    store: Arc<dyn CostStore>,
}

impl MonthlyRollup {
    pub fn new(store: Arc<dyn CostStore>) -> Self {
        Self { store }
    }

    /// Average `period`'s records for one tenant. No records means zero.
    pub async fn summarize(&self, tenant_id: i64, period: MonthPeriod) -> MeterResult<MonthlyCostSummary> {
        let (from, to) = period.bounds();
        let mut means = BTreeMap::new();

        for kind in CostKind::ALL {
            let records = self.store.cost_records(tenant_id, kind, from, to).await?;
            let value = match kind {
                CostKind::Storage => storage_mean(&records),
                _ => mean(records.iter().map(|r| r.value)),
            };
            debug!(tenant_id, kind = %kind, records = records.len(), mean = value, "Averaged cost records");
            means.insert(kind, value);
        }

        let get = |kind: CostKind| means.get(&kind).copied().unwrap_or_default();
        Ok(MonthlyCostSummary::new(
            tenant_id,
            period,
            get(CostKind::Cpu),
            get(CostKind::Memory),
            get(CostKind::Storage),
            get(CostKind::Ingress),
        ))
    }

    /// Summarise and upsert `period` for every tenant in the store
    pub async fn run(&self, period: MonthPeriod) -> MeterResult<Vec<MonthlyCostSummary>> {
        let tenants = self.store.list_tenants().await?;
        let mut summaries = Vec::with_capacity(tenants.len());

        for tenant in &tenants {
            let summary = self.summarize(tenant.id, period).await?;
            self.store.upsert_monthly_summary(&summary).await?;
            summaries.push(summary);
        }

        Ok(summaries)
    }
}
