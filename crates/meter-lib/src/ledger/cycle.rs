//! One persistence cycle

use super::CyclePhase;
use crate::cost::{CostCalculator, TenantCost};
use crate::error::MeterResult;
use crate::models::{CostKind, CostRecord, Tenant};
use crate::observability::{MeterMetrics, StructuredLogger};
use crate::store::CostStore;
use crate::usage::UsageAggregator;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::debug;

/// Outcome of a successful cycle
#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    pub tenants: usize,
    pub records_written: usize,
    pub observed_at: DateTime<Utc>,
}

/// Writes point-in-time cost records for every known tenant
pub struct CostLedger {
    aggregator: UsageAggregator,
    calculator: CostCalculator,
    store: Arc<dyn CostStore>,
    /// Current phase; readable through `phase()` without any receiver attached
    phase: watch::Sender<CyclePhase>,
    logger: StructuredLogger,
    metrics: MeterMetrics,
}

impl CostLedger {
    pub fn new(
        aggregator: UsageAggregator,
        calculator: CostCalculator,
        store: Arc<dyn CostStore>,
        logger: StructuredLogger,
    ) -> Self {
        let (phase, _) = watch::channel(CyclePhase::Idle);
        Self {
            aggregator,
            calculator,
            store,
            phase,
            logger,
            metrics: MeterMetrics::new(),
        }
    }

    pub fn store(&self) -> &Arc<dyn CostStore> {
        &self.store
    }

    pub fn phase(&self) -> CyclePhase {
        *self.phase.borrow()
    }

    pub(crate) fn set_phase(&self, phase: CyclePhase) {
        debug!(phase = %phase, "Cycle phase");
        self.phase.send_replace(phase);
    }

    /// Run one cycle stamped with `observed_at`.
    ///
    /// The first error stops the cycle. Tenants written before it stay written.
    pub async fn run_cycle(&self, observed_at: DateTime<Utc>) -> MeterResult<CycleReport> {
        let start = Instant::now();
        let mut persisted = 0;

        let result = self.collect_and_persist(observed_at, &mut persisted).await;
        match &result {
            Ok(report) => {
                self.metrics.observe_cycle_latency(start.elapsed().as_secs_f64());
                self.metrics.set_tenants_metered(report.tenants as i64);
                self.logger.log_cycle_completed(
                    report.tenants,
                    report.records_written,
                    start.elapsed().as_millis(),
                );
            }
            Err(e) => {
                self.metrics.inc_cycle_errors();
                self.logger
                    .log_cycle_failed(self.phase().as_str(), persisted, &e.to_string());
            }
        }

        self.set_phase(CyclePhase::Idle);
        result
    }

    async fn collect_and_persist(
        &self,
        observed_at: DateTime<Utc>,
        persisted: &mut usize,
    ) -> MeterResult<CycleReport> {
        self.set_phase(CyclePhase::CollectingUsage);
        let tenants = self.known_tenants().await?;
        let names: Vec<String> = tenants.iter().map(|t| t.name.clone()).collect();
        let usage = self.aggregator.usage(&names).await?;

        self.set_phase(CyclePhase::ComputingCost);
        let costs = usage
            .iter()
            .map(|u| self.calculator.tenant_cost(u))
            .collect::<MeterResult<Vec<_>>>()?;

        self.set_phase(CyclePhase::Persisting);
        let mut written = 0;
        for (tenant, cost) in tenants.iter().zip(&costs) {
            let records = cost_records(tenant.id, cost, observed_at)?;
            self.store.insert_cost_records(&records).await?;
            self.metrics.add_cost_records_written(records.len() as u64);
            written += records.len();
            *persisted += 1;
        }

        Ok(CycleReport {
            tenants: tenants.len(),
            records_written: written,
            observed_at,
        })
    }

    /// Register newly discovered tenants, then return every tenant the store knows
    async fn known_tenants(&self) -> MeterResult<Vec<Tenant>> {
        let discovered = self.aggregator.inventory().discover_tenants().await?;
        for name in &discovered {
            self.store.ensure_tenant(name).await?;
        }
        self.store.list_tenants().await
    }
}

/// cpu, memory and ingress records always; one storage record per class in use
pub fn cost_records(
    tenant_id: i64,
    cost: &TenantCost,
    observed_at: DateTime<Utc>,
) -> MeterResult<Vec<CostRecord>> {
    let mut records = vec![
        CostRecord::new(tenant_id, CostKind::Cpu, None, cost.cpu, observed_at)?,
        CostRecord::new(tenant_id, CostKind::Memory, None, cost.memory, observed_at)?,
        CostRecord::new(tenant_id, CostKind::Ingress, None, cost.ingress, observed_at)?,
    ];
    for (class, value) in &cost.storage {
        records.push(CostRecord::new(
            tenant_id,
            CostKind::Storage,
            Some(class.clone()),
            *value,
            observed_at,
        )?);
    }
    Ok(records)
}
