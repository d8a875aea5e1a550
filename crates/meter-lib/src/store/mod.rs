//! Cost store backends
//!
//! Tenants, point-in-time cost records and monthly summaries live behind the
//! [`CostStore`] trait. [`MemoryStore`] keeps everything in process;
//! `PostgresStore` (feature `postgres`) persists to PostgreSQL.

mod memory;
#[cfg(feature = "postgres")]
mod postgres;

pub use memory::MemoryStore;
#[cfg(feature = "postgres")]
pub use postgres::PostgresStore;

use crate::error::MeterResult;
use crate::models::{CostKind, CostRecord, MonthlyCostSummary, Tenant};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

#[async_trait]
pub trait CostStore: Send + Sync {
    fn name(&self) -> &str;

    /// Look a tenant up by name, creating it if absent
    async fn ensure_tenant(&self, name: &str) -> MeterResult<Tenant>;

    async fn find_tenant(&self, name: &str) -> MeterResult<Option<Tenant>>;

    /// All tenants, ordered by id
    async fn list_tenants(&self) -> MeterResult<Vec<Tenant>>;

    /// Write records atomically: either all of them are stored or none
    async fn insert_cost_records(&self, records: &[CostRecord]) -> MeterResult<()>;

    /// Records of one tenant and kind observed within `[from, to)`
    async fn cost_records(
        &self,
        tenant_id: i64,
        kind: CostKind,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> MeterResult<Vec<CostRecord>>;

    /// Insert or replace the summary keyed by (tenant, month, year)
    async fn upsert_monthly_summary(&self, summary: &MonthlyCostSummary) -> MeterResult<()>;

    /// A tenant's summaries, oldest month first
    async fn monthly_summaries(&self, tenant_id: i64) -> MeterResult<Vec<MonthlyCostSummary>>;

    /// Cheap reachability check, used by readiness
    async fn ping(&self) -> MeterResult<()> {
        Ok(())
    }
}
