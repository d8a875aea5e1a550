//! PostgreSQL cost store.
//!
//! Enable with the `postgres` feature flag.

use super::CostStore;
use crate::error::{MeterError, MeterResult};
use crate::models::{CostKind, CostRecord, MonthlyCostSummary, Tenant};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use std::sync::Arc;
use tracing::info;

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS tenants (
        id BIGSERIAL PRIMARY KEY,
        name TEXT NOT NULL UNIQUE,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS cost_records (
        id BIGSERIAL PRIMARY KEY,
        tenant_id BIGINT NOT NULL REFERENCES tenants (id),
        kind TEXT NOT NULL,
        storage_class TEXT,
        value DOUBLE PRECISION NOT NULL CHECK (value >= 0),
        observed_at TIMESTAMPTZ NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_cost_records_lookup ON cost_records (tenant_id, kind, observed_at)",
    r#"
    CREATE TABLE IF NOT EXISTS monthly_cost_summaries (
        tenant_id BIGINT NOT NULL REFERENCES tenants (id),
        month INTEGER NOT NULL CHECK (month BETWEEN 1 AND 12),
        year INTEGER NOT NULL,
        cpu_cost DOUBLE PRECISION NOT NULL,
        memory_cost DOUBLE PRECISION NOT NULL,
        storage_cost DOUBLE PRECISION NOT NULL,
        ingress_cost DOUBLE PRECISION NOT NULL,
        total_cost DOUBLE PRECISION NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        PRIMARY KEY (tenant_id, month, year)
    )
    "#,
];

pub struct PostgresStore {
    pool: Arc<PgPool>,
}

impl PostgresStore {
    pub async fn connect(database_url: &str) -> MeterResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;
        Ok(Self::with_pool(Arc::new(pool)))
    }

    pub fn with_pool(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Create the tables if they do not exist yet
    pub async fn migrate(&self) -> MeterResult<()> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&*self.pool).await?;
        }
        info!("Cost store schema ready");
        Ok(())
    }
}

fn tenant_from_row(row: &PgRow) -> MeterResult<Tenant> {
    Ok(Tenant {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        created_at: row.try_get("created_at")?,
    })
}

fn record_from_row(row: &PgRow) -> MeterResult<CostRecord> {
    let kind: String = row.try_get("kind")?;
    CostRecord::new(
        row.try_get("tenant_id")?,
        kind.parse()?,
        row.try_get("storage_class")?,
        row.try_get("value")?,
        row.try_get("observed_at")?,
    )
}

fn summary_from_row(row: &PgRow) -> MeterResult<MonthlyCostSummary> {
    let month: i32 = row.try_get("month")?;
    Ok(MonthlyCostSummary {
        tenant_id: row.try_get("tenant_id")?,
        month: u32::try_from(month)
            .map_err(|_| MeterError::InvalidRecord(format!("stored month {month} is negative")))?,
        year: row.try_get("year")?,
        cpu_cost: row.try_get("cpu_cost")?,
        memory_cost: row.try_get("memory_cost")?,
        storage_cost: row.try_get("storage_cost")?,
        ingress_cost: row.try_get("ingress_cost")?,
        total_cost: row.try_get("total_cost")?,
    })
}

#[async_trait]
impl CostStore for PostgresStore {
    fn name(&self) -> &str {
        "postgres"
    }

    async fn ensure_tenant(&self, name: &str) -> MeterResult<Tenant> {
        let row = sqlx::query(
            r#"
            INSERT INTO tenants (name) VALUES ($1)
            ON CONFLICT (name) DO UPDATE SET name = EXCLUDED.name
            RETURNING id, name, created_at
            "#,
        )
        .bind(name)
        .fetch_one(&*self.pool)
        .await?;

        tenant_from_row(&row)
    }

    async fn find_tenant(&self, name: &str) -> MeterResult<Option<Tenant>> {
        let row = sqlx::query("SELECT id, name, created_at FROM tenants WHERE name = $1")
            .bind(name)
            .fetch_optional(&*self.pool)
            .await?;

        row.as_ref().map(tenant_from_row).transpose()
    }

    async fn list_tenants(&self) -> MeterResult<Vec<Tenant>> {
        let rows = sqlx::query("SELECT id, name, created_at FROM tenants ORDER BY id")
            .fetch_all(&*self.pool)
            .await?;

        rows.iter().map(tenant_from_row).collect()
    }

    async fn insert_cost_records(&self, records: &[CostRecord]) -> MeterResult<()> {
        let mut tx = self.pool.begin().await?;

        for record in records {
            sqlx::query(
                r#"
                INSERT INTO cost_records (tenant_id, kind, storage_class, value, observed_at)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(record.tenant_id)
            .bind(record.kind.as_str())
            .bind(record.storage_class.as_deref())
            .bind(record.value)
            .bind(record.observed_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn cost_records(
        &self,
        tenant_id: i64,
        kind: CostKind,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> MeterResult<Vec<CostRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT tenant_id, kind, storage_class, value, observed_at
            FROM cost_records
            WHERE tenant_id = $1 AND kind = $2 AND observed_at >= $3 AND observed_at < $4
            ORDER BY observed_at
            "#,
        )
        .bind(tenant_id)
        .bind(kind.as_str())
        .bind(from)
        .bind(to)
        .fetch_all(&*self.pool)
        .await?;

        rows.iter().map(record_from_row).collect()
    }

    async fn upsert_monthly_summary(&self, summary: &MonthlyCostSummary) -> MeterResult<()> {
        let month = i32::try_from(summary.month)
            .map_err(|_| MeterError::InvalidRecord(format!("month {} out of range", summary.month)))?;

        sqlx::query(
            r#"
            INSERT INTO monthly_cost_summaries
                (tenant_id, month, year, cpu_cost, memory_cost, storage_cost, ingress_cost, total_cost)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (tenant_id, month, year) DO UPDATE SET
                cpu_cost = EXCLUDED.cpu_cost,
                memory_cost = EXCLUDED.memory_cost,
                storage_cost = EXCLUDED.storage_cost,
                ingress_cost = EXCLUDED.ingress_cost,
                total_cost = EXCLUDED.total_cost,
                updated_at = NOW()
            "#,
        )
        .bind(summary.tenant_id)
        .bind(month)
        .bind(summary.year)
        .bind(summary.cpu_cost)
        .bind(summary.memory_cost)
        .bind(summary.storage_cost)
        .bind(summary.ingress_cost)
        .bind(summary.total_cost)
        .execute(&*self.pool)
        .await?;

        Ok(())
    }

    async fn monthly_summaries(&self, tenant_id: i64) -> MeterResult<Vec<MonthlyCostSummary>> {
        let rows = sqlx::query(
            r#"
            SELECT tenant_id, month, year, cpu_cost, memory_cost, storage_cost, ingress_cost, total_cost
            FROM monthly_cost_summaries
            WHERE tenant_id = $1
            ORDER BY year, month
            "#,
        )
        .bind(tenant_id)
        .fetch_all(&*self.pool)
        .await?;

        rows.iter().map(summary_from_row).collect()
    }

    async fn ping(&self) -> MeterResult<()> {
        sqlx::query("SELECT 1").execute(&*self.pool).await?;
        Ok(())
    }
}
