//! Core data models for tenant metering

use crate::error::{MeterError, MeterResult};
use chrono::{DateTime, Datelike, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A tenant known to the cost store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tenant {
    pub id: i64,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// Resource kinds that are priced separately
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CostKind {
    Cpu,
    Memory,
    Storage,
    Ingress,
}

impl CostKind {
    pub const ALL: [CostKind; 4] = [
        CostKind::Cpu,
        CostKind::Memory,
        CostKind::Storage,
        CostKind::Ingress,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CostKind::Cpu => "cpu",
            CostKind::Memory => "memory",
            CostKind::Storage => "storage",
            CostKind::Ingress => "ingress",
        }
    }
}

impl fmt::Display for CostKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for CostKind {
    type Err = MeterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cpu" => Ok(CostKind::Cpu),
            "memory" => Ok(CostKind::Memory),
            "storage" => Ok(CostKind::Storage),
            "ingress" => Ok(CostKind::Ingress),
            other => Err(MeterError::InvalidRecord(format!(
                "unknown cost kind {other:?}"
            ))),
        }
    }
}

/// One point-in-time cost observation for a tenant and resource kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostRecord {
    pub tenant_id: i64,
    pub kind: CostKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_class: Option<String>,
    pub value: f64,
    pub observed_at: DateTime<Utc>,
}

impl CostRecord {
    /// Create a record, enforcing a non-negative finite value and a storage
    /// class on (and only on) storage records
    pub fn new(
        tenant_id: i64,
        kind: CostKind,
        storage_class: Option<String>,
        value: f64,
        observed_at: DateTime<Utc>,
    ) -> MeterResult<Self> {
        if !value.is_finite() || value < 0.0 {
            return Err(MeterError::InvalidRecord(format!(
                "{kind} cost for tenant {tenant_id} must be a non-negative amount, got {value}"
            )));
        }

        match (&kind, storage_class.as_deref()) {
            (CostKind::Storage, None) | (CostKind::Storage, Some("")) => {
                return Err(MeterError::InvalidRecord(format!(
                    "storage cost for tenant {tenant_id} is missing its storage class"
                )));
            }
            (CostKind::Storage, Some(_)) | (_, None) => {}
            (_, Some(_)) => {
                return Err(MeterError::InvalidRecord(format!(
                    "{kind} cost for tenant {tenant_id} cannot carry a storage class"
                )));
            }
        }

        Ok(Self {
            tenant_id,
            kind,
            storage_class,
            value,
            observed_at,
        })
    }
}

/// A calendar month, the unit of the monthly rollup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MonthPeriod {
    pub year: i32,
    pub month: u32,
}

impl MonthPeriod {
    pub fn new(year: i32, month: u32) -> MeterResult<Self> {
        if !(1..=12).contains(&month) {
            return Err(MeterError::InvalidRecord(format!(
                "month must be within 1..=12, got {month}"
            )));
        }
        Ok(Self { year, month })
    }

    /// The month containing `at`
    pub fn containing(at: DateTime<Utc>) -> Self {
        Self {
            year: at.year(),
            month: at.month(),
        }
    }

    /// The calendar month before the one containing `at`
    pub fn previous_to(at: DateTime<Utc>) -> Self {
        Self::containing(at).previous()
    }

    pub fn previous(self) -> Self {
        if self.month == 1 {
            Self {
                year: self.year - 1,
                month: 12,
            }
        } else {
            Self {
                year: self.year,
                month: self.month - 1,
            }
        }
    }

    pub fn next(self) -> Self {
        if self.month == 12 {
            Self {
                year: self.year + 1,
                month: 1,
            }
        } else {
            Self {
                year: self.year,
                month: self.month + 1,
            }
        }
    }

    /// Half-open UTC window `[start, end)` covering the month
    pub fn bounds(self) -> (DateTime<Utc>, DateTime<Utc>) {
        let next = self.next();
        (first_instant(self), first_instant(next))
    }
}

fn first_instant(period: MonthPeriod) -> DateTime<Utc> {
    // Day 1 at midnight exists for every valid month, so this is always Single.
    Utc.with_ymd_and_hms(period.year, period.month, 1, 0, 0, 0)
        .single()
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

impl fmt::Display for MonthPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

/// Averaged monthly costs for one tenant, unique per (tenant, month, year)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyCostSummary {
    pub tenant_id: i64,
    pub month: u32,
    pub year: i32,
    pub cpu_cost: f64,
    pub memory_cost: f64,
    pub storage_cost: f64,
    pub ingress_cost: f64,
    pub total_cost: f64,
}

impl MonthlyCostSummary {
    /// Build a summary whose total is the sum of its parts
    pub fn new(
        tenant_id: i64,
        period: MonthPeriod,
        cpu_cost: f64,
        memory_cost: f64,
        storage_cost: f64,
        ingress_cost: f64,
    ) -> Self {
        Self {
            tenant_id,
            month: period.month,
            year: period.year,
            cpu_cost,
            memory_cost,
            storage_cost,
            ingress_cost,
            total_cost: cpu_cost + memory_cost + storage_cost + ingress_cost,
        }
    }

    pub fn period(&self) -> MonthPeriod {
        MonthPeriod {
            year: self.year,
            month: self.month,
        }
    }
}

/// Hard limits from a tenant's resource quota
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TenantQuota {
    pub cpu_milli: i64,
    pub memory_bytes: i64,
    pub storage_bytes_by_class: BTreeMap<String, i64>,
}
