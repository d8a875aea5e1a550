//! Cost persistence and monthly rollup
//!
//! This module provides:
//! - [`CostLedger`]: one persistence cycle (discover, aggregate, price, write)
//! - [`MonthlyRollup`]: averages the previous month's records into summaries
//! - [`LedgerScheduler`]: runs both on a fixed interval until shutdown
//!
//! A cycle moves through `Idle → CollectingUsage → ComputingCost → Persisting`,
//! adding `RollingUp` when a month has not been summarised yet, and returns to
//! `Idle` whether it succeeds or fails.

mod cycle;
mod rollup;
mod scheduler;


pub use cycle::{CostLedger, CycleReport};
pub use rollup::MonthlyRollup;
pub use scheduler::{LedgerScheduler, SchedulerConfig};

use serde::Serialize;
use std::fmt;

/// Where the scheduled job currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CyclePhase {
    #[default]
    Idle,
    CollectingUsage,
    ComputingCost,
    Persisting,
    RollingUp,
}

impl CyclePhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            CyclePhase::Idle => "idle",
            CyclePhase::CollectingUsage => "collecting_usage",
            CyclePhase::ComputingCost => "computing_cost",
            CyclePhase::Persisting => "persisting",
            CyclePhase::RollingUp => "rolling_up",
        }
    }
}

impl fmt::Display for CyclePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
