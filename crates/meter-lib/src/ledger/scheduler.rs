//! Periodic persistence loop
//!
//! Runs a cost cycle on every tick and, once per calendar month, the rollup of
//! the month before. Ticks never overlap: a slow cycle delays the next tick
//! instead of racing it.

use super::{CostLedger, CyclePhase, MonthlyRollup};
use crate::error::{MeterError, MeterResult};
use crate::health::{Component, HealthRegistry};
use crate::models::MonthPeriod;
use crate::observability::{MeterMetrics, StructuredLogger};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Configuration for the persistence loop
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Time between cost cycles (default: 1 hour)
    pub interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(3600),
        }
    }
}

/// Drives [`CostLedger`] and [`MonthlyRollup`] on a timer
pub struct LedgerScheduler {
    ledger: Arc<CostLedger>,
    rollup: MonthlyRollup,
    config: SchedulerConfig,
    health: HealthRegistry,
    logger: StructuredLogger,
    metrics: MeterMetrics,
    /// Last month whose summaries were written by this process
    last_rollup: Option<MonthPeriod>,
}

impl LedgerScheduler {
    pub fn new(
        ledger: Arc<CostLedger>,
        config: SchedulerConfig,
        health: HealthRegistry,
        logger: StructuredLogger,
    ) -> Self {
        let rollup = MonthlyRollup::new(ledger.store().clone());
        Self {
            ledger,
            rollup,
            config,
            health,
            logger,
            metrics: MeterMetrics::new(),
            last_rollup: None,
        }
    }

    pub fn last_rollup(&self) -> Option<MonthPeriod> {
        self.last_rollup
    }

    /// Run until `shutdown` fires. Errors are logged; the next tick still runs.
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        info!(
            interval_secs = self.config.interval.as_secs(),
            "Starting cost persistence loop"
        );
        self.health.register(Component::Scheduler).await;

        let mut ticker = interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.tick(Utc::now()).await {
                        warn!(error = %e, "Cost persistence tick failed, retrying next interval");
                    }
                }
                _ = shutdown.recv() => {
                    info!("Shutting down cost persistence loop");
                    break;
                }
            }
        }
    }

    /// One cycle, followed by the rollup of the previous month if it is due
    pub async fn tick(&mut self, now: DateTime<Utc>) -> MeterResult<()> {
        let cycle = self.ledger.run_cycle(now).await;
        self.report(&cycle).await;
        cycle?;

        let period = MonthPeriod::previous_to(now);
        if self.last_rollup == Some(period) {
            debug!(period = %period, "Rollup already done for this month");
            return Ok(());
        }

        let rollup = self.roll_up(period).await;
        self.report(&rollup).await;
        rollup?;
        self.last_rollup = Some(period);
        Ok(())
    }

    async fn roll_up(&self, period: MonthPeriod) -> MeterResult<usize> {
        let start = Instant::now();
        self.ledger.set_phase(CyclePhase::RollingUp);
        let result = self.rollup.run(period).await;
        self.ledger.set_phase(CyclePhase::Idle);

        match result {
            Ok(summaries) => {
                self.metrics.observe_rollup_latency(start.elapsed().as_secs_f64());
                self.logger
                    .log_rollup_completed(&period.to_string(), summaries.len());
                Ok(summaries.len())
            }
            Err(e) => {
                self.metrics.inc_cycle_errors();
                warn!(period = %period, error = %e, "Monthly rollup failed");
                Err(e)
            }
        }
    }

    /// Reflect an outcome in the health registry
    async fn report<T>(&self, result: &MeterResult<T>) {
        match result {
            Ok(_) => {
                self.health.set_healthy(Component::Scheduler).await;
                self.health.set_healthy(Component::Cluster).await;
                self.health.set_healthy(Component::Store).await;
            }
            Err(e) => {
                let component = component_for(e);
                self.health.record(component, result).await;
                if component != Component::Scheduler {
                    self.health
                        .set_degraded(Component::Scheduler, format!("last run failed: {e}"))
                        .await;
                }
            }
        }
    }
}

/// Component a failure is attributed to
fn component_for(err: &MeterError) -> Component {
    match err {
        MeterError::ClusterRead { .. } => Component::Cluster,
        MeterError::Persistence(_) => Component::Store,
        _ => Component::Scheduler,
    }
}
