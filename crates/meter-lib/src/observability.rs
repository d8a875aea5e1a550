//! Observability for the tenant meter
//!
//! Provides:
//! - Prometheus metrics (cycle and rollup latency, tenants metered, records written, errors)
//! - Structured lifecycle events with tracing

use prometheus::{
    register_histogram, register_int_counter, register_int_gauge, Histogram, IntCounter, IntGauge,
};
use std::sync::OnceLock;
use tracing::{error, info};

/// Histogram buckets for cycle latencies (in seconds); a cycle lists every tenant
const CYCLE_BUCKETS: &[f64] = &[0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0];

static GLOBAL_METRICS: OnceLock<MeterMetricsInner> = OnceLock::new();

struct MeterMetricsInner {
    cycle_latency_seconds: Histogram,
    rollup_latency_seconds: Histogram,
    tenants_metered: IntGauge,
    cost_records_written: IntCounter,
    cycle_errors: IntCounter,
    invalid_discounts: IntCounter,
    cluster_read_errors: IntCounter,
}

impl MeterMetricsInner {
    fn new() -> Self {
        Self {
            cycle_latency_seconds: register_histogram!(
                "tenant_meter_cycle_latency_seconds",
                "Time spent collecting, pricing and persisting one cost cycle",
                CYCLE_BUCKETS.to_vec()
            )
            .expect("Failed to register cycle_latency_seconds"),

            rollup_latency_seconds: register_histogram!(
                "tenant_meter_rollup_latency_seconds",
                "Time spent computing and storing monthly summaries",
                CYCLE_BUCKETS.to_vec()
            )
            .expect("Failed to register rollup_latency_seconds"),

            tenants_metered: register_int_gauge!(
                "tenant_meter_tenants_metered",
                "Number of tenants priced in the last cost cycle"
            )
            .expect("Failed to register tenants_metered"),

            cost_records_written: register_int_counter!(
                "tenant_meter_cost_records_written_total",
                "Total number of cost records persisted"
            )
            .expect("Failed to register cost_records_written"),

            cycle_errors: register_int_counter!(
                "tenant_meter_cycle_errors_total",
                "Total number of failed cost cycles and rollups"
            )
            .expect("Failed to register cycle_errors"),

            invalid_discounts: register_int_counter!(
                "tenant_meter_invalid_discounts_total",
                "Total number of discount labels ignored as invalid"
            )
            .expect("Failed to register invalid_discounts"),

            cluster_read_errors: register_int_counter!(
                "tenant_meter_cluster_read_errors_total",
                "Total number of failed Kubernetes API reads"
            )
            .expect("Failed to register cluster_read_errors"),
        }
    }
}

/// Handle to the process-wide meter metrics.
///
/// Clones share the same underlying collectors.
#[derive(Clone)]
pub struct MeterMetrics {
    _private: (),
}

impl Default for MeterMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl MeterMetrics {
    /// Create a handle, registering the collectors on first use
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(MeterMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &MeterMetricsInner {
        GLOBAL_METRICS.get_or_init(MeterMetricsInner::new)
    }

    pub fn observe_cycle_latency(&self, duration_secs: f64) {
        self.inner().cycle_latency_seconds.observe(duration_secs);
    }

    pub fn observe_rollup_latency(&self, duration_secs: f64) {
        self.inner().rollup_latency_seconds.observe(duration_secs);
    }

    pub fn set_tenants_metered(&self, count: i64) {
        self.inner().tenants_metered.set(count);
    }

    pub fn add_cost_records_written(&self, count: u64) {
        self.inner().cost_records_written.inc_by(count);
    }

    pub fn inc_cycle_errors(&self) {
        self.inner().cycle_errors.inc();
    }

    pub fn inc_invalid_discounts(&self) {
        self.inner().invalid_discounts.inc();
    }

    pub fn inc_cluster_read_errors(&self) {
        self.inner().cluster_read_errors.inc();
    }
}

/// Fixed-shape lifecycle events, each tagged with an `event` field
#[derive(Clone)]
pub struct StructuredLogger {
    instance: String,
}

impl StructuredLogger {
    pub fn new(instance: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
        }
    }

    pub fn log_startup(&self, version: &str, store: &str, persistence_enabled: bool) {
        info!(
            event = "meter_started",
            instance = %self.instance,
            version = %version,
            store = %store,
            persistence_enabled = persistence_enabled,
            "Tenant meter started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "meter_shutdown",
            instance = %self.instance,
            reason = %reason,
            "Tenant meter shutting down"
        );
    }

    pub fn log_cycle_completed(&self, tenants: usize, records: usize, elapsed_ms: u128) {
        info!(
            event = "cost_cycle_completed",
            instance = %self.instance,
            tenants = tenants,
            records = records,
            elapsed_ms = elapsed_ms,
            "Cost cycle completed"
        );
    }

    /// `phase` is where the cycle stopped, `persisted` how many tenants were already written
    pub fn log_cycle_failed(&self, phase: &str, persisted: usize, error: &str) {
        error!(
            event = "cost_cycle_failed",
            instance = %self.instance,
            phase = %phase,
            persisted_tenants = persisted,
            error = %error,
            "Cost cycle failed"
        );
    }

    pub fn log_rollup_completed(&self, period: &str, summaries: usize) {
        info!(
            event = "monthly_rollup_completed",
            instance = %self.instance,
            period = %period,
            summaries = summaries,
            "Monthly rollup completed"
        );
    }
}
