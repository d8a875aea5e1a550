//! Tenant metering library for shared Kubernetes clusters
//!
//! This crate provides the core functionality for:
//! - Reading tenant namespaces, pods, PVCs, ingresses and quotas from the cluster
//! - Resolving per-object discount labels
//! - Aggregating requested CPU, memory, storage and ingress per tenant
//! - Pricing usage with a configurable price table
//! - Persisting cost records and rolling them up into monthly summaries
//! - Health checks, metrics and the tenant authorization gate

pub mod auth;
pub mod cluster;
pub mod cost;
pub mod discount;
pub mod error;
pub mod health;
pub mod ledger;
pub mod models;
pub mod observability;
pub mod settings;
pub mod store;
pub mod usage;

pub use auth::{StaticTokenAuthorizer, TenantAuthorizer, Unauthorized};
pub use cluster::{ClusterInventory, ClusterReader, KubeClusterReader, StaticCluster};
pub use cost::{CostCalculator, PriceTable, TenantCost};
pub use discount::{Discount, DiscountResolver};
pub use error::{MeterError, MeterResult};
pub use health::{Component, ComponentHealth, ComponentStatus, HealthRegistry, HealthReport, Readiness};
pub use ledger::{CostLedger, CyclePhase, LedgerScheduler, MonthlyRollup, SchedulerConfig};
pub use models::*;
pub use observability::{MeterMetrics, StructuredLogger};
pub use settings::{IngressBilling, MeterSettings};
pub use store::{CostStore, MemoryStore};
pub use usage::{IngressHost, MeteredQuantity, ResourceUsage, UsageAggregator, UsageTotals};
