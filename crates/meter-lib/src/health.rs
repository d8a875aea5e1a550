//! Health of the meter's dependencies, served by `/healthz` and `/readyz`
//!
//! Cluster and store entries follow the outcome of the last call made to them
//! by the API or the scheduler. The store is also pinged on every readiness
//! check, so an idle replica still notices a lost database.

use crate::error::MeterResult;
use crate::store::CostStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::warn;

/// What the meter depends on
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Component {
    /// Kubernetes API reads
    Cluster,
    /// Cost store reads, writes and pings
    Store,
    /// Periodic persistence and rollup
    Scheduler,
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Component::Cluster => "cluster",
            Component::Store => "store",
            Component::Scheduler => "scheduler",
        })
    }
}

/// Ordered from best to worst; the overall status is the worst component
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    Healthy,
    /// Last call failed with a retryable error
    Degraded,
    Unhealthy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: ComponentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub checked_at: DateTime<Utc>,
}

impl ComponentHealth {
    fn new(status: ComponentStatus, message: Option<String>) -> Self {
        Self {
            status,
            message,
            checked_at: Utc::now(),
        }
    }
}

/// Body of `/healthz`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: ComponentStatus,
    pub components: BTreeMap<Component, ComponentHealth>,
}

/// Body of `/readyz`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Readiness {
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Default)]
struct State {
    components: BTreeMap<Component, ComponentHealth>,
    ready: bool,
}

/// Shared handle; clones see the same state
#[derive(Debug, Clone, Default)]
pub struct HealthRegistry {
    state: Arc<RwLock<State>>,
}

impl HealthRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking `component` as healthy
    pub async fn register(&self, component: Component) {
        self.set(component, ComponentStatus::Healthy, None).await;
    }

    pub async fn set_healthy(&self, component: Component) {
        self.set(component, ComponentStatus::Healthy, None).await;
    }

    pub async fn set_degraded(&self, component: Component, message: impl Into<String>) {
        self.set(component, ComponentStatus::Degraded, Some(message.into()))
            .await;
    }

    /// Healthy on success; degraded for retryable errors, unhealthy otherwise
    pub async fn record<T>(&self, component: Component, result: &MeterResult<T>) {
        match result {
            Ok(_) => self.set_healthy(component).await,
            Err(e) if e.is_retryable() => self.set_degraded(component, e.to_string()).await,
            Err(e) => {
                self.set(component, ComponentStatus::Unhealthy, Some(e.to_string()))
                    .await
            }
        }
    }

    /// Ping the store. An unreachable store is unhealthy, not merely degraded.
    pub async fn check_store(&self, store: &dyn CostStore) -> bool {
        match store.ping().await {
            Ok(()) => {
                self.set_healthy(Component::Store).await;
                true
            }
            Err(e) => {
                warn!(store = store.name(), error = %e, "Cost store ping failed");
                self.set(
                    Component::Store,
                    ComponentStatus::Unhealthy,
                    Some(format!("ping failed: {e}")),
                )
                .await;
                false
            }
        }
    }

    pub async fn set_ready(&self, ready: bool) {
        self.state.write().await.ready = ready;
    }

    pub async fn health(&self) -> HealthReport {
        let state = self.state.read().await;
        let status = state
            .components
            .values()
            .map(|c| c.status)
            .max()
            .unwrap_or(ComponentStatus::Healthy);

        HealthReport {
            status,
            components: state.components.clone(),
        }
    }

    /// Ready once startup finished and no component is unhealthy
    pub async fn readiness(&self) -> Readiness {
        let state = self.state.read().await;
        if !state.ready {
            return Readiness {
                ready: false,
                reason: Some("meter not yet initialized".to_string()),
            };
        }

        let unhealthy = state
            .components
            .iter()
            .find(|(_, health)| health.status == ComponentStatus::Unhealthy);

        match unhealthy {
            Some((component, health)) => Readiness {
                ready: false,
                reason: Some(format!(
                    "{component} unhealthy: {}",
                    health.message.as_deref().unwrap_or("no detail")
                )),
            },
            None => Readiness {
                ready: true,
                reason: None,
            },
        }
    }

    async fn set(&self, component: Component, status: ComponentStatus, message: Option<String>) {
        self.state
            .write()
            .await
            .components
            .insert(component, ComponentHealth::new(status, message));
    }
}
