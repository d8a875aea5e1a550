//! tenant-meter - per-tenant cost metering for shared Kubernetes clusters
//!
//! Runs as a single Deployment, reading the cluster through the API server and
//! answering cost queries authorized by bearer token.

use anyhow::{Context, Result};
use meter_lib::{
    health::{Component, HealthRegistry},
    store::PostgresStore,
    ClusterInventory, CostCalculator, CostLedger, CostStore, KubeClusterReader, LedgerScheduler,
    MemoryStore, MeterMetrics, SchedulerConfig, StructuredLogger,
    UsageAggregator,
};
use std::sync::Arc;
use tenant_meter::{api, config::ServiceConfig};
use tokio::sync::broadcast;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const METER_VERSION: &str = env!("CARGO_PKG_VERSION");

async fn open_store(config: &ServiceConfig) -> Result<Arc<dyn CostStore>> {
    match config.persistence.database_url.as_deref() {
        Some(url) if !url.is_empty() => {
            let store = PostgresStore::connect(url)
                .await
                .context("failed to connect to the cost database")?;
            store.migrate().await.context("failed to create cost tables")?;
            Ok(Arc::new(store))
        }
        _ => {
            if config.persistence.enabled {
                warn!("No database_url configured, cost history is kept in memory only");
            }
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting tenant-meter");

    let config = ServiceConfig::load()?;
    let settings = Arc::new(config.settings());
    info!(
        instance = %config.instance,
        tenant_label = %settings.tenant_label,
        ingress_billing = ?settings.ingress_billing,
        "Meter configured"
    );

    let health_registry = HealthRegistry::new();
    health_registry.register(Component::Cluster).await;

    let _metrics = MeterMetrics::new();
    let logger = StructuredLogger::new(&config.instance);

    let reader = KubeClusterReader::try_default()
        .await?
        .with_request_timeout(config.request_timeout());
    let inventory = ClusterInventory::new(Arc::new(reader), settings.clone());

    // Every storage class in the cluster must carry a price
    let prices = Arc::new(config.prices.clone());
    let catalog = inventory.storage_classes().await?;
    prices.ensure_covers(&catalog)?;

    let store = open_store(&config).await?;
    if !health_registry.check_store(store.as_ref()).await {
        warn!(store = store.name(), "Cost store unreachable at startup, readiness will fail until it answers");
    }
    logger.log_startup(METER_VERSION, store.name(), config.persistence.enabled);

    let aggregator = UsageAggregator::new(inventory);
    let calculator = CostCalculator::new(prices, settings.ingress_billing);

    let authorizer = config.auth.authorizer();
    if authorizer.token_count() == 0 {
        warn!("No API tokens configured, every tenant request will be rejected");
    }

    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    let scheduler_handle = if config.persistence.enabled {
        let ledger = Arc::new(CostLedger::new(
            aggregator.clone(),
            calculator.clone(),
            store.clone(),
            logger.clone(),
        ));
        let scheduler = LedgerScheduler::new(
            ledger,
            SchedulerConfig {
                interval: config.persistence.interval(),
            },
            health_registry.clone(),
            logger.clone(),
        );
        Some(tokio::spawn(scheduler.run(shutdown_tx.subscribe())))
    } else {
        info!("Cost persistence disabled");
        None
    };

    let app_state = Arc::new(api::AppState::new(
        Arc::new(authorizer),
        aggregator,
        calculator,
        store,
        health_registry.clone(),
    ));

    health_registry.set_ready(true).await;

    let mut api_shutdown = shutdown_tx.subscribe();
    let api_handle = tokio::spawn(api::serve(config.api_port, app_state, async move {
        let _ = api_shutdown.recv().await;
    }));

    tokio::signal::ctrl_c().await?;
    logger.log_shutdown("SIGINT received");
    health_registry.set_ready(false).await;
    let _ = shutdown_tx.send(());

    if let Some(handle) = scheduler_handle {
        let _ = handle.await;
    }
    api_handle.await??;

    info!("Shut down");
    Ok(())
}
