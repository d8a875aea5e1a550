//! HTTP API for tenant costs, raw requests, quotas, health checks and metrics
//!
//! Every `/api/v1` route resolves the bearer token to the caller's tenants
//! first. Routes without a tenant segment answer for all of them; routes with
//! one answer for that tenant only and return 403 if it is not authorized.

use axum::{
    extract::{Path, Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use meter_lib::{
    health::{Component, ComponentStatus, HealthRegistry},
    ClusterInventory, CostCalculator, CostKind, CostStore, MeterError, MeterResult,
    MonthlyCostSummary, TenantAuthorizer, UsageAggregator,
};
use prometheus::{Encoder, TextEncoder};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, error, info};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub authorizer: Arc<dyn TenantAuthorizer>,
    pub aggregator: UsageAggregator,
    pub calculator: CostCalculator,
    pub store: Arc<dyn CostStore>,
    pub health_registry: HealthRegistry,
}

impl AppState {
    pub fn new(
        authorizer: Arc<dyn TenantAuthorizer>,
        aggregator: UsageAggregator,
        calculator: CostCalculator,
        store: Arc<dyn CostStore>,
        health_registry: HealthRegistry,
    ) -> Self {
        Self {
            authorizer,
            aggregator,
            calculator,
            store,
            health_registry,
        }
    }

    fn inventory(&self) -> &ClusterInventory {
        self.aggregator.inventory()
    }

    /// Record the outcome of a cluster read in the health registry
    async fn cluster_result<T>(&self, result: MeterResult<T>) -> Result<T, ApiError> {
        self.health_registry.record(Component::Cluster, &result).await;
        result.map_err(ApiError::from)
    }

    async fn store_result<T>(&self, result: MeterResult<T>) -> Result<T, ApiError> {
        self.health_registry.record(Component::Store, &result).await;
        result.map_err(ApiError::from)
    }
}

/// API failures; bodies are `{"message": ...}` and never carry internal detail
#[derive(Debug)]
pub enum ApiError {
    Unauthorized,
    Forbidden,
    NotFound,
    Internal(String),
}

impl From<MeterError> for ApiError {
    fn from(err: MeterError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized"),
            ApiError::Forbidden => (StatusCode::FORBIDDEN, "Forbidden"),
            ApiError::NotFound => (StatusCode::NOT_FOUND, "Not Found"),
            ApiError::Internal(detail) => {
                error!(error = %detail, "Request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
            }
        };
        (status, Json(json!({ "message": message }))).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
}

/// All tenants the caller may read
async fn authorized(state: &AppState, headers: &HeaderMap) -> ApiResult<Vec<String>> {
    let tenants = state
        .authorizer
        .resolve_tenants(bearer_token(headers))
        .await
        .map_err(|e| {
            debug!(reason = %e, "Rejected request");
            ApiError::Unauthorized
        })?;

    if tenants.is_empty() {
        return Err(ApiError::Unauthorized);
    }
    Ok(tenants)
}

/// `[tenant]` if the caller may read it
async fn authorized_tenant(
    state: &AppState,
    headers: &HeaderMap,
    tenant: &str,
) -> ApiResult<Vec<String>> {
    let tenants = authorized(state, headers).await?;
    if !tenants.iter().any(|t| t == tenant) {
        return Err(ApiError::Forbidden);
    }
    Ok(vec![tenant.to_string()])
}

fn cost_kind(kind: &str) -> ApiResult<CostKind> {
    kind.parse().map_err(|_| ApiError::NotFound)
}

/// Value a single-tenant route returns when the tenant is absent from the map
fn empty_value(kind: CostKind) -> Value {
    match kind {
        CostKind::Storage => json!({}),
        _ => json!(0),
    }
}

async fn tenants(State(state): State<Arc<AppState>>, headers: HeaderMap) -> ApiResult<Json<Vec<String>>> {
    Ok(Json(authorized(&state, &headers).await?))
}

/// Costs per tenant. Zero cpu, memory and ingress costs and tenants without
/// PVCs are left out.
async fn cost_map(state: &AppState, kind: CostKind, tenants: &[String]) -> ApiResult<BTreeMap<String, Value>> {
    let calc = &state.calculator;
    let agg = &state.aggregator;

    let map = match kind {
        CostKind::Cpu => state
            .cluster_result(agg.cpu_by_tenant(tenants).await)
            .await?
            .into_iter()
            .map(|(t, q)| (t, calc.cpu(&q)))
            .filter(|(_, cost)| *cost != 0.0)
            .map(|(t, cost)| (t, json!(cost)))
            .collect(),
        CostKind::Memory => state
            .cluster_result(agg.memory_by_tenant(tenants).await)
            .await?
            .into_iter()
            .map(|(t, q)| (t, calc.memory(&q)))
            .filter(|(_, cost)| *cost != 0.0)
            .map(|(t, cost)| (t, json!(cost)))
            .collect(),
        CostKind::Storage => {
            let usage = state
                .cluster_result(agg.storage_by_tenant(tenants).await)
                .await?;
            let mut map = BTreeMap::new();
            for (tenant, by_class) in usage {
                map.insert(tenant, json!(calc.storage(&by_class)?));
            }
            map
        }
        CostKind::Ingress => state
            .cluster_result(agg.ingress_by_tenant(tenants).await)
            .await?
            .into_iter()
            .map(|(t, hosts)| (t, calc.ingress(&hosts)))
            .filter(|(_, cost)| *cost != 0.0)
            .map(|(t, cost)| (t, json!(cost)))
            .collect(),
    };
    Ok(map)
}

async fn costs(
    State(state): State<Arc<AppState>>,
    Path(kind): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Json<BTreeMap<String, Value>>> {
    let kind = cost_kind(&kind)?;
    let tenants = authorized(&state, &headers).await?;
    Ok(Json(cost_map(&state, kind, &tenants).await?))
}

async fn tenant_costs(
    State(state): State<Arc<AppState>>,
    Path((tenant, kind)): Path<(String, String)>,
    headers: HeaderMap,
) -> ApiResult<Json<Value>> {
    let kind = cost_kind(&kind)?;
    let tenants = authorized_tenant(&state, &headers, &tenant).await?;
    let mut map = cost_map(&state, kind, &tenants).await?;
    Ok(Json(map.remove(&tenant).unwrap_or_else(|| empty_value(kind))))
}

/// Undiscounted requests per tenant: millicores, bytes, bytes per class, hostnames
async fn request_map(state: &AppState, kind: CostKind, tenants: &[String]) -> ApiResult<BTreeMap<String, Value>> {
    let agg = &state.aggregator;

    let map = match kind {
        CostKind::Cpu => state
            .cluster_result(agg.cpu_by_tenant(tenants).await)
            .await?
            .into_iter()
            .map(|(t, q)| (t, json!(q.total())))
            .collect(),
        CostKind::Memory => state
            .cluster_result(agg.memory_by_tenant(tenants).await)
            .await?
            .into_iter()
            .map(|(t, q)| (t, json!(q.total())))
            .collect(),
        CostKind::Storage => state
            .cluster_result(agg.storage_by_tenant(tenants).await)
            .await?
            .into_iter()
            .map(|(t, by_class)| (t, json!(meter_lib::usage::storage_totals(&by_class))))
            .collect(),
        CostKind::Ingress => state
            .cluster_result(agg.ingress_by_tenant(tenants).await)
            .await?
            .into_iter()
            .map(|(t, hosts)| {
                let names: Vec<String> = hosts.into_iter().map(|h| h.hostname).collect();
                (t, json!(names))
            })
            .collect(),
    };
    Ok(map)
}

async fn requests(
    State(state): State<Arc<AppState>>,
    Path(kind): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Json<BTreeMap<String, Value>>> {
    let kind = cost_kind(&kind)?;
    let tenants = authorized(&state, &headers).await?;
    Ok(Json(request_map(&state, kind, &tenants).await?))
}

async fn tenant_requests(
    State(state): State<Arc<AppState>>,
    Path((tenant, kind)): Path<(String, String)>,
    headers: HeaderMap,
) -> ApiResult<Json<Value>> {
    let kind = cost_kind(&kind)?;
    let tenants = authorized_tenant(&state, &headers, &tenant).await?;
    let mut map = request_map(&state, kind, &tenants).await?;
    let empty = match kind {
        CostKind::Ingress => json!([]),
        other => empty_value(other),
    };
    Ok(Json(map.remove(&tenant).unwrap_or(empty)))
}

async fn pods(
    State(state): State<Arc<AppState>>,
    Path(tenant): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Json<Vec<String>>> {
    let tenants = authorized_tenant(&state, &headers, &tenant).await?;
    let mut pods = state
        .cluster_result(state.inventory().pod_names_by_tenant(&tenants).await)
        .await?;
    Ok(Json(pods.remove(&tenant).unwrap_or_default()))
}

async fn quotas(
    State(state): State<Arc<AppState>>,
    Path((tenant, kind)): Path<(String, String)>,
    headers: HeaderMap,
) -> ApiResult<Json<Value>> {
    let kind = cost_kind(&kind)?;
    if kind == CostKind::Ingress {
        return Err(ApiError::NotFound);
    }
    authorized_tenant(&state, &headers, &tenant).await?;

    let quota = state
        .cluster_result(state.inventory().quota_for(&tenant).await)
        .await?;
    Ok(Json(match kind {
        CostKind::Cpu => json!(quota.cpu_milli),
        CostKind::Memory => json!(quota.memory_bytes),
        _ => json!(quota.storage_bytes_by_class),
    }))
}

async fn monthly_costs(
    State(state): State<Arc<AppState>>,
    Path(tenant): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Json<Vec<MonthlyCostSummary>>> {
    authorized_tenant(&state, &headers, &tenant).await?;

    let Some(record) = state.store_result(state.store.find_tenant(&tenant).await).await? else {
        return Ok(Json(Vec::new()));
    };
    let summaries = state
        .store_result(state.store.monthly_summaries(record.id).await)
        .await?;
    Ok(Json(summaries))
}

/// Health check response - returns 200 if healthy, 503 if unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy => StatusCode::OK,
        ComponentStatus::Degraded => StatusCode::OK,
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

/// Readiness check response - returns 200 if ready, 503 if not ready
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    state.health_registry.check_store(state.store.as_ref()).await;
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Prometheus metrics endpoint
async fn metrics() -> Response {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        return ApiError::Internal(format!("metrics encoding failed: {e}")).into_response();
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
        .into_response()
}

async fn log_request(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let response = next.run(request).await;
    debug!(method = %method, path = %path, status = response.status().as_u16(), "Handled request");
    response
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    let v1 = Router::new()
        .route("/tenants", get(tenants))
        .route("/costs/:kind", get(costs))
        .route("/requests/:kind", get(requests))
        .route("/:tenant/pods", get(pods))
        .route("/:tenant/costs/monthly", get(monthly_costs))
        .route("/:tenant/costs/:kind", get(tenant_costs))
        .route("/:tenant/requests/:kind", get(tenant_requests))
        .route("/:tenant/quotas/:kind", get(quotas));

    Router::new()
        .nest("/api/v1", v1)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .layer(middleware::from_fn(log_request))
        .with_state(state)
}

/// Start the API server, stopping when `shutdown` resolves
pub async fn serve(
    port: u16,
    state: Arc<AppState>,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}
