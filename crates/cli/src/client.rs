//! HTTP client for the tenant cost API

use anyhow::{Context, Result};
use reqwest::{Client, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::BTreeMap;
use url::Url;

/// Non-success answers from the API
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("not authorized, check the API token")]
    Unauthorized,
    #[error("the token does not grant access to this tenant")]
    Forbidden,
    #[error("not found: {0}")]
    NotFound(String),
    #[error("API error ({status}): {message}")]
    Server { status: StatusCode, message: String },
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

/// Client for the `/api/v1` routes, authenticating with a bearer token
pub struct ApiClient {
    client: Client,
    base_url: Url,
    token: Option<String>,
}

impl ApiClient {
    pub fn new(base_url: &str, token: Option<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        // Url::join replaces the last segment unless the base ends with a slash
        let mut base = base_url.to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        let base_url = Url::parse(&base).context("Invalid API URL")?;

        Ok(Self {
            client,
            base_url,
            token,
        })
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.base_url.join(path).context("Invalid path")?;

        let mut request = self.client.get(url);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.context("Failed to send request")?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .json::<ErrorBody>()
                .await
                .map(|b| b.message)
                .unwrap_or_default();
            return Err(match status {
                StatusCode::UNAUTHORIZED => ApiError::Unauthorized,
                StatusCode::FORBIDDEN => ApiError::Forbidden,
                StatusCode::NOT_FOUND => ApiError::NotFound(path.to_string()),
                _ => ApiError::Server { status, message },
            }
            .into());
        }

        response.json().await.context("Failed to parse response")
    }

    pub async fn tenants(&self) -> Result<Vec<String>> {
        self.get("api/v1/tenants").await
    }

    /// Costs of one kind for every authorized tenant
    pub async fn costs<T: DeserializeOwned>(&self, kind: &str) -> Result<BTreeMap<String, T>> {
        self.get(&format!("api/v1/costs/{kind}")).await
    }

    pub async fn tenant_costs<T: DeserializeOwned>(&self, tenant: &str, kind: &str) -> Result<T> {
        self.get(&format!("api/v1/{tenant}/costs/{kind}")).await
    }

    pub async fn requests<T: DeserializeOwned>(&self, kind: &str) -> Result<BTreeMap<String, T>> {
        self.get(&format!("api/v1/requests/{kind}")).await
    }

    pub async fn tenant_requests<T: DeserializeOwned>(&self, tenant: &str, kind: &str) -> Result<T> {
        self.get(&format!("api/v1/{tenant}/requests/{kind}")).await
    }

    pub async fn monthly_costs(&self, tenant: &str) -> Result<Vec<MonthlySummary>> {
        self.get(&format!("api/v1/{tenant}/costs/monthly")).await
    }

    pub async fn quota(&self, tenant: &str) -> Result<Quota> {
        Ok(Quota {
            tenant: tenant.to_string(),
            cpu_milli: self.get(&format!("api/v1/{tenant}/quotas/cpu")).await?,
            memory_bytes: self.get(&format!("api/v1/{tenant}/quotas/memory")).await?,
            storage_bytes_by_class: self.get(&format!("api/v1/{tenant}/quotas/storage")).await?,
        })
    }
}

// API response types

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonthlySummary {
    pub tenant_id: i64,
    pub month: u32,
    pub year: i32,
    pub cpu_cost: f64,
    pub memory_cost: f64,
    pub storage_cost: f64,
    pub ingress_cost: f64,
    pub total_cost: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Quota {
    pub tenant: String,
    pub cpu_milli: i64,
    pub memory_bytes: i64,
    pub storage_bytes_by_class: BTreeMap<String, i64>,
}

/// All costs of one tenant, assembled from the per-kind routes
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TenantCosts {
    pub tenant: String,
    pub cpu: f64,
    pub memory: f64,
    pub storage: BTreeMap<String, f64>,
    pub ingress: f64,
}

impl TenantCosts {
    pub fn storage_total(&self) -> f64 {
        self.storage.values().sum()
    }

    pub fn total(&self) -> f64 {
        self.cpu + self.memory + self.storage_total() + self.ingress
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sends_bearer_token() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/v1/tenants")
            .match_header("authorization", "Bearer secret")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"["acme","globex"]"#)
            .create_async()
            .await;

        let client = ApiClient::new(&server.url(), Some("secret".to_string())).unwrap();
        let tenants = client.tenants().await.unwrap();

        assert_eq!(tenants, vec!["acme", "globex"]);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_base_url_with_path_prefix() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/meter/api/v1/costs/cpu")
            .with_status(200)
            .with_body(r#"{"acme":1.5}"#)
            .create_async()
            .await;

        let client = ApiClient::new(&format!("{}/meter", server.url()), None).unwrap();
        let costs: BTreeMap<String, f64> = client.costs("cpu").await.unwrap();

        assert_eq!(costs["acme"], 1.5);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_status_codes_map_to_errors() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/v1/tenants")
            .with_status(401)
            .with_body(r#"{"message":"Unauthorized"}"#)
            .create_async()
            .await;
        server
            .mock("GET", "/api/v1/globex/costs/cpu")
            .with_status(403)
            .with_body(r#"{"message":"Forbidden"}"#)
            .create_async()
            .await;
        server
            .mock("GET", "/api/v1/costs/memory")
            .with_status(500)
            .with_body(r#"{"message":"Internal Server Error"}"#)
            .create_async()
            .await;

        let client = ApiClient::new(&server.url(), None).unwrap();

        let err = client.tenants().await.unwrap_err();
        assert!(matches!(err.downcast_ref::<ApiError>(), Some(ApiError::Unauthorized)));

        let err = client.tenant_costs::<f64>("globex", "cpu").await.unwrap_err();
        assert!(matches!(err.downcast_ref::<ApiError>(), Some(ApiError::Forbidden)));

        let err = client.costs::<f64>("memory").await.unwrap_err();
        match err.downcast_ref::<ApiError>() {
            Some(ApiError::Server { status, message }) => {
                assert_eq!(*status, StatusCode::INTERNAL_SERVER_ERROR);
                assert_eq!(message, "Internal Server Error");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_quota_combines_kinds() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/v1/acme/quotas/cpu")
            .with_body("4000")
            .create_async()
            .await;
        server
            .mock("GET", "/api/v1/acme/quotas/memory")
            .with_body("8589934592")
            .create_async()
            .await;
        server
            .mock("GET", "/api/v1/acme/quotas/storage")
            .with_body(r#"{"fast":107374182400}"#)
            .create_async()
            .await;

        let client = ApiClient::new(&server.url(), None).unwrap();
        let quota = client.quota("acme").await.unwrap();

        assert_eq!(quota.cpu_milli, 4000);
        assert_eq!(quota.memory_bytes, 8589934592);
        assert_eq!(quota.storage_bytes_by_class["fast"], 107374182400);
    }

    #[test]
    fn test_tenant_costs_total() {
        let costs = TenantCosts {
            tenant: "acme".to_string(),
            cpu: 1.0,
            memory: 0.5,
            storage: BTreeMap::from([("fast".to_string(), 0.25), ("slow".to_string(), 0.25)]),
            ingress: 2.0,
        };
        assert_eq!(costs.storage_total(), 0.5);
        assert_eq!(costs.total(), 4.0);
    }
}
