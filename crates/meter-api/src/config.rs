//! Service configuration
//!
//! Read once at startup from an optional file (path in `METER_CONFIG`) and
//! `METER_*` environment variables, which win over the file. Nested keys use
//! `__`, e.g. `METER_PRICES__STORAGE__FAST=0.10`.
//!
//! Bearer tokens live in values, never in keys: the `config` crate lowercases
//! keys, which would corrupt any token with uppercase characters.
//!
//! ```toml
//! [[auth.tokens]]
//! token = "AbCdEf123"
//! tenants = ["acme", "globex"]
//! ```

use anyhow::{bail, Context, Result};
use meter_lib::{IngressBilling, MeterSettings, PriceTable, StaticTokenAuthorizer};
use serde::Deserialize;
use std::time::Duration;

pub const CONFIG_PATH_VAR: &str = "METER_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "/etc/tenant-meter/config";

/// Service configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// Port of the HTTP API
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Name of this replica in lifecycle events
    #[serde(default = "default_instance")]
    pub instance: String,

    #[serde(default = "default_tenant_label")]
    pub tenant_label: String,

    #[serde(default = "default_discount_label")]
    pub discount_label: String,

    /// Bill distinct second-level domains instead of hostnames
    #[serde(default)]
    pub ingress_cost_per_domain: bool,

    #[serde(default)]
    pub exclude_ingress_vcluster: bool,

    #[serde(default)]
    pub quota_namespace_suffix: Option<String>,

    #[serde(default)]
    pub prices: PriceTable,

    #[serde(default)]
    pub persistence: PersistenceConfig,

    #[serde(default)]
    pub cluster: ClusterConfig,

    #[serde(default)]
    pub auth: AuthConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PersistenceConfig {
    /// Run the periodic cost cycle and monthly rollup
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    /// PostgreSQL URL; the in-memory store is used when unset
    #[serde(default)]
    pub database_url: Option<String>,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_secs: default_interval_secs(),
            database_url: None,
        }
    }
}

impl PersistenceConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClusterConfig {
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

/// One bearer token and the tenants it may read
#[derive(Debug, Clone, Deserialize)]
pub struct TokenGrant {
    pub token: String,
    #[serde(default)]
    pub tenants: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub tokens: Vec<TokenGrant>,
}

impl AuthConfig {
    /// Grants repeating a token are merged
    pub fn authorizer(&self) -> StaticTokenAuthorizer {
        StaticTokenAuthorizer::new(
            self.tokens
                .iter()
                .map(|grant| (grant.token.clone(), grant.tenants.clone())),
        )
    }
}

fn default_api_port() -> u16 {
    8000
}

fn default_instance() -> String {
    std::env::var("POD_NAME")
        .or_else(|_| std::env::var("HOSTNAME"))
        .unwrap_or_else(|_| "tenant-meter".to_string())
}

fn default_tenant_label() -> String {
    meter_lib::settings::DEFAULT_TENANT_LABEL.to_string()
}

fn default_discount_label() -> String {
    meter_lib::settings::DEFAULT_DISCOUNT_LABEL.to_string()
}

fn default_interval_secs() -> u64 {
    3600
}

fn default_request_timeout_secs() -> u64 {
    30
}

impl ServiceConfig {
    /// Load configuration from the config file and environment
    pub fn load() -> Result<Self> {
        let path =
            std::env::var(CONFIG_PATH_VAR).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());

        let config = config::Config::builder()
            .add_source(config::File::with_name(&path).required(false))
            .add_source(
                config::Environment::with_prefix("METER")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .with_context(|| format!("failed to read configuration (file {path})"))?;

        Self::from_config(config)
    }

    pub fn from_config(config: config::Config) -> Result<Self> {
        let parsed: Self = config
            .try_deserialize()
            .context("invalid configuration")?;
        parsed.validate()?;
        Ok(parsed)
    }

    pub fn validate(&self) -> Result<()> {
        self.prices.validate()?;
        if self.persistence.interval_secs == 0 {
            bail!("persistence.interval_secs must be greater than zero");
        }
        if self.tenant_label.is_empty() {
            bail!("tenant_label must not be empty");
        }
        if self.auth.tokens.iter().any(|grant| grant.token.is_empty()) {
            bail!("auth.tokens entries must carry a non-empty token");
        }
        Ok(())
    }

    pub fn settings(&self) -> MeterSettings {
        MeterSettings {
            tenant_label: self.tenant_label.clone(),
            discount_label: self.discount_label.clone(),
            ingress_billing: if self.ingress_cost_per_domain {
                IngressBilling::PerDomain
            } else {
                IngressBilling::PerHostname
            },
            exclude_vcluster_ingresses: self.exclude_ingress_vcluster,
            quota_namespace_suffix: self
                .quota_namespace_suffix
                .clone()
                .filter(|s| !s.is_empty()),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.cluster.request_timeout_secs)
    }
}
