//! Tenant authorization gate
//!
//! Maps a caller's credential to the tenants it may see. Aggregation only ever
//! runs over the list this returns.

use async_trait::async_trait;
use std::collections::HashMap;
use thiserror::Error;

/// The credential is missing or unknown
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unauthorized: {0}")]
pub struct Unauthorized(pub String);

#[async_trait]
pub trait TenantAuthorizer: Send + Sync {
    /// Authorized tenant names for `credential`, in a stable order
    async fn resolve_tenants(&self, credential: Option<&str>) -> Result<Vec<String>, Unauthorized>;
}

/// Fixed bearer tokens, each granting a list of tenants
#[derive(Debug, Clone, Default)]
pub struct StaticTokenAuthorizer {
    tokens: HashMap<String, Vec<String>>,
}

impl StaticTokenAuthorizer {
    /// Build from `(token, tenants)` pairs; a repeated token gets the union
    pub fn new(grants: impl IntoIterator<Item = (String, Vec<String>)>) -> Self {
        let mut tokens: HashMap<String, Vec<String>> = HashMap::new();
        for (token, tenants) in grants {
            tokens.entry(token).or_default().extend(tenants);
        }
        for tenants in tokens.values_mut() {
            tenants.sort();
            tenants.dedup();
        }
        Self { tokens }
    }

    pub fn with_token(
        mut self,
        token: impl Into<String>,
        tenants: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        let mut tenants: Vec<String> = tenants.into_iter().map(Into::into).collect();
        tenants.sort();
        tenants.dedup();
        self.tokens.insert(token.into(), tenants);
        self
    }

    pub fn token_count(&self) -> usize {
        self.tokens.len()
    }
}

#[async_trait]
impl TenantAuthorizer for StaticTokenAuthorizer {
    async fn resolve_tenants(&self, credential: Option<&str>) -> Result<Vec<String>, Unauthorized> {
        let token = credential
            .filter(|t| !t.is_empty())
            .ok_or_else(|| Unauthorized("missing credential".to_string()))?;

        self.tokens
            .get(token)
            .cloned()
            .ok_or_else(|| Unauthorized("unknown token".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_tokens() {
        let auth = StaticTokenAuthorizer::default()
            .with_token("t-acme", ["acme", "acme"])
            .with_token("t-ops", ["globex", "acme"]);

        assert_eq!(auth.resolve_tenants(Some("t-acme")).await.unwrap(), vec!["acme"]);
        assert_eq!(
            auth.resolve_tenants(Some("t-ops")).await.unwrap(),
            vec!["acme", "globex"]
        );
        assert!(auth.resolve_tenants(Some("nope")).await.is_err());
        assert!(auth.resolve_tenants(None).await.is_err());
        assert!(auth.resolve_tenants(Some("")).await.is_err());
    }

    #[tokio::test]
    async fn test_repeated_grants_are_merged() {
        let auth = StaticTokenAuthorizer::new([
            ("Tk-1".to_string(), vec!["globex".to_string()]),
            ("Tk-1".to_string(), vec!["acme".to_string(), "globex".to_string()]),
        ]);

        assert_eq!(auth.token_count(), 1);
        assert_eq!(
            auth.resolve_tenants(Some("Tk-1")).await.unwrap(),
            vec!["acme", "globex"]
        );
        assert!(auth.resolve_tenants(Some("tk-1")).await.is_err());
    }
}
