//! Error taxonomy for the metering engine

use thiserror::Error;

/// Errors produced while reading the cluster, pricing usage or persisting costs.
///
/// A missing tenant namespace is not an error: the cluster reader turns a
/// "not found" answer into an empty result before it reaches callers.
#[derive(Debug, Error)]
pub enum MeterError {
    /// Any cluster API failure other than "not found"
    #[error("failed to read {resource} from cluster: {message}")]
    ClusterRead { resource: String, message: String },

    /// Malformed or out-of-range discount label value
    #[error("discount {value:?} is not a fraction in [0, 1]")]
    InvalidDiscount { value: String },

    /// A resource quantity the cluster returned could not be parsed
    #[error("invalid quantity {quantity:?}: {reason}")]
    InvalidQuantity { quantity: String, reason: String },

    /// A storage class without an entry in the price table
    #[error("storage class {0} has no configured price")]
    UnknownStorageClass(String),

    /// Read or write failure against the cost store
    #[error("cost store error: {0}")]
    Persistence(String),

    /// A cost record or summary that violates its invariants
    #[error("invalid cost record: {0}")]
    InvalidRecord(String),

    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl MeterError {
    pub fn cluster_read(resource: impl Into<String>, message: impl ToString) -> Self {
        Self::ClusterRead {
            resource: resource.into(),
            message: message.to_string(),
        }
    }

    /// Returns true if retrying the same call may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ClusterRead { .. } | Self::Persistence(_))
    }
}

#[cfg(feature = "postgres")]
impl From<sqlx::Error> for MeterError {
    fn from(err: sqlx::Error) -> Self {
        Self::Persistence(err.to_string())
    }
}

pub type MeterResult<T> = Result<T, MeterError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_storage_class_names_the_class() {
        let err = MeterError::UnknownStorageClass("fast".to_string());
        assert!(err.to_string().contains("fast"));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_cluster_read_is_retryable() {
        let err = MeterError::cluster_read("pods", "connection reset");
        assert!(err.is_retryable());
        assert_eq!(
            err.to_string(),
            "failed to read pods from cluster: connection reset"
        );
    }
}
