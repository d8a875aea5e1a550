//! Unit price table

use crate::cluster::StorageClassCatalog;
use crate::error::{MeterError, MeterResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Per-unit prices: per core, per GiB of memory, per ingress unit and per GiB
/// of storage for each storage class
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PriceTable {
    pub cpu: f64,
    pub memory: f64,
    pub ingress: f64,
    pub storage: BTreeMap<String, f64>,
}

impl Default for PriceTable {
    fn default() -> Self {
        Self {
            cpu: 1.0,
            memory: 1.0,
            ingress: 1.0,
            storage: BTreeMap::new(),
        }
    }
}

impl PriceTable {
    /// Reject negative or non-finite prices
    pub fn validate(&self) -> MeterResult<()> {
        let fixed = [("cpu", self.cpu), ("memory", self.memory), ("ingress", self.ingress)];
        let storage = self
            .storage
            .iter()
            .map(|(class, price)| (class.as_str(), *price));

        for (name, price) in fixed.into_iter().chain(storage) {
            if !price.is_finite() || price < 0.0 {
                return Err(MeterError::Config(format!(
                    "price for {name} must be a non-negative number, got {price}"
                )));
            }
        }
        Ok(())
    }

    /// Price per GiB for a storage class; never defaults silently
    pub fn storage_price(&self, class: &str) -> MeterResult<f64> {
        self.storage
            .get(class)
            .copied()
            .ok_or_else(|| MeterError::UnknownStorageClass(class.to_string()))
    }

    /// Fail on the first cluster storage class without a price
    pub fn ensure_covers(&self, catalog: &StorageClassCatalog) -> MeterResult<()> {
        match catalog.names.iter().find(|c| !self.storage.contains_key(*c)) {
            Some(class) => Err(MeterError::UnknownStorageClass(class.clone())),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> PriceTable {
        PriceTable {
            storage: BTreeMap::from([("fast".to_string(), 0.10)]),
            ..Default::default()
        }
    }

    #[test]
    fn test_unknown_class_is_an_error() {
        let err = table().storage_price("slow").unwrap_err();
        assert!(matches!(err, MeterError::UnknownStorageClass(ref c) if c == "slow"));
        assert_eq!(table().storage_price("fast").unwrap(), 0.10);
    }

    #[test]
    fn test_ensure_covers_names_missing_class() {
        let catalog = StorageClassCatalog {
            names: vec!["fast".to_string(), "slow".to_string()],
            default_class: None,
        };
        let err = table().ensure_covers(&catalog).unwrap_err();
        assert!(err.to_string().contains("slow"));

        let covered = StorageClassCatalog {
            names: vec!["fast".to_string()],
            default_class: Some("fast".to_string()),
        };
        assert!(table().ensure_covers(&covered).is_ok());
    }

    #[test]
    fn test_validate_rejects_negative_and_nan() {
        assert!(table().validate().is_ok());

        let mut negative = table();
        negative.cpu = -1.0;
        assert!(negative.validate().is_err());

        let mut nan = table();
        nan.storage.insert("slow".to_string(), f64::NAN);
        assert!(nan.validate().is_err());
    }
}
