//! Discount label resolution
//!
//! Any cluster object may carry a label with a fractional price reduction
//! (for example `natron.io/discount: "0.2"`). An invalid or missing label never
//! aborts aggregation: it resolves to no discount and is logged.

use crate::error::{MeterError, MeterResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::warn;

/// A price reduction fraction, always within `[0, 1]`
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct Discount(f64);

impl Discount {
    pub const NONE: Discount = Discount(0.0);
    pub const FULL: Discount = Discount(1.0);

    pub fn new(fraction: f64) -> MeterResult<Self> {
        if fraction.is_finite() && (0.0..=1.0).contains(&fraction) {
            Ok(Self(fraction))
        } else {
            Err(MeterError::InvalidDiscount {
                value: fraction.to_string(),
            })
        }
    }

    /// Parse a label value such as `"0.25"`
    pub fn parse(value: &str) -> MeterResult<Self> {
        let fraction: f64 = value.trim().parse().map_err(|_| MeterError::InvalidDiscount {
            value: value.to_string(),
        })?;
        Self::new(fraction).map_err(|_| MeterError::InvalidDiscount {
            value: value.to_string(),
        })
    }

    pub fn fraction(self) -> f64 {
        self.0
    }

    /// The share of the list price still charged, `1 - discount`
    pub fn remaining(self) -> f64 {
        1.0 - self.0
    }
}

impl TryFrom<f64> for Discount {
    type Error = MeterError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Discount> for f64 {
    fn from(discount: Discount) -> Self {
        discount.0
    }
}

impl fmt::Display for Discount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Resolves the discount of a single object from its labels
#[derive(Debug, Clone)]
pub struct DiscountResolver {
    label: String,
}

impl DiscountResolver {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
        }
    }

    /// Returns the object's discount, or [`Discount::NONE`] when the label is
    /// absent or invalid. Invalid values are logged as warnings.
    pub fn resolve(&self, object: &str, labels: Option<&BTreeMap<String, String>>) -> Discount {
        let Some(value) = labels.and_then(|l| l.get(&self.label)) else {
            return Discount::NONE;
        };

        if value.is_empty() {
            return Discount::NONE;
        }

        match Discount::parse(value) {
            Ok(discount) => discount,
            Err(e) => {
                warn!(
                    object = %object,
                    label = %self.label,
                    value = %value,
                    error = %e,
                    "Ignoring invalid discount label"
                );
                crate::observability::MeterMetrics::new().inc_invalid_discounts();
                Discount::NONE
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_discount_bounds() {
        assert!(Discount::new(0.0).is_ok());
        assert!(Discount::new(1.0).is_ok());
        assert!(Discount::new(-0.01).is_err());
        assert!(Discount::new(1.01).is_err());
        assert!(Discount::new(f64::NAN).is_err());
        assert!(Discount::new(f64::INFINITY).is_err());
    }

    #[test]
    fn test_discount_parse() {
        assert_eq!(Discount::parse("0.2").unwrap().fraction(), 0.2);
        assert_eq!(Discount::parse(" 1 ").unwrap(), Discount::FULL);
        assert!(Discount::parse("20%").is_err());
        assert!(Discount::parse("abc").is_err());
    }

    #[test]
    fn test_remaining_share() {
        let d = Discount::new(0.25).unwrap();
        assert!((d.remaining() - 0.75).abs() < f64::EPSILON);
        assert_eq!(Discount::FULL.remaining(), 0.0);
    }

    #[test]
    fn test_resolver_reads_label() {
        let resolver = DiscountResolver::new("natron.io/discount");
        let l = labels(&[("natron.io/discount", "0.5"), ("app", "web")]);
        assert_eq!(resolver.resolve("pod/web", Some(&l)).fraction(), 0.5);
    }

    #[test]
    fn test_resolver_missing_label_is_zero() {
        let resolver = DiscountResolver::new("natron.io/discount");
        assert_eq!(resolver.resolve("pod/web", None), Discount::NONE);

        let l = labels(&[("app", "web")]);
        assert_eq!(resolver.resolve("pod/web", Some(&l)), Discount::NONE);

        let empty = labels(&[("natron.io/discount", "")]);
        assert_eq!(resolver.resolve("pod/web", Some(&empty)), Discount::NONE);
    }

    #[test]
    fn test_resolver_invalid_label_is_zero() {
        let resolver = DiscountResolver::new("natron.io/discount");
        for bad in ["1.5", "-0.1", "half", "NaN"] {
            let l = labels(&[("natron.io/discount", bad)]);
            assert_eq!(resolver.resolve("pvc/data", Some(&l)), Discount::NONE, "{bad}");
        }
    }

    #[test]
    fn test_discount_deserialize_rejects_out_of_range() {
        assert!(serde_json::from_str::<Discount>("0.3").is_ok());
        assert!(serde_json::from_str::<Discount>("3.0").is_err());
    }
}
