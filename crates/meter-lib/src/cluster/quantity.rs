//! Conversion of Kubernetes resource quantities to integer units
//!
//! `Quantity` is an opaque string in the API types; cost math needs millicores
//! and bytes. Both conversions round up, like the apiserver's own
//! `MilliValue()` and `Value()`.

use crate::error::{MeterError, MeterResult};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;

const BINARY_SUFFIXES: &[(&str, f64)] = &[
    ("Ki", 1024.0),
    ("Mi", 1_048_576.0),
    ("Gi", 1_073_741_824.0),
    ("Ti", 1_099_511_627_776.0),
    ("Pi", 1_125_899_906_842_624.0),
    ("Ei", 1_152_921_504_606_846_976.0),
];

const DECIMAL_SUFFIXES: &[(&str, f64)] = &[
    ("n", 1e-9),
    ("u", 1e-6),
    ("m", 1e-3),
    ("k", 1e3),
    ("M", 1e6),
    ("G", 1e9),
    ("T", 1e12),
    ("P", 1e15),
    ("E", 1e18),
];

/// Parse a quantity string into base units (cores or bytes)
pub fn parse_quantity(raw: &str) -> MeterResult<f64> {
    let s = raw.trim();
    let invalid = |reason: &str| MeterError::InvalidQuantity {
        quantity: raw.to_string(),
        reason: reason.to_string(),
    };

    if s.is_empty() {
        return Err(invalid("empty quantity"));
    }

    // Plain numbers, including decimal exponents such as "12e6"
    if let Ok(value) = s.parse::<f64>() {
        return check_value(value).ok_or_else(|| invalid("must be a finite non-negative number"));
    }

    let (number, multiplier) = BINARY_SUFFIXES
        .iter()
        .chain(DECIMAL_SUFFIXES.iter())
        .find_map(|(suffix, multiplier)| s.strip_suffix(suffix).map(|n| (n, *multiplier)))
        .ok_or_else(|| invalid("unknown suffix"))?;

    let value: f64 = number
        .parse()
        .map_err(|_| invalid("not a number before the suffix"))?;

    check_value(value * multiplier).ok_or_else(|| invalid("must be a finite non-negative number"))
}

fn check_value(value: f64) -> Option<f64> {
    (value.is_finite() && value >= 0.0).then_some(value)
}

/// 2^63, the first value past `i64::MAX` that an `f64` can hold
const I64_LIMIT: f64 = 9_223_372_036_854_775_808.0;

/// CPU quantity in millicores, rounded up
pub fn cpu_millis(quantity: &Quantity) -> MeterResult<i64> {
    let cores = parse_quantity(&quantity.0)?;
    round_up(&quantity.0, cores * 1000.0)
}

/// Memory or storage quantity in bytes, rounded up
pub fn bytes(quantity: &Quantity) -> MeterResult<i64> {
    let value = parse_quantity(&quantity.0)?;
    round_up(&quantity.0, value)
}

fn round_up(raw: &str, value: f64) -> MeterResult<i64> {
    // Absorb float noise such as 0.1 * 1000 = 100.00000000000001 before ceiling
    let nearest = value.round();
    let rounded = if (value - nearest).abs() < 1e-6 {
        nearest
    } else {
        value.ceil()
    };

    if rounded >= I64_LIMIT {
        return Err(MeterError::InvalidQuantity {
            quantity: raw.to_string(),
            reason: "exceeds the 64-bit integer range".to_string(),
        });
    }
    Ok(rounded as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn q(s: &str) -> Quantity {
        Quantity(s.to_string())
    }

    #[test]
    fn test_cpu_millis() {
        assert_eq!(cpu_millis(&q("500m")).unwrap(), 500);
        assert_eq!(cpu_millis(&q("2")).unwrap(), 2000);
        assert_eq!(cpu_millis(&q("0.1")).unwrap(), 100);
        assert_eq!(cpu_millis(&q("1.5")).unwrap(), 1500);
        assert_eq!(cpu_millis(&q("250000u")).unwrap(), 250);
        // sub-millicore values round up
        assert_eq!(cpu_millis(&q("100n")).unwrap(), 1);
    }

    #[test]
    fn test_bytes_binary_suffixes() {
        assert_eq!(bytes(&q("1Ki")).unwrap(), 1024);
        assert_eq!(bytes(&q("128Mi")).unwrap(), 134_217_728);
        assert_eq!(bytes(&q("10Gi")).unwrap(), 10 * 1_073_741_824);
        assert_eq!(bytes(&q("1.5Gi")).unwrap(), 1_610_612_736);
    }

    #[test]
    fn test_bytes_decimal_suffixes() {
        assert_eq!(bytes(&q("1k")).unwrap(), 1000);
        assert_eq!(bytes(&q("500M")).unwrap(), 500_000_000);
        assert_eq!(bytes(&q("2G")).unwrap(), 2_000_000_000);
        assert_eq!(bytes(&q("1E")).unwrap(), 1_000_000_000_000_000_000);
    }

    #[test]
    fn test_exponent_form() {
        assert_eq!(bytes(&q("12e6")).unwrap(), 12_000_000);
        assert_eq!(bytes(&q("1E3")).unwrap(), 1000);
    }

    #[test]
    fn test_invalid_quantities() {
        assert!(parse_quantity("").is_err());
        assert!(parse_quantity("abc").is_err());
        assert!(parse_quantity("10Xi").is_err());
        assert!(parse_quantity("-1Gi").is_err());
        assert!(parse_quantity("Gi").is_err());
    }

    #[test]
    fn test_out_of_range_quantities() {
        // 7Ei is just below i64::MAX bytes
        assert_eq!(bytes(&q("7Ei")).unwrap(), 7 * 1_152_921_504_606_846_976);

        let err = bytes(&q("8Ei")).unwrap_err();
        assert!(matches!(err, MeterError::InvalidQuantity { .. }));
        assert!(bytes(&q("10E")).is_err());
        // fits as cores, not as millicores
        assert!(cpu_millis(&q("10P")).is_err());
    }
}
