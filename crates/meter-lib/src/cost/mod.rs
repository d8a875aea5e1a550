//! Cost calculation
//!
//! Pure conversions from quantity, discount and unit price to currency, plus
//! [`CostCalculator`], which applies them to aggregated usage object by object.
//!
//! Every cost is `price × quantity × (1 − discount)`, never negative. A discount
//! of exactly 1 yields zero.

pub mod pricing;

pub use pricing::PriceTable;

use crate::discount::Discount;
use crate::error::MeterResult;
use crate::settings::IngressBilling;
use crate::usage::{ingress, IngressHost, MeteredQuantity, ResourceUsage};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

pub const MILLICORES_PER_CORE: f64 = 1000.0;
pub const BYTES_PER_GIB: f64 = 1_073_741_824.0;

fn discounted(list_price: f64, discount: Discount) -> f64 {
    (list_price * discount.remaining()).max(0.0)
}

pub fn cpu_cost(price_per_core: f64, millicores: i64, discount: Discount) -> f64 {
    discounted(price_per_core * (millicores as f64 / MILLICORES_PER_CORE), discount)
}

pub fn memory_cost(price_per_gib: f64, bytes: i64, discount: Discount) -> f64 {
    discounted(price_per_gib * (bytes as f64 / BYTES_PER_GIB), discount)
}

/// Errors with [`MeterError::UnknownStorageClass`](crate::error::MeterError) for an unpriced class
pub fn storage_cost(prices: &PriceTable, class: &str, bytes: i64, discount: Discount) -> MeterResult<f64> {
    let price = prices.storage_price(class)?;
    Ok(discounted(price * (bytes as f64 / BYTES_PER_GIB), discount))
}

/// `count` is hostnames or distinct domains, depending on the billing mode
pub fn ingress_cost(price_per_unit: f64, count: usize, discount: Discount) -> f64 {
    discounted(price_per_unit * count as f64, discount)
}

/// Costs of one tenant, by resource kind
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TenantCost {
    pub tenant: String,
    pub cpu: f64,
    pub memory: f64,
    pub storage: BTreeMap<String, f64>,
    pub ingress: f64,
}

impl TenantCost {
    pub fn storage_total(&self) -> f64 {
        self.storage.values().sum()
    }

    pub fn total(&self) -> f64 {
        self.cpu + self.memory + self.storage_total() + self.ingress
    }
}

/// Applies a [`PriceTable`] to metered quantities
#[derive(Debug, Clone)]
pub struct CostCalculator {
    prices: Arc<PriceTable>,
    ingress_billing: IngressBilling,
}

impl CostCalculator {
    pub fn new(prices: Arc<PriceTable>, ingress_billing: IngressBilling) -> Self {
        Self {
            prices,
            ingress_billing,
        }
    }

    pub fn cpu(&self, usage: &MeteredQuantity) -> f64 {
        usage
            .items()
            .iter()
            .map(|i| cpu_cost(self.prices.cpu, i.amount, i.discount))
            .sum()
    }

    pub fn memory(&self, usage: &MeteredQuantity) -> f64 {
        usage
            .items()
            .iter()
            .map(|i| memory_cost(self.prices.memory, i.amount, i.discount))
            .sum()
    }

    /// Cost per storage class
    pub fn storage(
        &self,
        usage: &BTreeMap<String, MeteredQuantity>,
    ) -> MeterResult<BTreeMap<String, f64>> {
        usage
            .iter()
            .map(|(class, quantity)| {
                let mut cost = 0.0;
                for item in quantity.items() {
                    cost += storage_cost(&self.prices, class, item.amount, item.discount)?;
                }
                Ok((class.clone(), cost))
            })
            .collect()
    }

    pub fn ingress(&self, hosts: &[IngressHost]) -> f64 {
        match self.ingress_billing {
            IngressBilling::PerHostname => hosts
                .iter()
                .map(|h| ingress_cost(self.prices.ingress, 1, h.discount))
                .sum(),
            IngressBilling::PerDomain => ingress::distinct_domains(hosts)
                .values()
                .map(|discount| ingress_cost(self.prices.ingress, 1, *discount))
                .sum(),
        }
    }

    pub fn tenant_cost(&self, usage: &ResourceUsage) -> MeterResult<TenantCost> {
        Ok(TenantCost {
            tenant: usage.tenant.clone(),
            cpu: self.cpu(&usage.cpu_milli),
            memory: self.memory(&usage.memory_bytes),
            storage: self.storage(&usage.storage_bytes_by_class)?,
            ingress: self.ingress(&usage.ingress_hosts),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MeterError;

    fn d(fraction: f64) -> Discount {
        Discount::new(fraction).unwrap()
    }

    fn prices() -> PriceTable {
        PriceTable {
            cpu: 2.0,
            memory: 1.5,
            ingress: 3.0,
            storage: BTreeMap::from([("fast".to_string(), 0.10)]),
        }
    }

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_half_core_at_two_per_core() {
        assert!(approx(cpu_cost(2.0, 500, Discount::NONE), 1.00));
    }

    #[test]
    fn test_discounted_fast_storage() {
        let cost = storage_cost(&prices(), "fast", 10 * 1_073_741_824, d(0.2)).unwrap();
        assert!(approx(cost, 0.80));
    }

    #[test]
    fn test_unknown_storage_class_never_costs_zero() {
        let err = storage_cost(&prices(), "slow", 1, Discount::NONE).unwrap_err();
        assert!(matches!(err, MeterError::UnknownStorageClass(_)));
    }

    #[test]
    fn test_full_discount_is_free() {
        assert_eq!(cpu_cost(2.0, 4000, Discount::FULL), 0.0);
        assert_eq!(memory_cost(1.5, 1 << 30, Discount::FULL), 0.0);
        assert_eq!(ingress_cost(3.0, 5, Discount::FULL), 0.0);
    }

    #[test]
    fn test_cost_scales_with_remaining_fraction() {
        let base = memory_cost(1.5, 3 << 30, Discount::NONE);
        let mut previous = f64::INFINITY;
        for step in 0..=10 {
            let fraction = step as f64 / 10.0;
            let cost = memory_cost(1.5, 3 << 30, d(fraction));
            assert!(approx(cost, base * (1.0 - fraction)));
            assert!(cost <= previous);
            assert!(cost >= 0.0);
            previous = cost;
        }
    }

    #[test]
    fn test_per_object_discounts_are_summed() {
        let mut cpu = MeteredQuantity::default();
        cpu.push("acme/a", 1000, Discount::NONE);
        cpu.push("acme/b", 1000, d(0.5));

        let calc = CostCalculator::new(Arc::new(prices()), IngressBilling::PerHostname);
        assert!(approx(calc.cpu(&cpu), 2.0 + 1.0));
    }

    fn hosts(names: &[&str], discount: f64) -> Vec<IngressHost> {
        names
            .iter()
            .map(|n| IngressHost {
                hostname: n.to_string(),
                discount: d(discount),
            })
            .collect()
    }

    #[test]
    fn test_domain_mode_counts_distinct_domains() {
        let hosts = hosts(&["a.example.com", "b.example.com", "x.other.org"], 0.5);
        let by_domain = CostCalculator::new(Arc::new(prices()), IngressBilling::PerDomain);
        let by_host = CostCalculator::new(Arc::new(prices()), IngressBilling::PerHostname);

        assert!(approx(by_domain.ingress(&hosts), 3.0 * 2.0 * 0.5));
        assert!(approx(by_host.ingress(&hosts), 3.0 * 3.0 * 0.5));
    }

    #[test]
    fn test_tenant_cost_total() {
        let mut usage = ResourceUsage {
            tenant: "acme".to_string(),
            ingress_hosts: hosts(&["a.example.com"], 0.0),
            ..Default::default()
        };
        usage.cpu_milli.push("acme/web", 500, Discount::NONE);
        usage.memory_bytes.push("acme/web", 1 << 30, Discount::NONE);
        usage
            .storage_bytes_by_class
            .entry("fast".to_string())
            .or_default()
            .push("acme/data", 10 << 30, d(0.2));

        let calc = CostCalculator::new(Arc::new(prices()), IngressBilling::PerHostname);
        let cost = calc.tenant_cost(&usage).unwrap();
        assert!(approx(cost.cpu, 1.0));
        assert!(approx(cost.memory, 1.5));
        assert!(approx(cost.storage["fast"], 0.8));
        assert!(approx(cost.ingress, 3.0));
        assert!(approx(cost.total(), 1.0 + 1.5 + 0.8 + 3.0));
    }

    #[test]
    fn test_unpriced_class_fails_tenant_cost() {
        let mut usage = ResourceUsage::default();
        usage
            .storage_bytes_by_class
            .entry("slow".to_string())
            .or_default()
            .push("acme/data", 1 << 30, Discount::NONE);

        let calc = CostCalculator::new(Arc::new(prices()), IngressBilling::PerHostname);
        assert!(calc.tenant_cost(&usage).is_err());
    }
}
