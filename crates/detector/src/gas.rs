//! Gas estimation and cost accounting for round trips.

use common::types::GasMarket;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Swaps in one round trip: A -> B, then B -> A.
pub const ROUND_TRIP_SWAPS: u64 = 2;

/// Configuration for gas estimation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GasConfig {
    /// Fixed gas for the loan request, callback, and repayment.
    pub base_gas_cost: u64,
    /// Gas per swap hop, approval included.
    pub gas_per_swap: u64,
    /// Gas estimation buffer multiplier (e.g., 1.2 = 20% buffer)
    pub estimation_buffer: f64,
    /// Hard ceiling on any estimate.
    pub max_gas_limit: u64,
}

impl Default for GasConfig {
    fn default() -> Self {
        Self {
            base_gas_cost: 150_000,
            gas_per_swap: 120_000,
            estimation_buffer: 1.2,
            max_gas_limit: 2_000_000,
        }
    }
}

/// Turns the gas configuration and live gas prices into estimates.
#[derive(Debug, Clone)]
pub struct GasModel {
    config: GasConfig,
}

impl GasModel {
    pub fn new(config: GasConfig) -> Self {
        Self { config }
    }

    pub fn with_defaults() -> Self {
        Self::new(GasConfig::default())
    }

    pub fn config(&self) -> &GasConfig {
        &self.config
    }

    /// Gas units for an atomic unit performing `swap_count` swaps.
    pub fn estimate_gas_units(&self, swap_count: u64) -> u64 {
        let base_estimate = self
            .config
            .base_gas_cost
            .saturating_add(swap_count.saturating_mul(self.config.gas_per_swap));

        // Apply estimation buffer
        let buffered_estimate = (base_estimate as f64 * self.config.estimation_buffer) as u64;

        // Ensure we don't exceed max gas limit
        buffered_estimate.min(self.config.max_gas_limit)
    }

    /// Gas units for one round trip.
    pub fn round_trip_gas_units(&self) -> u64 {
        self.estimate_gas_units(ROUND_TRIP_SWAPS)
    }

    /// Execution cost in the settlement asset: gas price x gas estimate.
    pub fn execution_cost(&self, market: &GasMarket, gas_units: u64) -> Decimal {
        market.gas_price * Decimal::from(gas_units)
    }

    /// Congestion proxy: gas price above twice the base fee.
    pub fn is_congested(&self, market: &GasMarket) -> bool {
        market.gas_price > market.base_fee * Decimal::TWO
    }

    /// Whether `gas_cost` stays within `max_gas_pct` percent of `gross_profit`.
    pub fn cost_within_budget(gas_cost: Decimal, gross_profit: Decimal, max_gas_pct: u32) -> bool {
        let allowed = gross_profit * Decimal::from(max_gas_pct) / Decimal::ONE_HUNDRED;
        gas_cost <= allowed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn market(gas_price: Decimal, base_fee: Decimal) -> GasMarket {
        GasMarket {
            gas_price,
            base_fee,
        }
    }

    #[test]
    fn test_estimate_gas_units() {
        let model = GasModel::with_defaults();
        let expected_base = 150_000 + 2 * 120_000;
        let expected_buffered = (expected_base as f64 * 1.2) as u64;
        assert_eq!(model.round_trip_gas_units(), expected_buffered);
    }

    #[test]
    fn test_estimate_respects_limit() {
        let model = GasModel::new(GasConfig {
            max_gas_limit: 100_000,
            ..GasConfig::default()
        });
        assert_eq!(model.round_trip_gas_units(), 100_000);
    }

    #[test]
    fn test_oversized_config_clamps_to_limit() {
        let model = GasModel::new(GasConfig {
            base_gas_cost: u64::MAX,
            gas_per_swap: 9_300_000_000_000_000_000,
            ..GasConfig::default()
        });
        assert_eq!(model.round_trip_gas_units(), 2_000_000);
    }

    #[test]
    fn test_execution_cost() {
        let model = GasModel::with_defaults();
        let cost = model.execution_cost(&market(dec!(0.001), dec!(0.001)), 1_000);
        assert_eq!(cost, dec!(1));
    }

    #[test]
    fn test_congestion_gate() {
        let model = GasModel::with_defaults();
        assert!(!model.is_congested(&market(dec!(20), dec!(10))));
        assert!(model.is_congested(&market(dec!(20.01), dec!(10))));
    }

    #[test]
    fn test_cost_within_budget() {
        assert!(GasModel::cost_within_budget(dec!(3), dec!(10), 30));
        assert!(!GasModel::cost_within_budget(dec!(3.01), dec!(10), 30));
    }
}
