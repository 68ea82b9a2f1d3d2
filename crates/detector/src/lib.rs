//! # Arbitrage Detector Crate
//!
//! Decides whether, and on which venue, a flash-loan round trip is worth
//! executing: venue quoting, profitability and readiness gates, gas costing,
//! and loan sizing.

pub mod evaluator;
pub mod gas;
pub mod sizing;

// Re-export the main evaluator for easy access.
pub use evaluator::{select_best, ArbitrageEvaluator};
pub use gas::{GasConfig, GasModel};
pub use sizing::{create_sizer, FixedNotional, LiquidityBounded, LoanSizer, SizingConfig};
