//! Loan sizing strategies.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Decides how much to borrow for one atomic unit.
pub trait LoanSizer: Send + Sync {
    fn name(&self) -> &str;

    /// `requested` is the configured notional; `venue_liquidity` is the depth
    /// the chosen venue reports for the borrowed asset, if any.
    fn size(&self, requested: Decimal, venue_liquidity: Option<Decimal>) -> Decimal;
}

/// Configuration for the sizing strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SizingConfig {
    Fixed,
    LiquidityBounded {
        /// Share of venue liquidity the loan may take (e.g., 0.05 = 5%).
        fraction: Decimal,
        #[serde(default)]
        min_size: Decimal,
        max_size: Option<Decimal>,
    },
}

impl Default for SizingConfig {
    fn default() -> Self {
        SizingConfig::Fixed
    }
}

/// Always borrows the requested notional.
#[derive(Debug, Clone, Default)]
pub struct FixedNotional;

impl LoanSizer for FixedNotional {
    fn name(&self) -> &str {
        "fixed"
    }

    fn size(&self, requested: Decimal, _venue_liquidity: Option<Decimal>) -> Decimal {
        requested
    }
}

/// Caps the loan at a fraction of venue liquidity to limit slippage.
///
/// size = min(requested, liquidity x fraction), clamped to [min_size, max_size].
/// Without a liquidity figure only the clamp applies.
#[derive(Debug, Clone)]
pub struct LiquidityBounded {
    fraction: Decimal,
    min_size: Decimal,
    max_size: Option<Decimal>,
}

impl LiquidityBounded {
    pub fn new(fraction: Decimal, min_size: Decimal, max_size: Option<Decimal>) -> Self {
        Self {
            fraction,
            min_size,
            max_size,
        }
    }
}

impl LoanSizer for LiquidityBounded {
    fn name(&self) -> &str {
        "liquidity_bounded"
    }

    fn size(&self, requested: Decimal, venue_liquidity: Option<Decimal>) -> Decimal {
        let mut size = requested;
        if let Some(liquidity) = venue_liquidity {
            size = size.min(liquidity * self.fraction);
        }
        if let Some(max) = self.max_size {
            size = size.min(max);
        }
        size.max(self.min_size)
    }
}

/// Creates a sizer from its configuration.
pub fn create_sizer(config: &SizingConfig) -> Box<dyn LoanSizer> {
    match config {
        SizingConfig::Fixed => Box::new(FixedNotional),
        SizingConfig::LiquidityBounded {
            fraction,
            min_size,
            max_size,
        } => Box::new(LiquidityBounded::new(*fraction, *min_size, *max_size)),
    }
}
