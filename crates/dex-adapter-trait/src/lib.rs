//! Traits every trade venue adapter implements.

use anyhow::Result;
use async_trait::async_trait;
use common::types::{Address, Asset, VenueId};
use rust_decimal::Decimal;

/// Read-only pricing side of a venue.
#[async_trait]
pub trait VenueQuoteProvider: Send + Sync {
    /// Returns the amount at every step of `path`, starting with `amount_in`.
    async fn quote(&self, amount_in: Decimal, path: &[Asset]) -> Result<Vec<Decimal>>;

    /// Depth available for `asset`, if the venue reports it.
    async fn liquidity(&self, _asset: &Asset) -> Option<Decimal> {
        None
    }
}

/// Trading side of a venue.
#[async_trait]
pub trait VenueSwapExecutor: Send + Sync {
    /// The identity that must be approved before a swap can pull input funds.
    fn spender(&self) -> &Address;

    /// Swaps along `path`. The input is pulled from `recipient` against its
    /// allowance and the output is paid back to `recipient`. Fails if the final
    /// output is below `min_amount_out` or `deadline` has passed.
    async fn swap(
        &self,
        amount_in: Decimal,
        min_amount_out: Decimal,
        path: &[Asset],
        recipient: &Address,
        deadline: u64,
    ) -> Result<Vec<Decimal>>;
}

/// A registered venue: immutable identifier plus its quoting and swap roles.
pub trait Venue: VenueQuoteProvider + VenueSwapExecutor {
    fn id(&self) -> &VenueId;
}

/// Final amount of a quote or swap result.
pub fn final_amount(amounts: &[Decimal]) -> Result<Decimal> {
    amounts
        .last()
        .copied()
        .ok_or_else(|| anyhow::anyhow!("venue returned an empty amounts list"))
}
