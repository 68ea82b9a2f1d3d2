use crate::chain::SimulatedChain;
use anyhow::{bail, Result};
use async_trait::async_trait;
use common::traits::Clock;
use common::types::{Address, Asset, VenueId};
use dashmap::DashMap;
use dex_adapter_trait::{Venue, VenueQuoteProvider, VenueSwapExecutor};
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

/// A venue that converts at fixed per-direction rates, minus a fee, and
/// settles against its own reserves on a [`SimulatedChain`].
pub struct FixedRateVenue {
    id: VenueId,
    address: Address,
    chain: Arc<SimulatedChain>,
    clock: Arc<dyn Clock>,
    rates: DashMap<(Asset, Asset), Decimal>,
    fee_bps: AtomicU32,
    quotes_fail: AtomicBool,
}

impl FixedRateVenue {
    pub fn new(id: VenueId, address: Address, chain: Arc<SimulatedChain>, clock: Arc<dyn Clock>) -> Self {
        Self {
            id,
            address,
            chain,
            clock,
            rates: DashMap::new(),
            fee_bps: AtomicU32::new(0),
            quotes_fail: AtomicBool::new(false),
        }
    }

    /// Sets the output per unit of input when swapping `from` into `to`.
    pub fn with_rate(self, from: &Asset, to: &Asset, rate: Decimal) -> Self {
        self.set_rate(from, to, rate);
        self
    }

    pub fn with_fee_bps(self, fee_bps: u32) -> Self {
        self.fee_bps.store(fee_bps, Ordering::Release);
        self
    }

    pub fn set_rate(&self, from: &Asset, to: &Asset, rate: Decimal) {
        self.rates.insert((from.clone(), to.clone()), rate);
    }

    /// Makes every subsequent quote fail, as an unreachable venue would.
    pub fn set_quotes_fail(&self, fail: bool) {
        self.quotes_fail.store(fail, Ordering::Release);
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    fn amounts_along(&self, amount_in: Decimal, path: &[Asset]) -> Result<Vec<Decimal>> {
        if path.len() < 2 {
            bail!("path needs at least two assets, got {}", path.len());
        }
        let keep = Decimal::from(10_000u32.saturating_sub(self.fee_bps.load(Ordering::Acquire)))
            / Decimal::from(10_000u32);
        let mut amounts = Vec::with_capacity(path.len());
        amounts.push(amount_in);
        for hop in path.windows(2) {
            let rate = match self.rates.get(&(hop[0].clone(), hop[1].clone())) {
                Some(rate) => *rate,
                None => bail!("{} has no market for {} -> {}", self.id, hop[0], hop[1]),
            };
            let last = amounts[amounts.len() - 1];
            amounts.push(last * rate * keep);
        }
        Ok(amounts)
    }
}

#[async_trait]
impl VenueQuoteProvider for FixedRateVenue {
    async fn quote(&self, amount_in: Decimal, path: &[Asset]) -> Result<Vec<Decimal>> {
        if self.quotes_fail.load(Ordering::Acquire) {
            bail!("{} quote endpoint unavailable", self.id);
        }
        self.amounts_along(amount_in, path)
    }

    async fn liquidity(&self, asset: &Asset) -> Option<Decimal> {
        Some(self.chain.balance(asset, &self.address))
    }
}

#[async_trait]
impl VenueSwapExecutor for FixedRateVenue {
    fn spender(&self) -> &Address {
        &self.address
    }

    async fn swap(
        &self,
        amount_in: Decimal,
        min_amount_out: Decimal,
        path: &[Asset],
        recipient: &Address,
        deadline: u64,
    ) -> Result<Vec<Decimal>> {
        let now = self.clock.now();
        if now > deadline {
            bail!("swap deadline {} passed at {}", deadline, now);
        }
        let amounts = self.amounts_along(amount_in, path)?;
        let amount_out = amounts[amounts.len() - 1];
        if amount_out < min_amount_out {
            bail!(
                "insufficient output amount: {} < {}",
                amount_out,
                min_amount_out
            );
        }

        let (asset_in, asset_out) = (&path[0], &path[path.len() - 1]);
        self.chain
            .transfer_from(&self.address, recipient, &self.address, asset_in, amount_in)?;
        self.chain
            .transfer(&self.address, recipient, asset_out, amount_out)?;
        log::debug!(
            "{} swapped {} {} -> {} {} for {}",
            self.id,
            amount_in,
            asset_in,
            amount_out,
            asset_out,
            recipient
        );
        Ok(amounts)
    }
}

impl Venue for FixedRateVenue {
    fn id(&self) -> &VenueId {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use rust_decimal_macros::dec;

    fn usdc() -> Asset {
        Asset::from("USDC")
    }

    fn weth() -> Asset {
        Asset::from("WETH")
    }

    fn venue(chain: Arc<SimulatedChain>, forward: Decimal, reverse: Decimal) -> FixedRateVenue {
        FixedRateVenue::new(
            VenueId::from("flat"),
            Address::from("0xvenue"),
            chain,
            Arc::new(ManualClock::new(1_000)),
        )
        .with_rate(&usdc(), &weth(), forward)
        .with_rate(&weth(), &usdc(), reverse)
    }

    #[tokio::test]
    async fn test_flat_round_trip_has_zero_profit() {
        let venue = venue(Arc::new(SimulatedChain::new()), dec!(1), dec!(1));
        let amounts = venue
            .quote(dec!(1000), &[usdc(), weth(), usdc()])
            .await
            .unwrap();
        assert_eq!(amounts, vec![dec!(1000), dec!(1000), dec!(1000)]);
        assert_eq!(amounts[2] - amounts[0], Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_fee_is_charged_per_hop() {
        let venue = venue(Arc::new(SimulatedChain::new()), dec!(2), dec!(0.5)).with_fee_bps(100);
        let amounts = venue
            .quote(dec!(100), &[usdc(), weth(), usdc()])
            .await
            .unwrap();
        assert_eq!(amounts[1], dec!(198));
        assert_eq!(amounts[2], dec!(98.01));
    }

    #[tokio::test]
    async fn test_quote_failure_switch() {
        let venue = venue(Arc::new(SimulatedChain::new()), dec!(1), dec!(1));
        venue.set_quotes_fail(true);
        assert!(venue.quote(dec!(1), &[usdc(), weth()]).await.is_err());
        assert!(venue.quote(dec!(1), &[usdc(), Asset::from("DAI")]).await.is_err());
    }

    #[tokio::test]
    async fn test_swap_settles_against_reserves() {
        let chain = Arc::new(SimulatedChain::new());
        let trader = Address::from("0xtrader");
        let venue = venue(chain.clone(), dec!(2), dec!(0.5));
        chain.mint(venue.address(), &weth(), dec!(1000));
        chain.mint(&trader, &usdc(), dec!(100));
        chain.set_allowance(&trader, venue.spender(), &usdc(), dec!(100));

        let amounts = venue
            .swap(dec!(100), dec!(199), &[usdc(), weth()], &trader, 1_000)
            .await
            .unwrap();
        assert_eq!(amounts, vec![dec!(100), dec!(200)]);
        assert_eq!(chain.balance(&weth(), &trader), dec!(200));
        assert_eq!(chain.balance(&usdc(), venue.address()), dec!(100));
        assert_eq!(venue.liquidity(&weth()).await, Some(dec!(800)));
    }

    #[tokio::test]
    async fn test_swap_rejects_slippage_and_deadline() {
        let chain = Arc::new(SimulatedChain::new());
        let trader = Address::from("0xtrader");
        let venue = venue(chain.clone(), dec!(2), dec!(0.5));
        chain.mint(venue.address(), &weth(), dec!(1000));
        chain.mint(&trader, &usdc(), dec!(100));
        chain.set_allowance(&trader, venue.spender(), &usdc(), dec!(100));

        assert!(venue
            .swap(dec!(100), dec!(201), &[usdc(), weth()], &trader, 1_000)
            .await
            .is_err());
        assert!(venue
            .swap(dec!(100), dec!(0), &[usdc(), weth()], &trader, 999)
            .await
            .is_err());
        assert_eq!(chain.balance(&usdc(), &trader), dec!(100));
    }
}
