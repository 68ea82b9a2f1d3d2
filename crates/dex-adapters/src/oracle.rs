use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use common::traits::{Clock, GasOracle, PriceOracle};
use common::types::{Asset, GasMarket, PriceSample};
use dashmap::DashMap;
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Price feed whose readings are set directly, stamped `lag` seconds behind
/// the clock.
pub struct SimulatedPriceOracle {
    prices: DashMap<Asset, Decimal>,
    clock: Arc<dyn Clock>,
    lag_secs: AtomicU64,
    unavailable: AtomicBool,
}

impl SimulatedPriceOracle {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            prices: DashMap::new(),
            clock,
            lag_secs: AtomicU64::new(0),
            unavailable: AtomicBool::new(false),
        }
    }

    pub fn set_price(&self, asset: &Asset, price: Decimal) {
        self.prices.insert(asset.clone(), price);
    }

    pub fn set_lag(&self, secs: u64) {
        self.lag_secs.store(secs, Ordering::Release);
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::Release);
    }
}

#[async_trait]
impl PriceOracle for SimulatedPriceOracle {
    async fn latest_price(&self, asset: &Asset) -> Result<PriceSample> {
        if self.unavailable.load(Ordering::Acquire) {
            bail!("price feed unavailable");
        }
        let price = self
            .prices
            .get(asset)
            .map(|p| *p)
            .ok_or_else(|| anyhow!("no price feed for {}", asset))?;
        let timestamp = self
            .clock
            .now()
            .saturating_sub(self.lag_secs.load(Ordering::Acquire));
        Ok(PriceSample::new(price, timestamp))
    }
}

/// Gas oracle reporting whatever market was last set.
#[derive(Debug)]
pub struct FixedGasOracle {
    market: Mutex<GasMarket>,
}

impl FixedGasOracle {
    pub fn new(market: GasMarket) -> Self {
        Self {
            market: Mutex::new(market),
        }
    }

    pub fn set(&self, market: GasMarket) {
        match self.market.lock() {
            Ok(mut current) => *current = market,
            Err(poisoned) => *poisoned.into_inner() = market,
        }
    }
}

#[async_trait]
impl GasOracle for FixedGasOracle {
    async fn gas_market(&self) -> Result<GasMarket> {
        self.market
            .lock()
            .map(|m| *m)
            .map_err(|_| anyhow!("gas market lock poisoned"))
    }
}
