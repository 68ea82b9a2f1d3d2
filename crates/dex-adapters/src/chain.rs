//! In-process token ledger standing in for chain state.

use anyhow::{bail, Result};
use async_trait::async_trait;
use common::traits::TokenLedger;
use common::types::{Address, Asset};
use dashmap::DashMap;
use rust_decimal::Decimal;
use std::collections::HashMap;

type BalanceKey = (Address, Asset);
type AllowanceKey = (Address, Address, Asset);

/// Balances and allowances for every simulated account.
///
/// One instance models one network. `snapshot`/`restore` give loan providers
/// the all-or-nothing semantics of a reverted transaction.
#[derive(Debug, Default)]
pub struct SimulatedChain {
    balances: DashMap<BalanceKey, Decimal>,
    allowances: DashMap<AllowanceKey, Decimal>,
}

/// Full copy of the ledger at a point in time.
#[derive(Debug, Clone, PartialEq)]
pub struct ChainSnapshot {
    balances: HashMap<BalanceKey, Decimal>,
    allowances: HashMap<AllowanceKey, Decimal>,
}

impl SimulatedChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mint(&self, owner: &Address, asset: &Asset, amount: Decimal) {
        *self
            .balances
            .entry((owner.clone(), asset.clone()))
            .or_insert(Decimal::ZERO) += amount;
    }

    pub fn balance(&self, asset: &Asset, owner: &Address) -> Decimal {
        self.balances
            .get(&(owner.clone(), asset.clone()))
            .map(|b| *b)
            .unwrap_or(Decimal::ZERO)
    }

    pub fn allowance(&self, owner: &Address, spender: &Address, asset: &Asset) -> Decimal {
        self.allowances
            .get(&(owner.clone(), spender.clone(), asset.clone()))
            .map(|a| *a)
            .unwrap_or(Decimal::ZERO)
    }

    pub fn set_allowance(&self, owner: &Address, spender: &Address, asset: &Asset, amount: Decimal) {
        self.allowances
            .insert((owner.clone(), spender.clone(), asset.clone()), amount);
    }

    pub fn transfer(&self, from: &Address, to: &Address, asset: &Asset, amount: Decimal) -> Result<()> {
        if amount < Decimal::ZERO {
            bail!("negative transfer of {} {}", amount, asset);
        }
        let available = self.balance(asset, from);
        if available < amount {
            bail!(
                "{} holds {} {} but {} is required",
                from,
                available,
                asset,
                amount
            );
        }
        self.balances
            .insert((from.clone(), asset.clone()), available - amount);
        self.mint(to, asset, amount);
        Ok(())
    }

    /// Moves funds on behalf of `from`, consuming `spender`'s allowance.
    pub fn transfer_from(
        &self,
        spender: &Address,
        from: &Address,
        to: &Address,
        asset: &Asset,
        amount: Decimal,
    ) -> Result<()> {
        let allowed = self.allowance(from, spender, asset);
        if allowed < amount {
            bail!(
                "{} approved {} for {} {} but {} is required",
                from,
                spender,
                allowed,
                asset,
                amount
            );
        }
        self.transfer(from, to, asset, amount)?;
        self.set_allowance(from, spender, asset, allowed - amount);
        Ok(())
    }

    pub fn snapshot(&self) -> ChainSnapshot {
        ChainSnapshot {
            balances: self
                .balances
                .iter()
                .map(|e| (e.key().clone(), *e.value()))
                .collect(),
            allowances: self
                .allowances
                .iter()
                .map(|e| (e.key().clone(), *e.value()))
                .collect(),
        }
    }

    pub fn restore(&self, snapshot: ChainSnapshot) {
        self.balances.clear();
        for (key, value) in snapshot.balances {
            self.balances.insert(key, value);
        }
        self.allowances.clear();
        for (key, value) in snapshot.allowances {
            self.allowances.insert(key, value);
        }
    }
}

#[async_trait]
impl TokenLedger for SimulatedChain {
    async fn balance_of(&self, asset: &Asset, owner: &Address) -> Result<Decimal> {
        Ok(self.balance(asset, owner))
    }

    async fn approve(
        &self,
        owner: &Address,
        spender: &Address,
        asset: &Asset,
        amount: Decimal,
    ) -> Result<()> {
        self.set_allowance(owner, spender, asset, amount);
        Ok(())
    }
}
