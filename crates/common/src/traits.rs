//! Chain-level collaborators the engine talks to.

use crate::errors::ArbError;
use crate::types::{Address, Asset, GasMarket, PriceSample};
use anyhow::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;

/// Arguments of a flash loan request.
#[derive(Debug, Clone, PartialEq)]
pub struct FlashLoanCall {
    pub assets: Vec<Asset>,
    pub amounts: Vec<Decimal>,
    /// Debt mode per asset; 0 means the loan must be repaid within the unit.
    pub modes: Vec<u8>,
    pub on_behalf_of: Address,
    /// Opaque to the provider, handed back verbatim to the receiver.
    pub params: Vec<u8>,
    pub referral_code: u16,
}

/// Arguments the provider passes back to the receiver.
#[derive(Debug, Clone, PartialEq)]
pub struct LoanCallback {
    pub assets: Vec<Asset>,
    pub amounts: Vec<Decimal>,
    pub fees: Vec<Decimal>,
    pub initiator: Address,
    pub params: Vec<u8>,
}

/// The receiving end of a flash loan.
#[async_trait]
pub trait LoanReceiver: Send + Sync {
    /// Identity under which the receiver holds balances.
    fn address(&self) -> &Address;

    /// Invoked by the provider once the funds are transferred. Returning an
    /// error aborts the whole unit.
    async fn on_loan_callback(&self, sender: &Address, callback: LoanCallback)
        -> Result<(), ArbError>;
}

/// A lender offering atomic borrow-use-repay loans.
///
/// Implementations must invoke `receiver.on_loan_callback` before returning
/// and must undo every effect of the unit, the loan included, when the
/// callback or the final repayment fails.
#[async_trait]
pub trait LoanProvider: Send + Sync {
    fn address(&self) -> &Address;

    /// Flash fee in basis points of the borrowed amount.
    fn fee_bps(&self) -> u32;

    async fn request_loan(
        &self,
        initiator: &Address,
        receiver: &dyn LoanReceiver,
        call: FlashLoanCall,
    ) -> Result<(), ArbError>;
}

/// Reference price source.
#[async_trait]
pub trait PriceOracle: Send + Sync {
    /// Latest reading. May be stale.
    async fn latest_price(&self, asset: &Asset) -> Result<PriceSample>;
}

/// Gas price source used for the congestion gate and cost estimate.
#[async_trait]
pub trait GasOracle: Send + Sync {
    async fn gas_market(&self) -> Result<GasMarket>;
}

/// Token balances and approvals.
#[async_trait]
pub trait TokenLedger: Send + Sync {
    async fn balance_of(&self, asset: &Asset, owner: &Address) -> Result<Decimal>;

    /// Lets `spender` pull up to `amount` of `asset` from `owner`.
    async fn approve(
        &self,
        owner: &Address,
        spender: &Address,
        asset: &Asset,
        amount: Decimal,
    ) -> Result<()>;
}

/// Time source in unix seconds.
pub trait Clock: Send + Sync {
    fn now(&self) -> u64;
}

/// Wall clock time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> u64 {
        chrono::Utc::now().timestamp().max(0) as u64
    }
}
