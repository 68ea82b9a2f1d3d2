use crate::types::{NetworkId, VenueId};
use rust_decimal::Decimal;
use thiserror::Error;

/// Errors raised by the arbitrage engine.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ArbError {
    /// A venue could not quote the round trip.
    #[error("Quote unavailable on {venue}: {reason}")]
    QuoteUnavailable { venue: VenueId, reason: String },

    /// No venue clears the gas-adjusted profitability threshold.
    #[error("Unprofitable: {0}")]
    Unprofitable(String),

    /// Trading is halted by the circuit breaker.
    #[error("Unsafe market: {0}")]
    UnsafeMarket(String),

    /// Callback sender, initiator, or intent mismatch; or a privileged action
    /// attempted by someone other than the administrator.
    #[error("Unauthorized caller: {0}")]
    UnauthorizedCaller(String),

    /// Realized profit fell short of the requested minimum.
    #[error("Insufficient profit: realized {actual}, required {required}")]
    InsufficientProfit { actual: Decimal, required: Decimal },

    /// No usable chain configuration for the network.
    #[error("Configuration missing for network {0}")]
    ConfigMissing(NetworkId),

    /// The unit would consume more gas than the network budget allows.
    #[error("Gas budget exceeded: estimate {estimate} > budget {budget}")]
    GasBudgetExceeded { estimate: u64, budget: u64 },

    /// An entrypoint was re-entered while another call held the execution lock.
    #[error("Reentrant call rejected")]
    Reentrancy,

    #[error("Unknown venue: {0}")]
    UnknownVenue(VenueId),

    /// The loan provider failed to grant or settle the loan.
    #[error("Loan failed: {0}")]
    LoanFailed(String),

    /// A swap inside the atomic unit failed.
    #[error("Swap failed on {venue}: {reason}")]
    SwapFailed { venue: VenueId, reason: String },

    #[error("Invalid parameters: {0}")]
    InvalidParams(String),

    /// Durable state could not be written.
    #[error("Persistence error: {0}")]
    Persistence(String),
}

impl ArbError {
    /// Whether the error is a failure of an atomic unit that actually ran,
    /// and therefore counts towards the consecutive failure counter.
    pub fn is_execution_failure(&self) -> bool {
        matches!(
            self,
            ArbError::InsufficientProfit { .. }
                | ArbError::SwapFailed { .. }
                | ArbError::LoanFailed(_)
        )
    }
}
