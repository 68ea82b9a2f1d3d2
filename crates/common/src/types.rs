use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Represents a price, typically using a high-precision decimal type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Price(pub Decimal);

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Represents a financial asset, identified by a symbol string.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Asset(pub String);

impl fmt::Display for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Asset {
    fn from(s: &str) -> Self {
        Asset(s.to_uppercase())
    }
}

/// The two assets of a round trip. `base` is borrowed and settled in,
/// `quote` is the intermediate leg.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AssetPair {
    /// The base asset of the pair.
    pub base: Asset,
    /// The quote asset of the pair.
    pub quote: Asset,
}

impl AssetPair {
    /// Creates a new asset pair.
    pub fn new(base: Asset, quote: Asset) -> Self {
        AssetPair { base, quote }
    }

    /// The A -> B -> A path used to price and execute a round trip.
    pub fn round_trip_path(&self) -> Vec<Asset> {
        vec![self.base.clone(), self.quote.clone(), self.base.clone()]
    }
}

impl fmt::Display for AssetPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.base, self.quote)
    }
}

/// Represents a unique identifier for a trade venue.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VenueId(pub String);

impl fmt::Display for VenueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for VenueId {
    fn from(s: &str) -> Self {
        VenueId(s.to_string())
    }
}

/// Identifies the network (chain) a deployment runs on.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NetworkId(pub String);

impl fmt::Display for NetworkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for NetworkId {
    fn from(s: &str) -> Self {
        NetworkId(s.to_string())
    }
}

/// An on-chain identity: the engine itself, a loan provider, a venue router,
/// or the privileged administrator.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Address(pub String);

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Address {
    fn from(s: &str) -> Self {
        Address(s.to_lowercase())
    }
}

/// A reference price reading together with the time it was observed (unix seconds).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceSample {
    pub price: Price,
    pub timestamp: u64,
}

impl PriceSample {
    pub fn new(price: Decimal, timestamp: u64) -> Self {
        Self {
            price: Price(price),
            timestamp,
        }
    }
}

/// Simulated result of an A -> B -> A trade on a single venue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundTripQuote {
    pub venue: VenueId,
    pub amount_in: Decimal,
    pub amount_out: Decimal,
    /// `amount_out - amount_in`, floored at zero.
    pub profit: Decimal,
}

impl RoundTripQuote {
    pub fn new(venue: VenueId, amount_in: Decimal, amount_out: Decimal) -> Self {
        let profit = (amount_out - amount_in).max(Decimal::ZERO);
        Self {
            venue,
            amount_in,
            amount_out,
            profit,
        }
    }

    /// A quote for a venue that could not be priced.
    pub fn unavailable(venue: VenueId, amount_in: Decimal) -> Self {
        Self {
            venue,
            amount_in,
            amount_out: Decimal::ZERO,
            profit: Decimal::ZERO,
        }
    }
}

/// The venue chosen by the evaluator for the next execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VenueSelection {
    pub venue: VenueId,
    pub amount_in: Decimal,
    pub gross_profit: Decimal,
    pub gas_cost: Decimal,
    pub net_profit: Decimal,
}

/// A single flash loan, valid only for the lifetime of one atomic unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoanRequest {
    pub id: Uuid,
    pub asset: Asset,
    pub amount: Decimal,
    pub min_profit: Decimal,
    pub initiator: Address,
}

/// Per-network parameters, set by the privileged actor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainConfig {
    pub loan_provider: Option<Address>,
    pub max_gas_budget: u64,
}

/// Current network gas conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GasMarket {
    /// Price per gas unit, denominated in the settlement asset.
    pub gas_price: Decimal,
    pub base_fee: Decimal,
}
