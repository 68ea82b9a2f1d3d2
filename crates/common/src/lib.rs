//! # Flash Arb Common Crate
//!
//! This crate provides common data types, error definitions, emitted records and
//! collaborator traits used across the flash arbitrage workspace.

/// Module for common error types.
pub mod errors;

/// Module for emitted records and their sinks.
pub mod events;

/// Module for chain-level collaborator traits.
pub mod traits;

/// Module for common data structures and types.
pub mod types;

// Re-export key items for easier access.
pub use errors::ArbError;
pub use events::{ChannelSink, EngineEvent, EventSink, LogSink, MemorySink};
pub use types::{
    Address, Asset, AssetPair, ChainConfig, GasMarket, LoanRequest, NetworkId, Price,
    PriceSample, RoundTripQuote, VenueId, VenueSelection,
};
