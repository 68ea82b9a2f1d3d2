//! In-process stand-ins for the chain collaborators: token ledger, swap
//! venues, flash lender, oracles and clock.

pub mod chain;
pub mod clock;
pub mod lending;
pub mod oracle;
pub mod venue;

pub use chain::{ChainSnapshot, SimulatedChain};
pub use clock::ManualClock;
pub use lending::SimulatedLendingPool;
pub use oracle::{FixedGasOracle, SimulatedPriceOracle};
pub use venue::FixedRateVenue;
