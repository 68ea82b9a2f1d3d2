//! Loan orchestration and the per-network trigger loop.

pub mod orchestrator;
pub mod params;
pub mod service;

pub use orchestrator::{ExecutionReport, LoanOrchestrator};
pub use params::CallbackParams;
pub use service::{ArbitrageService, CycleOutcome};
