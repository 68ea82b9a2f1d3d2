//! Safety, access control, and per-network state shared by the engine.

pub mod access;
pub mod registry;
pub mod safety;
pub mod settings;
pub mod store;

pub use access::{AccessControl, ExecutionGuard, GuardToken};
pub use registry::ChainConfigRegistry;
pub use safety::{SafetyMonitor, SafetyParams, SafetyState, SampleOutcome};
pub use settings::{EngineSettings, SettingsParams};
pub use store::{MemorySafetyStore, SafetyStore, YamlSafetyStore};
