//! Runtime-tunable execution settings.

use crate::access::AccessControl;
use common::errors::ArbError;
use common::events::{EngineEvent, EventSink};
use common::types::Address;
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

/// Initial values for [`EngineSettings`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingsParams {
    /// Maximum adverse deviation from the quote accepted per swap, in basis points.
    pub slippage_bps: u32,
    /// Maximum share of gross profit that execution cost may take, in percent.
    pub max_gas_pct: u32,
    /// Swap deadline offset from the current time, in seconds.
    pub deadline_secs: u64,
}

impl Default for SettingsParams {
    fn default() -> Self {
        Self {
            slippage_bps: 50,
            max_gas_pct: 30,
            deadline_secs: 300,
        }
    }
}

pub struct EngineSettings {
    slippage_bps: AtomicU32,
    max_gas_pct: AtomicU32,
    deadline_secs: AtomicU64,
    access: Arc<AccessControl>,
    sink: Arc<dyn EventSink>,
}

impl EngineSettings {
    pub fn new(params: SettingsParams, access: Arc<AccessControl>, sink: Arc<dyn EventSink>) -> Self {
        Self {
            slippage_bps: AtomicU32::new(params.slippage_bps),
            max_gas_pct: AtomicU32::new(params.max_gas_pct),
            deadline_secs: AtomicU64::new(params.deadline_secs),
            access,
            sink,
        }
    }

    pub fn slippage_bps(&self) -> u32 {
        self.slippage_bps.load(Ordering::Acquire)
    }

    pub fn max_gas_pct(&self) -> u32 {
        self.max_gas_pct.load(Ordering::Acquire)
    }

    pub fn deadline_secs(&self) -> u64 {
        self.deadline_secs.load(Ordering::Acquire)
    }

    /// Smallest acceptable output for a swap quoted at `expected_out`.
    pub fn min_amount_out(&self, expected_out: Decimal) -> Decimal {
        let keep = Decimal::from(10_000u32.saturating_sub(self.slippage_bps()));
        expected_out * keep / Decimal::from(10_000u32)
    }

    pub fn set_slippage_tolerance(&self, caller: &Address, bps: u32) -> Result<(), ArbError> {
        self.access.authorize(caller, "set slippage tolerance")?;
        if bps > 10_000 {
            return Err(ArbError::InvalidParams(format!(
                "slippage tolerance {} bps exceeds 10000",
                bps
            )));
        }
        self.slippage_bps.store(bps, Ordering::Release);
        self.sink.emit(EngineEvent::SettingsChanged {
            setting: "slippage_bps",
            value: bps.to_string(),
        });
        Ok(())
    }

    pub fn set_max_gas_percent(&self, caller: &Address, pct: u32) -> Result<(), ArbError> {
        self.access.authorize(caller, "set max gas percent")?;
        if pct == 0 || pct > 100 {
            return Err(ArbError::InvalidParams(format!(
                "max gas percent {} outside 1..=100",
                pct
            )));
        }
        self.max_gas_pct.store(pct, Ordering::Release);
        self.sink.emit(EngineEvent::SettingsChanged {
            setting: "max_gas_pct",
            value: pct.to_string(),
        });
        Ok(())
    }
}
