//! Privileged-action checks and the execution lock.

use common::errors::ArbError;
use common::types::Address;
use std::sync::atomic::{AtomicBool, Ordering};

/// Gates privileged actions behind a single administrator identity.
#[derive(Debug, Clone)]
pub struct AccessControl {
    admin: Address,
}

impl AccessControl {
    pub fn new(admin: Address) -> Self {
        Self { admin }
    }

    pub fn admin(&self) -> &Address {
        &self.admin
    }

    /// Fails unless `caller` is the administrator.
    pub fn authorize(&self, caller: &Address, action: &str) -> Result<(), ArbError> {
        if caller == &self.admin {
            Ok(())
        } else {
            log::warn!("Rejected privileged action '{}' from {}", action, caller);
            Err(ArbError::UnauthorizedCaller(format!(
                "{} is not allowed to {}",
                caller, action
            )))
        }
    }
}

/// Mutual-exclusion lock for entrypoints that make external calls.
///
/// `enter` never waits: a second caller, including a re-entrant one from inside
/// an external call, is rejected while the lock is held.
#[derive(Debug, Default)]
pub struct ExecutionGuard {
    locked: AtomicBool,
}

impl ExecutionGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enter(&self) -> Result<GuardToken<'_>, ArbError> {
        self.locked
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| ArbError::Reentrancy)?;
        Ok(GuardToken { guard: self })
    }

    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::Acquire)
    }
}

/// Held for the duration of an entrypoint; releases the lock when dropped.
#[derive(Debug)]
pub struct GuardToken<'a> {
    guard: &'a ExecutionGuard,
}

impl Drop for GuardToken<'_> {
    fn drop(&mut self) {
        self.guard.locked.store(false, Ordering::Release);
    }
}
