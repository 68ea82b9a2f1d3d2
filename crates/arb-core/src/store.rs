//! Durable storage for the circuit breaker state.

use crate::safety::SafetyState;
use common::errors::ArbError;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Persists `SafetyState` so a freeze survives restarts.
///
/// `save` must be all-or-nothing: after a failed save, `load` returns the
/// previously saved state.
pub trait SafetyStore: Send + Sync {
    fn load(&self) -> Result<Option<SafetyState>, ArbError>;
    fn save(&self, state: &SafetyState) -> Result<(), ArbError>;
}

/// Keeps the state in memory only.
#[derive(Debug, Default)]
pub struct MemorySafetyStore {
    state: Mutex<Option<SafetyState>>,
}

impl MemorySafetyStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SafetyStore for MemorySafetyStore {
    fn load(&self) -> Result<Option<SafetyState>, ArbError> {
        let guard = self
            .state
            .lock()
            .map_err(|e| ArbError::Persistence(e.to_string()))?;
        Ok(guard.clone())
    }

    fn save(&self, state: &SafetyState) -> Result<(), ArbError> {
        let mut guard = self
            .state
            .lock()
            .map_err(|e| ArbError::Persistence(e.to_string()))?;
        *guard = Some(state.clone());
        Ok(())
    }
}

/// Stores the state as YAML. Writes go to a sibling temp file which is then
/// renamed over the target, so a crash mid-write leaves the old file intact.
#[derive(Debug, Clone)]
pub struct YamlSafetyStore {
    path: PathBuf,
}

impl YamlSafetyStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl SafetyStore for YamlSafetyStore {
    fn load(&self) -> Result<Option<SafetyState>, ArbError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&self.path)
            .map_err(|e| ArbError::Persistence(format!("{}: {}", self.path.display(), e)))?;
        let state = serde_yaml::from_str(&content)
            .map_err(|e| ArbError::Persistence(format!("{}: {}", self.path.display(), e)))?;
        Ok(Some(state))
    }

    fn save(&self, state: &SafetyState) -> Result<(), ArbError> {
        let content =
            serde_yaml::to_string(state).map_err(|e| ArbError::Persistence(e.to_string()))?;
        let tmp = self.temp_path();
        std::fs::write(&tmp, content)
            .map_err(|e| ArbError::Persistence(format!("{}: {}", tmp.display(), e)))?;
        std::fs::rename(&tmp, &self.path)
            .map_err(|e| ArbError::Persistence(format!("{}: {}", self.path.display(), e)))?;
        Ok(())
    }
}
