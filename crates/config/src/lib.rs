use arb_core::{SafetyParams, SettingsParams};
use detector::{GasConfig, SizingConfig};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The top-level configuration struct that maps directly to the YAML file.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct EngineConfig {
    pub engine: EngineSection,
    #[serde(default)]
    pub safety: SafetySection,
    #[serde(default)]
    pub gas: GasSection,
    pub networks: Vec<NetworkConfig>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct EngineSection {
    /// Identity the engine trades and borrows under.
    pub address: String,
    /// The only identity allowed to change configuration or unfreeze.
    pub admin: String,
    pub interval_ms: u64,
    #[serde(default = "default_slippage_bps")]
    pub slippage_bps: u32,
    #[serde(default = "default_max_gas_pct")]
    pub max_gas_pct: u32,
    #[serde(default = "default_deadline_secs")]
    pub deadline_secs: u64,
}

fn default_slippage_bps() -> u32 {
    50
}

fn default_max_gas_pct() -> u32 {
    30
}

fn default_deadline_secs() -> u64 {
    300
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SafetySection {
    pub drop_threshold_pct: Decimal,
    pub sample_interval_secs: u64,
    pub max_consecutive_failures: u32,
    /// Where per-network safety state is persisted. In memory when unset.
    pub state_dir: Option<PathBuf>,
}

impl Default for SafetySection {
    fn default() -> Self {
        let params = SafetyParams::default();
        Self {
            drop_threshold_pct: params.drop_threshold_pct,
            sample_interval_secs: params.sample_interval_secs,
            max_consecutive_failures: params.max_consecutive_failures,
            state_dir: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct GasSection {
    pub base_gas: u64,
    pub gas_per_swap: u64,
    pub estimation_buffer: f64,
    pub max_gas_limit: u64,
}

impl Default for GasSection {
    fn default() -> Self {
        let gas = GasConfig::default();
        Self {
            base_gas: gas.base_gas_cost,
            gas_per_swap: gas.gas_per_swap,
            estimation_buffer: gas.estimation_buffer,
            max_gas_limit: gas.max_gas_limit,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct NetworkConfig {
    pub name: String,
    pub loan_provider: String,
    pub max_gas_budget: u64,
    #[serde(default)]
    pub flash_fee_bps: u32,
    pub base_asset: String,
    pub quote_asset: String,
    pub base_amount: Decimal,
    #[serde(default)]
    pub min_profit: Decimal,
    #[serde(default)]
    pub sizing: SizingConfig,
    /// Reference price of the quote asset reported by the simulated oracle.
    pub oracle_price: Decimal,
    pub gas_price: Decimal,
    pub base_fee: Decimal,
    pub venues: Vec<VenueConfig>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct VenueConfig {
    pub id: String,
    /// Quote asset received per unit of base asset.
    pub forward_rate: Decimal,
    /// Base asset received per unit of quote asset.
    pub reverse_rate: Decimal,
    #[serde(default)]
    pub fee_bps: u32,
    /// Reserves seeded for each asset of the pair.
    pub liquidity: Decimal,
}

impl EngineConfig {
    /// Load configuration from a YAML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Save configuration to a YAML file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content =
            serde_yaml::to_string(self).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        std::fs::write(path.as_ref(), content)?;
        Ok(())
    }

    pub fn find_network(&self, name: &str) -> Option<&NetworkConfig> {
        self.networks.iter().find(|n| n.name == name)
    }

    pub fn safety_params(&self) -> SafetyParams {
        SafetyParams {
            drop_threshold_pct: self.safety.drop_threshold_pct,
            sample_interval_secs: self.safety.sample_interval_secs,
            max_consecutive_failures: self.safety.max_consecutive_failures,
        }
    }

    pub fn settings_params(&self) -> SettingsParams {
        SettingsParams {
            slippage_bps: self.engine.slippage_bps,
            max_gas_pct: self.engine.max_gas_pct,
            deadline_secs: self.engine.deadline_secs,
        }
    }

    pub fn gas_config(&self) -> GasConfig {
        GasConfig {
            base_gas_cost: self.gas.base_gas,
            gas_per_swap: self.gas.gas_per_swap,
            estimation_buffer: self.gas.estimation_buffer,
            max_gas_limit: self.gas.max_gas_limit,
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::ValidationError(msg));

        if self.engine.address.is_empty() || self.engine.admin.is_empty() {
            return invalid("Engine address and admin cannot be empty".to_string());
        }
        if self.engine.interval_ms == 0 {
            return invalid("Engine interval must be greater than 0".to_string());
        }
        if self.engine.slippage_bps > 10_000 {
            return invalid(format!(
                "Slippage tolerance {} bps exceeds 10000",
                self.engine.slippage_bps
            ));
        }
        if !(1..=100).contains(&self.engine.max_gas_pct) {
            return invalid(format!(
                "Max gas percent {} must be within 1..=100",
                self.engine.max_gas_pct
            ));
        }
        if self.safety.drop_threshold_pct <= Decimal::ZERO {
            return invalid("Drop threshold must be positive".to_string());
        }
        if self.safety.sample_interval_secs == 0 {
            return invalid("Sample interval must be greater than 0".to_string());
        }
        if self.safety.max_consecutive_failures == 0 {
            return invalid("Max consecutive failures must be greater than 0".to_string());
        }
        if !self.gas.estimation_buffer.is_finite() || self.gas.estimation_buffer < 1.0 {
            return invalid("Gas estimation buffer must be finite and at least 1.0".to_string());
        }
        if self.gas.max_gas_limit == 0 {
            return invalid("Max gas limit must be greater than 0".to_string());
        }
        if self.gas.base_gas > self.gas.max_gas_limit
            || self.gas.gas_per_swap > self.gas.max_gas_limit
        {
            return invalid(format!(
                "Base gas {} and gas per swap {} cannot exceed max gas limit {}",
                self.gas.base_gas, self.gas.gas_per_swap, self.gas.max_gas_limit
            ));
        }

        if self.networks.is_empty() {
            return invalid("No networks configured".to_string());
        }
        for network in &self.networks {
            if network.name.is_empty() {
                return invalid("Network name cannot be empty".to_string());
            }
            if self.networks.iter().filter(|n| n.name == network.name).count() > 1 {
                return invalid(format!("Network '{}' is configured twice", network.name));
            }
            if network.loan_provider.is_empty() {
                return invalid(format!(
                    "Loan provider for network '{}' cannot be empty",
                    network.name
                ));
            }
            if network.base_asset.is_empty()
                || network.quote_asset.is_empty()
                || network.base_asset == network.quote_asset
            {
                return invalid(format!(
                    "Network '{}' needs two distinct assets",
                    network.name
                ));
            }
            if network.base_amount <= Decimal::ZERO {
                return invalid(format!(
                    "Base amount for network '{}' must be positive",
                    network.name
                ));
            }
            if network.min_profit < Decimal::ZERO {
                return invalid(format!(
                    "Minimum profit for network '{}' cannot be negative",
                    network.name
                ));
            }
            if let SizingConfig::LiquidityBounded { fraction, .. } = &network.sizing {
                if *fraction <= Decimal::ZERO || *fraction > Decimal::ONE {
                    return invalid(format!(
                        "Sizing fraction for network '{}' must be within (0, 1]",
                        network.name
                    ));
                }
            }
            if network.venues.is_empty() {
                return invalid(format!("No venues configured for network '{}'", network.name));
            }
            for venue in &network.venues {
                if venue.id.is_empty() {
                    return invalid(format!("Venue id on network '{}' cannot be empty", network.name));
                }
                if venue.forward_rate <= Decimal::ZERO || venue.reverse_rate <= Decimal::ZERO {
                    return invalid(format!("Venue '{}' rates must be positive", venue.id));
                }
                if venue.fee_bps > 10_000 {
                    return invalid(format!("Venue '{}' fee exceeds 10000 bps", venue.id));
                }
            }
        }

        Ok(())
    }
}

/// Reads and validates a configuration without blocking the runtime.
pub async fn load_config_from_path<P: AsRef<Path>>(path: P) -> Result<EngineConfig, ConfigError> {
    let content = tokio::fs::read_to_string(path.as_ref()).await?;
    let config = EngineConfig::from_yaml(&content)?;
    config.validate()?;
    Ok(config)
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}
