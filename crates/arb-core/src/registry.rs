//! Per-network chain configuration.

use crate::access::AccessControl;
use common::errors::ArbError;
use common::events::{EngineEvent, EventSink};
use common::types::{Address, ChainConfig, NetworkId};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Keyed map of [`ChainConfig`]. Anyone may read; only the administrator writes.
pub struct ChainConfigRegistry {
    configs: RwLock<HashMap<NetworkId, ChainConfig>>,
    access: Arc<AccessControl>,
    sink: Arc<dyn EventSink>,
}

impl ChainConfigRegistry {
    pub fn new(access: Arc<AccessControl>, sink: Arc<dyn EventSink>) -> Self {
        Self {
            configs: RwLock::new(HashMap::new()),
            access,
            sink,
        }
    }

    pub async fn set_chain_config(
        &self,
        caller: &Address,
        network: &NetworkId,
        loan_provider: Option<Address>,
        max_gas_budget: u64,
    ) -> Result<(), ArbError> {
        self.access.authorize(caller, "set chain config")?;
        let config = ChainConfig {
            loan_provider: loan_provider.clone(),
            max_gas_budget,
        };
        self.configs.write().await.insert(network.clone(), config);
        self.sink.emit(EngineEvent::ConfigSet {
            network: network.clone(),
            loan_provider,
            max_gas_budget,
        });
        Ok(())
    }

    pub async fn get(&self, network: &NetworkId) -> Option<ChainConfig> {
        self.configs.read().await.get(network).cloned()
    }

    pub async fn loan_provider(&self, network: &NetworkId) -> Option<Address> {
        self.get(network).await.and_then(|c| c.loan_provider)
    }

    /// Pre-flight guard run before any external call. Returns the configured
    /// loan provider.
    ///
    /// The budget is a ceiling on the gas one unit may consume: a unit whose
    /// estimate exceeds it is rejected. A zero budget counts as unset.
    pub async fn preflight(
        &self,
        network: &NetworkId,
        gas_estimate: u64,
    ) -> Result<Address, ArbError> {
        let config = self
            .get(network)
            .await
            .ok_or_else(|| ArbError::ConfigMissing(network.clone()))?;
        let provider = config
            .loan_provider
            .ok_or_else(|| ArbError::ConfigMissing(network.clone()))?;
        if config.max_gas_budget == 0 {
            return Err(ArbError::ConfigMissing(network.clone()));
        }
        if gas_estimate > config.max_gas_budget {
            return Err(ArbError::GasBudgetExceeded {
                estimate: gas_estimate,
                budget: config.max_gas_budget,
            });
        }
        Ok(provider)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::events::MemorySink;

    fn registry() -> (ChainConfigRegistry, Arc<MemorySink>) {
        let sink = Arc::new(MemorySink::new());
        let registry = ChainConfigRegistry::new(
            Arc::new(AccessControl::new(Address::from("0xadmin"))),
            sink.clone(),
        );
        (registry, sink)
    }

    #[tokio::test]
    async fn test_set_requires_admin() {
        let (registry, sink) = registry();
        let network = NetworkId::from("arbitrum");
        let err = registry
            .set_chain_config(
                &Address::from("0xmallory"),
                &network,
                Some(Address::from("0xpool")),
                500_000,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ArbError::UnauthorizedCaller(_)));
        assert!(registry.get(&network).await.is_none());
        assert!(sink.events().is_empty());
    }

    #[tokio::test]
    async fn test_preflight_rejects_missing_config() {
        let (registry, _) = registry();
        let network = NetworkId::from("arbitrum");
        assert_eq!(
            registry.preflight(&network, 1).await.unwrap_err(),
            ArbError::ConfigMissing(network.clone())
        );

        registry
            .set_chain_config(&Address::from("0xadmin"), &network, None, 500_000)
            .await
            .unwrap();
        assert_eq!(
            registry.preflight(&network, 1).await.unwrap_err(),
            ArbError::ConfigMissing(network)
        );
    }

    #[tokio::test]
    async fn test_preflight_gas_budget() {
        let (registry, sink) = registry();
        let network = NetworkId::from("arbitrum");
        registry
            .set_chain_config(
                &Address::from("0xadmin"),
                &network,
                Some(Address::from("0xpool")),
                500_000,
            )
            .await
            .unwrap();
        assert_eq!(sink.events().len(), 1);

        assert_eq!(
            registry.preflight(&network, 500_000).await.unwrap(),
            Address::from("0xpool")
        );
        assert_eq!(
            registry.preflight(&network, 500_001).await.unwrap_err(),
            ArbError::GasBudgetExceeded {
                estimate: 500_001,
                budget: 500_000
            }
        );
    }
}
