//! Wires one network's engine against simulated collaborators.

use anyhow::{Context, Result};
use arb_core::{
    AccessControl, ChainConfigRegistry, EngineSettings, MemorySafetyStore, SafetyMonitor,
    SafetyStore, YamlSafetyStore,
};
use common::events::EventSink;
use common::traits::{Clock, LoanProvider, SystemClock};
use common::types::{Address, Asset, AssetPair, GasMarket, NetworkId, VenueId};
use config::{EngineConfig, NetworkConfig};
use detector::{create_sizer, ArbitrageEvaluator, GasModel};
use dex_adapters::{
    FixedGasOracle, FixedRateVenue, SimulatedChain, SimulatedLendingPool, SimulatedPriceOracle,
};
use executor::{ArbitrageService, LoanOrchestrator};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::info;

/// Lender reserves as a multiple of the configured notional.
const POOL_DEPTH: u32 = 100;

pub async fn deploy_network(
    config: &EngineConfig,
    network_cfg: &NetworkConfig,
    sink: Arc<dyn EventSink>,
) -> Result<ArbitrageService> {
    let network = NetworkId::from(network_cfg.name.as_str());
    let admin = Address::from(config.engine.admin.as_str());
    let engine = Address::from(config.engine.address.as_str());
    let pair = AssetPair::new(
        Asset::from(network_cfg.base_asset.as_str()),
        Asset::from(network_cfg.quote_asset.as_str()),
    );
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let chain = Arc::new(SimulatedChain::new());
    let access = Arc::new(AccessControl::new(admin.clone()));

    let store: Arc<dyn SafetyStore> = match &config.safety.state_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("creating state dir {}", dir.display()))?;
            Arc::new(YamlSafetyStore::new(dir.join(format!("{}.yml", network_cfg.name))))
        }
        None => Arc::new(MemorySafetyStore::new()),
    };
    let safety = Arc::new(SafetyMonitor::with_store(
        config.safety_params(),
        access.clone(),
        sink.clone(),
        store,
    )?);
    let settings = Arc::new(EngineSettings::new(
        config.settings_params(),
        access.clone(),
        sink.clone(),
    ));
    let registry = Arc::new(ChainConfigRegistry::new(access, sink.clone()));

    let pool = Arc::new(SimulatedLendingPool::new(
        Address::from(network_cfg.loan_provider.as_str()),
        chain.clone(),
        network_cfg.flash_fee_bps,
    ));
    chain.mint(
        pool.address(),
        &pair.base,
        network_cfg.base_amount * Decimal::from(POOL_DEPTH),
    );
    registry
        .set_chain_config(
            &admin,
            &network,
            Some(pool.address().clone()),
            network_cfg.max_gas_budget,
        )
        .await?;

    let gas = GasModel::new(config.gas_config());
    let mut orchestrator = LoanOrchestrator::new(
        network.clone(),
        engine,
        registry,
        safety.clone(),
        settings.clone(),
        chain.clone(),
        clock.clone(),
        sink.clone(),
    )
    .with_provider(pool)
    .with_sizer(create_sizer(&network_cfg.sizing))
    .with_gas_model(gas.clone());

    for venue_cfg in &network_cfg.venues {
        let venue = FixedRateVenue::new(
            VenueId::from(venue_cfg.id.as_str()),
            Address::from(format!("{}:{}", network_cfg.name, venue_cfg.id).as_str()),
            chain.clone(),
            clock.clone(),
        )
        .with_rate(&pair.base, &pair.quote, venue_cfg.forward_rate)
        .with_rate(&pair.quote, &pair.base, venue_cfg.reverse_rate)
        .with_fee_bps(venue_cfg.fee_bps);
        chain.mint(venue.address(), &pair.base, venue_cfg.liquidity);
        chain.mint(venue.address(), &pair.quote, venue_cfg.liquidity);
        orchestrator = orchestrator.with_venue(Arc::new(venue));
    }

    let oracle = Arc::new(SimulatedPriceOracle::new(clock.clone()));
    oracle.set_price(&pair.quote, network_cfg.oracle_price);
    let gas_oracle = Arc::new(FixedGasOracle::new(GasMarket {
        gas_price: network_cfg.gas_price,
        base_fee: network_cfg.base_fee,
    }));

    let evaluator = ArbitrageEvaluator::new(
        network.clone(),
        pair.clone(),
        gas,
        gas_oracle,
        safety.clone(),
        settings,
        clock.clone(),
        sink.clone(),
    );

    info!(
        network = %network,
        pair = %pair,
        venues = network_cfg.venues.len(),
        "network deployed"
    );
    Ok(ArbitrageService::new(
        network_cfg.base_amount,
        network_cfg.min_profit,
        oracle,
        evaluator,
        Arc::new(orchestrator),
        safety,
        clock,
        sink,
    ))
}
