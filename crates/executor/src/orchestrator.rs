//! The atomic borrow, swap, swap, repay unit.

use crate::params::CallbackParams;
use arb_core::{ChainConfigRegistry, EngineSettings, ExecutionGuard, SafetyMonitor};
use async_trait::async_trait;
use common::errors::ArbError;
use common::events::{EngineEvent, EventSink};
use common::traits::{Clock, FlashLoanCall, LoanCallback, LoanProvider, LoanReceiver, TokenLedger};
use common::types::{Address, Asset, AssetPair, LoanRequest, NetworkId, VenueId};
use detector::{FixedNotional, GasModel, LoanSizer};
use dex_adapter_trait::{final_amount, Venue};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Outcome of a committed unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionReport {
    pub request_id: Uuid,
    pub network: NetworkId,
    pub venue: VenueId,
    pub borrowed: Decimal,
    pub fee: Decimal,
    /// Settlement balance gained by the two swaps, before the fee.
    pub actual_profit: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Settlement {
    fee: Decimal,
    actual_profit: Decimal,
}

/// What the orchestrator expects the provider to call back with.
#[derive(Debug, Clone)]
struct PendingIntent {
    request: LoanRequest,
    venue: VenueId,
    provider: Address,
    settlement: Option<Settlement>,
}

/// Sizes, requests and settles flash loans on one network.
///
/// The orchestrator is both the initiator of the loan and its receiver. The
/// provider's callback is accepted only while a request registered by this
/// orchestrator is in flight, and only from the configured provider.
pub struct LoanOrchestrator {
    network: NetworkId,
    address: Address,
    registry: Arc<ChainConfigRegistry>,
    safety: Arc<SafetyMonitor>,
    settings: Arc<EngineSettings>,
    ledger: Arc<dyn TokenLedger>,
    clock: Arc<dyn Clock>,
    sink: Arc<dyn EventSink>,
    providers: HashMap<Address, Arc<dyn LoanProvider>>,
    venues: Vec<Arc<dyn Venue>>,
    sizer: Box<dyn LoanSizer>,
    gas: GasModel,
    request_guard: ExecutionGuard,
    callback_guard: ExecutionGuard,
    pending: Mutex<Option<PendingIntent>>,
}

impl LoanOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        network: NetworkId,
        address: Address,
        registry: Arc<ChainConfigRegistry>,
        safety: Arc<SafetyMonitor>,
        settings: Arc<EngineSettings>,
        ledger: Arc<dyn TokenLedger>,
        clock: Arc<dyn Clock>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            network,
            address,
            registry,
            safety,
            settings,
            ledger,
            clock,
            sink,
            providers: HashMap::new(),
            venues: Vec::new(),
            sizer: Box::new(FixedNotional),
            gas: GasModel::with_defaults(),
            request_guard: ExecutionGuard::new(),
            callback_guard: ExecutionGuard::new(),
            pending: Mutex::new(None),
        }
    }

    /// Makes a provider reachable. Which one is used is decided per request by
    /// the chain configuration.
    pub fn with_provider(mut self, provider: Arc<dyn LoanProvider>) -> Self {
        self.providers.insert(provider.address().clone(), provider);
        self
    }

    /// Registers a venue. Registration order is the evaluation order.
    pub fn with_venue(mut self, venue: Arc<dyn Venue>) -> Self {
        self.venues.push(venue);
        self
    }

    pub fn with_sizer(mut self, sizer: Box<dyn LoanSizer>) -> Self {
        self.sizer = sizer;
        self
    }

    pub fn with_gas_model(mut self, gas: GasModel) -> Self {
        self.gas = gas;
        self
    }

    pub fn network(&self) -> &NetworkId {
        &self.network
    }

    pub fn venues(&self) -> &[Arc<dyn Venue>] {
        &self.venues
    }

    pub fn is_executing(&self) -> bool {
        self.request_guard.is_locked()
    }

    fn venue(&self, id: &VenueId) -> Result<&Arc<dyn Venue>, ArbError> {
        self.venues
            .iter()
            .find(|v| v.id() == id)
            .ok_or_else(|| ArbError::UnknownVenue(id.clone()))
    }

    /// Borrows `pair.base`, round-trips it through `pair.quote` on `venue_id`
    /// and repays within one unit.
    ///
    /// Pre-flight rejections happen before any external call. Failures of the
    /// unit itself roll every effect back and count towards the circuit
    /// breaker; a committed unit resets the count.
    pub async fn request_atomic_arbitrage(
        &self,
        pair: &AssetPair,
        venue_id: &VenueId,
        amount: Decimal,
        min_profit: Decimal,
    ) -> Result<ExecutionReport, ArbError> {
        let _lock = self.request_guard.enter()?;

        self.safety.ensure_active().await?;
        if amount <= Decimal::ZERO || min_profit < Decimal::ZERO {
            return Err(ArbError::InvalidParams(format!(
                "amount {} must be positive and min profit {} non-negative",
                amount, min_profit
            )));
        }
        let provider_address = self
            .registry
            .preflight(&self.network, self.gas.round_trip_gas_units())
            .await?;
        let provider = self
            .providers
            .get(&provider_address)
            .cloned()
            .ok_or_else(|| ArbError::ConfigMissing(self.network.clone()))?;
        let venue = self.venue(venue_id)?;

        let liquidity = venue.liquidity(&pair.base).await;
        let sized = self.sizer.size(amount, liquidity);
        if sized <= Decimal::ZERO {
            return Err(ArbError::InvalidParams(format!(
                "{} sizer produced {} from {}",
                self.sizer.name(),
                sized,
                amount
            )));
        }

        let request = LoanRequest {
            id: Uuid::new_v4(),
            asset: pair.base.clone(),
            amount: sized,
            min_profit,
            initiator: self.address.clone(),
        };
        let params = CallbackParams {
            request_id: request.id,
            venue: venue_id.clone(),
            quote_asset: pair.quote.clone(),
            min_profit,
        }
        .encode()?;
        let call = FlashLoanCall {
            assets: vec![request.asset.clone()],
            amounts: vec![sized],
            modes: vec![0],
            on_behalf_of: self.address.clone(),
            params,
            referral_code: 0,
        };

        log::debug!(
            "[{}] requesting {} {} from {} for {} (min profit {})",
            self.network,
            sized,
            request.asset,
            provider_address,
            venue_id,
            min_profit
        );
        *self.pending.lock().await = Some(PendingIntent {
            request: request.clone(),
            venue: venue_id.clone(),
            provider: provider_address,
            settlement: None,
        });

        let result = provider.request_loan(&self.address, self, call).await;
        let intent = self.pending.lock().await.take();

        let outcome = result.and_then(|()| {
            intent.and_then(|i| i.settlement).ok_or_else(|| {
                ArbError::LoanFailed("provider returned without running the callback".to_string())
            })
        });

        match outcome {
            Ok(settlement) => {
                if let Err(store_err) = self.safety.record_outcome(true).await {
                    log::error!(
                        "[{}] unit committed but success was not persisted: {}",
                        self.network,
                        store_err
                    );
                }
                log::info!(
                    "[{}] arbitrage on {} committed: profit {} (fee {})",
                    self.network,
                    venue_id,
                    settlement.actual_profit,
                    settlement.fee
                );
                self.sink.emit(EngineEvent::ArbitrageExecuted {
                    network: self.network.clone(),
                    venue: venue_id.clone(),
                    profit: settlement.actual_profit,
                });
                Ok(ExecutionReport {
                    request_id: request.id,
                    network: self.network.clone(),
                    venue: venue_id.clone(),
                    borrowed: sized,
                    fee: settlement.fee,
                    actual_profit: settlement.actual_profit,
                })
            }
            Err(e) => {
                if e.is_execution_failure() {
                    if let Err(store_err) = self.safety.record_outcome(false).await {
                        log::error!(
                            "[{}] failure counted but not persisted: {}",
                            self.network,
                            store_err
                        );
                    }
                }
                log::warn!("[{}] arbitrage on {} rolled back: {}", self.network, venue_id, e);
                Err(e)
            }
        }
    }

    /// Sender, initiator and intent checks. Nothing is mutated on failure.
    async fn authorize_callback(
        &self,
        sender: &Address,
        callback: &LoanCallback,
    ) -> Result<(PendingIntent, CallbackParams), ArbError> {
        let intent = self
            .pending
            .lock()
            .await
            .clone()
            .ok_or_else(|| ArbError::UnauthorizedCaller("no loan is pending".to_string()))?;

        let configured = self.registry.loan_provider(&self.network).await;
        if configured.as_ref() != Some(sender) || sender != &intent.provider {
            return Err(ArbError::UnauthorizedCaller(format!(
                "callback from {} but the loan provider for {} is {}",
                sender,
                self.network,
                intent.provider
            )));
        }
        if callback.initiator != self.address {
            return Err(ArbError::UnauthorizedCaller(format!(
                "loan initiated by {}, not {}",
                callback.initiator, self.address
            )));
        }

        let params = CallbackParams::decode(&callback.params)
            .map_err(|e| ArbError::UnauthorizedCaller(e.to_string()))?;
        let request = &intent.request;
        let matches_intent = params.request_id == request.id
            && params.venue == intent.venue
            && callback.assets.len() == 1
            && callback.assets[0] == request.asset
            && callback.amounts.len() == 1
            && callback.amounts[0] == request.amount
            && callback.fees.len() == 1;
        if !matches_intent {
            return Err(ArbError::UnauthorizedCaller(format!(
                "callback does not match pending request {}",
                request.id
            )));
        }
        Ok((intent, params))
    }

    async fn balance(&self, asset: &Asset) -> Result<Decimal, ArbError> {
        self.ledger
            .balance_of(asset, &self.address)
            .await
            .map_err(|e| ArbError::LoanFailed(format!("reading {} balance: {}", asset, e)))
    }

    /// Approve-then-swap of one hop, bounded by slippage tolerance and deadline.
    async fn swap_hop(
        &self,
        venue: &Arc<dyn Venue>,
        amount_in: Decimal,
        path: &[Asset],
    ) -> Result<Decimal, ArbError> {
        let failed = |reason: String| ArbError::SwapFailed {
            venue: venue.id().clone(),
            reason,
        };

        let expected = venue
            .quote(amount_in, path)
            .await
            .and_then(|amounts| final_amount(&amounts))
            .map_err(|e| failed(format!("quote: {}", e)))?;
        let min_out = self.settings.min_amount_out(expected);

        self.ledger
            .approve(&self.address, venue.spender(), &path[0], amount_in)
            .await
            .map_err(|e| failed(format!("approve: {}", e)))?;

        let deadline = self.clock.now() + self.settings.deadline_secs();
        let amounts = venue
            .swap(amount_in, min_out, path, &self.address, deadline)
            .await
            .map_err(|e| failed(e.to_string()))?;
        final_amount(&amounts).map_err(|e| failed(e.to_string()))
    }
}

#[async_trait]
impl LoanReceiver for LoanOrchestrator {
    fn address(&self) -> &Address {
        &self.address
    }

    async fn on_loan_callback(
        &self,
        sender: &Address,
        callback: LoanCallback,
    ) -> Result<(), ArbError> {
        let _lock = self.callback_guard.enter()?;
        let (intent, params) = self.authorize_callback(sender, &callback).await?;

        let asset = &intent.request.asset;
        let amount = intent.request.amount;
        let fee = callback.fees[0];
        let venue = self.venue(&intent.venue)?;

        let pre_balance = self.balance(asset).await?;
        let received = self
            .swap_hop(venue, amount, &[asset.clone(), params.quote_asset.clone()])
            .await?;
        self.swap_hop(venue, received, &[params.quote_asset.clone(), asset.clone()])
            .await?;
        let post_balance = self.balance(asset).await?;

        let actual_profit = post_balance - pre_balance;
        if actual_profit < params.min_profit {
            return Err(ArbError::InsufficientProfit {
                actual: actual_profit,
                required: params.min_profit,
            });
        }
        let owed = amount + fee;
        if post_balance < owed {
            return Err(ArbError::InsufficientProfit {
                actual: actual_profit,
                required: owed - pre_balance,
            });
        }

        self.ledger
            .approve(&self.address, sender, asset, owed)
            .await
            .map_err(|e| ArbError::LoanFailed(format!("approving repayment: {}", e)))?;

        if let Some(pending) = self.pending.lock().await.as_mut() {
            pending.settlement = Some(Settlement { fee, actual_profit });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arb_core::{
        AccessControl, MemorySafetyStore, SafetyParams, SafetyState, SafetyStore, SettingsParams,
    };
    use common::events::MemorySink;
    use dex_adapters::{FixedRateVenue, ManualClock, SimulatedChain, SimulatedLendingPool};
    use rust_decimal_macros::dec;

    struct Fixture {
        chain: Arc<SimulatedChain>,
        safety: Arc<SafetyMonitor>,
        sink: Arc<MemorySink>,
        orchestrator: LoanOrchestrator,
    }

    struct FailingStore;

    impl SafetyStore for FailingStore {
        fn load(&self) -> Result<Option<SafetyState>, ArbError> {
            Ok(None)
        }

        fn save(&self, _state: &SafetyState) -> Result<(), ArbError> {
            Err(ArbError::Persistence("disk full".to_string()))
        }
    }

    fn pair() -> AssetPair {
        AssetPair::new(Asset::from("USDC"), Asset::from("WETH"))
    }

    async fn fixture(reverse_rate: Decimal) -> Fixture {
        fixture_with_store(reverse_rate, Arc::new(MemorySafetyStore::new())).await
    }

    async fn fixture_with_store(reverse_rate: Decimal, store: Arc<dyn SafetyStore>) -> Fixture {
        let admin = Address::from("0xadmin");
        let access = Arc::new(AccessControl::new(admin.clone()));
        let sink = Arc::new(MemorySink::new());
        let clock = Arc::new(ManualClock::new(1_000));
        let chain = Arc::new(SimulatedChain::new());
        let network = NetworkId::from("testnet");

        let registry = Arc::new(ChainConfigRegistry::new(access.clone(), sink.clone()));
        let safety = Arc::new(
            SafetyMonitor::with_store(SafetyParams::default(), access.clone(), sink.clone(), store)
                .unwrap(),
        );
        let settings = Arc::new(EngineSettings::new(
            SettingsParams::default(),
            access,
            sink.clone(),
        ));

        let pool = Arc::new(SimulatedLendingPool::new(
            Address::from("0xpool"),
            chain.clone(),
            0,
        ));
        chain.mint(pool.address(), &pair().base, dec!(100000));
        registry
            .set_chain_config(&admin, &network, Some(pool.address().clone()), 1_000_000)
            .await
            .unwrap();

        let venue = FixedRateVenue::new(
            VenueId::from("venue-a"),
            Address::from("0xvenue-a"),
            chain.clone(),
            clock.clone(),
        )
        .with_rate(&pair().base, &pair().quote, dec!(1))
        .with_rate(&pair().quote, &pair().base, reverse_rate);
        chain.mint(venue.address(), &pair().base, dec!(100000));
        chain.mint(venue.address(), &pair().quote, dec!(100000));

        let orchestrator = LoanOrchestrator::new(
            network,
            Address::from("0xengine"),
            registry,
            safety.clone(),
            settings,
            chain.clone(),
            clock,
            sink.clone(),
        )
        .with_provider(pool)
        .with_venue(Arc::new(venue));

        Fixture {
            chain,
            safety,
            sink,
            orchestrator,
        }
    }

    #[tokio::test]
    async fn test_profitable_unit_commits() {
        let f = fixture(dec!(1.01)).await;
        let report = f
            .orchestrator
            .request_atomic_arbitrage(&pair(), &VenueId::from("venue-a"), dec!(1000), dec!(5))
            .await
            .unwrap();

        assert_eq!(report.actual_profit, dec!(10));
        assert_eq!(report.borrowed, dec!(1000));
        assert_eq!(
            f.chain.balance(&pair().base, &Address::from("0xengine")),
            dec!(10)
        );
        assert!(!f.orchestrator.is_executing());
    }

    #[tokio::test]
    async fn test_short_profit_rolls_back() {
        let f = fixture(dec!(1.001)).await;
        let before = f.chain.snapshot();
        let err = f
            .orchestrator
            .request_atomic_arbitrage(&pair(), &VenueId::from("venue-a"), dec!(1000), dec!(5))
            .await
            .unwrap_err();

        assert_eq!(
            err,
            ArbError::InsufficientProfit {
                actual: dec!(1),
                required: dec!(5)
            }
        );
        assert_eq!(f.chain.snapshot(), before);
        assert_eq!(f.safety.consecutive_failures().await, 1);
        assert!(!f.orchestrator.is_executing());
    }

    #[tokio::test]
    async fn test_unknown_venue_is_not_a_failure() {
        let f = fixture(dec!(1.01)).await;
        let err = f
            .orchestrator
            .request_atomic_arbitrage(&pair(), &VenueId::from("nowhere"), dec!(1000), dec!(0))
            .await
            .unwrap_err();
        assert_eq!(err, ArbError::UnknownVenue(VenueId::from("nowhere")));
        assert_eq!(f.safety.consecutive_failures().await, 0);
    }

    #[tokio::test]
    async fn test_callback_without_pending_request_is_rejected() {
        let f = fixture(dec!(1.01)).await;
        let err = f
            .orchestrator
            .on_loan_callback(
                &Address::from("0xpool"),
                LoanCallback {
                    assets: vec![pair().base],
                    amounts: vec![dec!(1000)],
                    fees: vec![dec!(0)],
                    initiator: Address::from("0xengine"),
                    params: Vec::new(),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ArbError::UnauthorizedCaller(_)));
    }

    #[tokio::test]
    async fn test_rejects_bad_amounts() {
        let f = fixture(dec!(1.01)).await;
        let venue = VenueId::from("venue-a");
        assert!(matches!(
            f.orchestrator
                .request_atomic_arbitrage(&pair(), &venue, dec!(0), dec!(1))
                .await,
            Err(ArbError::InvalidParams(_))
        ));
        assert!(matches!(
            f.orchestrator
                .request_atomic_arbitrage(&pair(), &venue, dec!(10), dec!(-1))
                .await,
            Err(ArbError::InvalidParams(_))
        ));
    }

    #[tokio::test]
    async fn test_committed_unit_reported_when_store_fails() {
        let f = fixture_with_store(dec!(1.01), Arc::new(FailingStore)).await;
        let report = f
            .orchestrator
            .request_atomic_arbitrage(&pair(), &VenueId::from("venue-a"), dec!(1000), dec!(5))
            .await
            .unwrap();

        assert_eq!(report.actual_profit, dec!(10));
        assert_eq!(
            f.chain.balance(&pair().base, &Address::from("0xengine")),
            dec!(10)
        );
        assert_eq!(
            f.sink
                .count_where(|e| matches!(e, EngineEvent::ArbitrageExecuted { .. })),
            1
        );
    }

    #[tokio::test]
    async fn test_failures_freeze_when_store_fails() {
        let f = fixture_with_store(dec!(1.001), Arc::new(FailingStore)).await;
        let venue = VenueId::from("venue-a");
        for expected in 1..=3 {
            let err = f
                .orchestrator
                .request_atomic_arbitrage(&pair(), &venue, dec!(1000), dec!(5))
                .await
                .unwrap_err();
            assert!(matches!(err, ArbError::InsufficientProfit { .. }));
            assert_eq!(f.safety.consecutive_failures().await, expected);
        }
        assert!(f.safety.is_frozen().await);

        let err = f
            .orchestrator
            .request_atomic_arbitrage(&pair(), &venue, dec!(1000), dec!(5))
            .await
            .unwrap_err();
        assert!(matches!(err, ArbError::UnsafeMarket(_)));
    }
}
