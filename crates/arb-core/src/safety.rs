//! Circuit breaker over the reference price and execution outcomes.
//!
//! Two states, ACTIVE and FROZEN. The monitor freezes itself when a rate-limited
//! price sample drops by more than `drop_threshold_pct` against the stored
//! baseline, or when `max_consecutive_failures` execution units fail in a row.
//! Leaving FROZEN always takes an explicit privileged `unfreeze`.

use crate::access::AccessControl;
use crate::store::{MemorySafetyStore, SafetyStore};
use common::errors::ArbError;
use common::events::{EngineEvent, EventSink};
use common::types::{Address, Asset, Price, PriceSample};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Configuration of the circuit breaker.
#[derive(Debug, Clone, PartialEq)]
pub struct SafetyParams {
    /// Percentage drop between two samples that freezes trading.
    pub drop_threshold_pct: Decimal,
    /// Minimum spacing between two recorded samples, in seconds.
    pub sample_interval_secs: u64,
    pub max_consecutive_failures: u32,
}

impl Default for SafetyParams {
    fn default() -> Self {
        Self {
            drop_threshold_pct: dec!(10),
            sample_interval_secs: 60,
            max_consecutive_failures: 3,
        }
    }
}

/// The persisted circuit breaker state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SafetyState {
    pub is_frozen: bool,
    pub frozen_reason: Option<String>,
    pub last_price: Option<Decimal>,
    pub last_sample_time: Option<u64>,
    pub consecutive_failures: u32,
    pub drop_threshold_pct: Decimal,
    pub sample_interval_secs: u64,
}

impl SafetyState {
    pub fn new(params: &SafetyParams) -> Self {
        Self {
            is_frozen: false,
            frozen_reason: None,
            last_price: None,
            last_sample_time: None,
            consecutive_failures: 0,
            drop_threshold_pct: params.drop_threshold_pct,
            sample_interval_secs: params.sample_interval_secs,
        }
    }

    fn staleness_window(&self) -> u64 {
        self.sample_interval_secs.saturating_mul(2)
    }

    fn freeze(&mut self, reason: String) {
        self.is_frozen = true;
        self.frozen_reason = Some(reason);
    }

    fn record_sample(&mut self, price: Decimal, now: u64) {
        self.last_price = Some(price);
        self.last_sample_time = Some(now);
    }
}

/// What happened to a price sample handed to [`SafetyMonitor::check_price`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SampleOutcome {
    /// First sample; stored as the baseline, nothing compared.
    Seeded,
    /// Compared against the baseline and stored. Positive means a drop.
    Compared { drop_pct: Decimal },
    /// Arrived before `sample_interval_secs` elapsed; ignored.
    RateLimited,
    /// Baseline was too old to compare against; the sample replaced it.
    Reseeded,
    /// The oracle reading itself was older than the staleness window.
    SkippedStaleReading,
    /// Zero or negative price; ignored.
    SkippedNonPositive,
}

pub struct SafetyMonitor {
    state: Mutex<SafetyState>,
    max_consecutive_failures: u32,
    access: Arc<AccessControl>,
    sink: Arc<dyn EventSink>,
    store: Arc<dyn SafetyStore>,
}

impl SafetyMonitor {
    /// Creates an ACTIVE monitor backed by an in-memory store.
    pub fn new(params: SafetyParams, access: Arc<AccessControl>, sink: Arc<dyn EventSink>) -> Self {
        Self {
            state: Mutex::new(SafetyState::new(&params)),
            max_consecutive_failures: params.max_consecutive_failures,
            access,
            sink,
            store: Arc::new(MemorySafetyStore::new()),
        }
    }

    /// Creates a monitor that resumes from `store` if it holds a saved state.
    /// Thresholds always come from `params`; frozen flag, failure count, and
    /// baseline come from the store.
    pub fn with_store(
        params: SafetyParams,
        access: Arc<AccessControl>,
        sink: Arc<dyn EventSink>,
        store: Arc<dyn SafetyStore>,
    ) -> Result<Self, ArbError> {
        let state = match store.load()? {
            Some(mut saved) => {
                saved.drop_threshold_pct = params.drop_threshold_pct;
                saved.sample_interval_secs = params.sample_interval_secs;
                if saved.is_frozen {
                    log::warn!(
                        "Resuming in FROZEN state: {}",
                        saved.frozen_reason.as_deref().unwrap_or("unknown reason")
                    );
                }
                saved
            }
            None => SafetyState::new(&params),
        };
        Ok(Self {
            state: Mutex::new(state),
            max_consecutive_failures: params.max_consecutive_failures,
            access,
            sink,
            store,
        })
    }

    /// Runs the store write on the blocking pool; file-backed stores do
    /// synchronous I/O.
    async fn persist(&self, next: &SafetyState) -> Result<(), ArbError> {
        let store = self.store.clone();
        let snapshot = next.clone();
        tokio::task::spawn_blocking(move || store.save(&snapshot))
            .await
            .map_err(|e| ArbError::Persistence(format!("store task failed: {}", e)))?
    }

    /// Persists `next` and only then makes it the live state.
    async fn commit(&self, state: &mut SafetyState, next: SafetyState) -> Result<(), ArbError> {
        self.persist(&next).await?;
        *state = next;
        Ok(())
    }

    /// Makes `next` live whether or not it could be persisted, then reports
    /// the store result. Only for changes that tighten the breaker: failure
    /// counts and freezes.
    async fn commit_tightening(
        &self,
        state: &mut SafetyState,
        next: SafetyState,
    ) -> Result<(), ArbError> {
        let saved = self.persist(&next).await;
        *state = next;
        if let Err(e) = &saved {
            log::error!("Safety state applied in memory but not persisted: {}", e);
        }
        saved
    }

    /// Feeds a reference price sample. Returns `UnsafeMarket` if trading is
    /// already halted or if this sample halts it.
    pub async fn check_price(
        &self,
        asset: &Asset,
        sample: PriceSample,
        now: u64,
    ) -> Result<SampleOutcome, ArbError> {
        let mut state = self.state.lock().await;
        if state.is_frozen {
            return Err(frozen_error(&state));
        }

        let price = sample.price.0;
        if price <= Decimal::ZERO {
            log::warn!("Ignoring non-positive {} price {}", asset, price);
            return Ok(SampleOutcome::SkippedNonPositive);
        }
        if sample.timestamp.saturating_add(state.staleness_window()) < now {
            log::warn!(
                "Ignoring stale {} price {} observed at {} (now {})",
                asset,
                price,
                sample.timestamp,
                now
            );
            return Ok(SampleOutcome::SkippedStaleReading);
        }

        let (previous, last_time) = match (state.last_price, state.last_sample_time) {
            (Some(previous), Some(last_time)) => (previous, last_time),
            _ => {
                let mut next = state.clone();
                next.record_sample(price, now);
                self.commit(&mut state, next).await?;
                self.emit_price(asset, price);
                return Ok(SampleOutcome::Seeded);
            }
        };

        if now < last_time.saturating_add(state.sample_interval_secs) {
            return Ok(SampleOutcome::RateLimited);
        }

        let mut next = state.clone();
        next.record_sample(price, now);

        if previous <= Decimal::ZERO || now - last_time > state.staleness_window() {
            log::warn!(
                "Baseline {} for {} unusable (sampled at {}); reseeding at {}",
                previous,
                asset,
                last_time,
                price
            );
            self.commit(&mut state, next).await?;
            self.emit_price(asset, price);
            return Ok(SampleOutcome::Reseeded);
        }

        let drop_pct = (previous - price) * dec!(100) / previous;
        if drop_pct > state.drop_threshold_pct {
            let reason = format!(
                "{} price dropped {}% ({} -> {}), threshold {}%",
                asset,
                drop_pct.round_dp(2),
                previous,
                price,
                state.drop_threshold_pct
            );
            next.freeze(reason.clone());
            // The halt stands even if the store is down.
            let _ = self.commit_tightening(&mut state, next).await;
            self.emit_price(asset, price);
            self.sink.emit(EngineEvent::TradingHalted {
                reason: reason.clone(),
            });
            return Err(ArbError::UnsafeMarket(reason));
        }

        self.commit(&mut state, next).await?;
        self.emit_price(asset, price);
        Ok(SampleOutcome::Compared { drop_pct })
    }

    /// Reports the outcome of an execution unit.
    ///
    /// A failure is counted in memory even when the store rejects the write;
    /// the store error is still returned. A success that cannot be persisted
    /// leaves the counter as it was.
    pub async fn record_outcome(&self, success: bool) -> Result<(), ArbError> {
        let mut state = self.state.lock().await;
        let mut next = state.clone();

        if success {
            next.consecutive_failures = 0;
            return self.commit(&mut state, next).await;
        }

        next.consecutive_failures = next.consecutive_failures.saturating_add(1);
        log::warn!(
            "Execution failure recorded ({} consecutive)",
            next.consecutive_failures
        );

        let halt = !next.is_frozen && next.consecutive_failures >= self.max_consecutive_failures;
        if !halt {
            return self.commit_tightening(&mut state, next).await;
        }

        let reason = format!("{} consecutive execution failures", next.consecutive_failures);
        next.freeze(reason.clone());
        let saved = self.commit_tightening(&mut state, next).await;
        self.sink.emit(EngineEvent::TradingHalted { reason });
        saved
    }

    /// True iff ACTIVE and the last recorded sample is within twice the
    /// sampling interval of `now`.
    pub async fn is_ready(&self, now: u64) -> bool {
        let state = self.state.lock().await;
        if state.is_frozen {
            return false;
        }
        match state.last_sample_time {
            Some(t) => now <= t.saturating_add(state.staleness_window()),
            None => false,
        }
    }

    pub async fn is_frozen(&self) -> bool {
        self.state.lock().await.is_frozen
    }

    /// Fails with `UnsafeMarket` while FROZEN.
    pub async fn ensure_active(&self) -> Result<(), ArbError> {
        let state = self.state.lock().await;
        if state.is_frozen {
            Err(frozen_error(&state))
        } else {
            Ok(())
        }
    }

    pub async fn consecutive_failures(&self) -> u32 {
        self.state.lock().await.consecutive_failures
    }

    pub async fn snapshot(&self) -> SafetyState {
        self.state.lock().await.clone()
    }

    /// Privileged manual halt.
    pub async fn freeze(&self, caller: &Address, reason: &str) -> Result<(), ArbError> {
        self.access.authorize(caller, "freeze trading")?;
        let mut state = self.state.lock().await;
        if state.is_frozen {
            return Ok(());
        }
        let reason = format!("manual freeze by {}: {}", caller, reason);
        let mut next = state.clone();
        next.freeze(reason.clone());
        let saved = self.commit_tightening(&mut state, next).await;
        self.sink.emit(EngineEvent::TradingHalted { reason });
        saved
    }

    /// Privileged return to ACTIVE. Also clears the failure counter.
    pub async fn unfreeze(&self, caller: &Address) -> Result<(), ArbError> {
        self.access.authorize(caller, "unfreeze trading")?;
        let mut state = self.state.lock().await;
        if !state.is_frozen {
            return Ok(());
        }
        let mut next = state.clone();
        next.is_frozen = false;
        next.frozen_reason = None;
        next.consecutive_failures = 0;
        self.commit(&mut state, next).await?;
        log::info!("Trading resumed by {}", caller);
        self.sink.emit(EngineEvent::TradingResumed { by: caller.clone() });
        Ok(())
    }

    fn emit_price(&self, asset: &Asset, price: Decimal) {
        self.sink.emit(EngineEvent::PriceChecked {
            asset: asset.clone(),
            price: Price(price),
        });
    }
}

fn frozen_error(state: &SafetyState) -> ArbError {
    ArbError::UnsafeMarket(
        state
            .frozen_reason
            .clone()
            .unwrap_or_else(|| "trading is frozen".to_string()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::events::MemorySink;

    const T0: u64 = 1_700_000_000;

    fn admin() -> Address {
        Address::from("0xadmin")
    }

    fn monitor() -> (SafetyMonitor, Arc<MemorySink>) {
        let sink = Arc::new(MemorySink::new());
        let monitor = SafetyMonitor::new(
            SafetyParams::default(),
            Arc::new(AccessControl::new(admin())),
            sink.clone(),
        );
        (monitor, sink)
    }

    fn halts(sink: &MemorySink) -> usize {
        sink.count_where(|e| matches!(e, EngineEvent::TradingHalted { .. }))
    }

    fn asset() -> Asset {
        Asset::from("WETH")
    }

    #[tokio::test]
    async fn test_first_sample_seeds_baseline() {
        let (monitor, _) = monitor();
        let outcome = monitor
            .check_price(&asset(), PriceSample::new(dec!(100), T0), T0)
            .await
            .unwrap();
        assert_eq!(outcome, SampleOutcome::Seeded);
        assert!(monitor.is_ready(T0).await);
    }

    #[tokio::test]
    async fn test_not_ready_without_sample() {
        let (monitor, _) = monitor();
        assert!(!monitor.is_ready(T0).await);
    }

    #[tokio::test]
    async fn test_drop_beyond_threshold_freezes_once() {
        let (monitor, sink) = monitor();
        monitor
            .check_price(&asset(), PriceSample::new(dec!(100), T0), T0)
            .await
            .unwrap();

        let err = monitor
            .check_price(&asset(), PriceSample::new(dec!(88), T0 + 60), T0 + 60)
            .await
            .unwrap_err();
        assert!(matches!(err, ArbError::UnsafeMarket(_)));
        assert!(!monitor.is_ready(T0 + 60).await);
        assert_eq!(halts(&sink), 1);

        // Further samples and failures while frozen never halt again.
        let again = monitor
            .check_price(&asset(), PriceSample::new(dec!(50), T0 + 120), T0 + 120)
            .await;
        assert!(matches!(again, Err(ArbError::UnsafeMarket(_))));
        monitor.record_outcome(false).await.unwrap();
        monitor.record_outcome(false).await.unwrap();
        monitor.record_outcome(false).await.unwrap();
        assert_eq!(halts(&sink), 1);
    }

    #[tokio::test]
    async fn test_drop_within_threshold_is_compared() {
        let (monitor, _) = monitor();
        monitor
            .check_price(&asset(), PriceSample::new(dec!(100), T0), T0)
            .await
            .unwrap();
        let outcome = monitor
            .check_price(&asset(), PriceSample::new(dec!(90), T0 + 60), T0 + 60)
            .await
            .unwrap();
        // Exactly at the threshold is not beyond it.
        assert_eq!(outcome, SampleOutcome::Compared { drop_pct: dec!(10) });
        assert!(!monitor.is_frozen().await);

        let outcome = monitor
            .check_price(&asset(), PriceSample::new(dec!(99), T0 + 120), T0 + 120)
            .await
            .unwrap();
        assert_eq!(outcome, SampleOutcome::Compared { drop_pct: dec!(-10) });
    }

    #[tokio::test]
    async fn test_samples_are_rate_limited() {
        let (monitor, _) = monitor();
        monitor
            .check_price(&asset(), PriceSample::new(dec!(100), T0), T0)
            .await
            .unwrap();

        // A crash inside the interval is not compared at all.
        let outcome = monitor
            .check_price(&asset(), PriceSample::new(dec!(10), T0 + 59), T0 + 59)
            .await
            .unwrap();
        assert_eq!(outcome, SampleOutcome::RateLimited);
        assert!(!monitor.is_frozen().await);
        assert_eq!(monitor.snapshot().await.last_price, Some(dec!(100)));
        assert_eq!(monitor.snapshot().await.last_sample_time, Some(T0));
    }

    #[tokio::test]
    async fn test_non_positive_price_is_skipped() {
        let (monitor, _) = monitor();
        let outcome = monitor
            .check_price(&asset(), PriceSample::new(dec!(0), T0), T0)
            .await
            .unwrap();
        assert_eq!(outcome, SampleOutcome::SkippedNonPositive);
        assert_eq!(monitor.snapshot().await.last_price, None);

        monitor
            .check_price(&asset(), PriceSample::new(dec!(100), T0), T0)
            .await
            .unwrap();
        let outcome = monitor
            .check_price(&asset(), PriceSample::new(dec!(-5), T0 + 60), T0 + 60)
            .await
            .unwrap();
        assert_eq!(outcome, SampleOutcome::SkippedNonPositive);
        assert!(!monitor.is_frozen().await);
    }

    #[tokio::test]
    async fn test_stale_baseline_is_reseeded() {
        let (monitor, _) = monitor();
        monitor
            .check_price(&asset(), PriceSample::new(dec!(100), T0), T0)
            .await
            .unwrap();
        let later = T0 + 1_000;
        let outcome = monitor
            .check_price(&asset(), PriceSample::new(dec!(50), later), later)
            .await
            .unwrap();
        assert_eq!(outcome, SampleOutcome::Reseeded);
        assert!(!monitor.is_frozen().await);
        assert_eq!(monitor.snapshot().await.last_price, Some(dec!(50)));
    }

    #[tokio::test]
    async fn test_stale_oracle_reading_is_skipped() {
        let (monitor, _) = monitor();
        let outcome = monitor
            .check_price(&asset(), PriceSample::new(dec!(100), T0 - 500), T0)
            .await
            .unwrap();
        assert_eq!(outcome, SampleOutcome::SkippedStaleReading);
        assert!(!monitor.is_ready(T0).await);
    }

    #[tokio::test]
    async fn test_readiness_expires() {
        let (monitor, _) = monitor();
        monitor
            .check_price(&asset(), PriceSample::new(dec!(100), T0), T0)
            .await
            .unwrap();
        assert!(monitor.is_ready(T0 + 120).await);
        assert!(!monitor.is_ready(T0 + 121).await);
    }

    #[tokio::test]
    async fn test_three_failures_freeze() {
        let (monitor, sink) = monitor();
        monitor.record_outcome(false).await.unwrap();
        monitor.record_outcome(false).await.unwrap();
        assert!(!monitor.is_frozen().await);
        monitor.record_outcome(false).await.unwrap();
        assert!(monitor.is_frozen().await);
        assert_eq!(monitor.consecutive_failures().await, 3);
        assert_eq!(halts(&sink), 1);
        assert!(matches!(
            monitor.ensure_active().await,
            Err(ArbError::UnsafeMarket(_))
        ));
    }

    #[tokio::test]
    async fn test_success_resets_failures() {
        let (monitor, _) = monitor();
        monitor.record_outcome(false).await.unwrap();
        monitor.record_outcome(false).await.unwrap();
        monitor.record_outcome(true).await.unwrap();
        assert_eq!(monitor.consecutive_failures().await, 0);

        monitor.record_outcome(false).await.unwrap();
        monitor.record_outcome(false).await.unwrap();
        assert!(!monitor.is_frozen().await);
    }

    #[tokio::test]
    async fn test_unfreeze_requires_admin() {
        let (monitor, sink) = monitor();
        for _ in 0..3 {
            monitor.record_outcome(false).await.unwrap();
        }
        let err = monitor
            .unfreeze(&Address::from("0xmallory"))
            .await
            .unwrap_err();
        assert!(matches!(err, ArbError::UnauthorizedCaller(_)));
        assert!(monitor.is_frozen().await);

        monitor.unfreeze(&admin()).await.unwrap();
        assert!(!monitor.is_frozen().await);
        assert_eq!(monitor.consecutive_failures().await, 0);
        assert_eq!(
            sink.count_where(|e| matches!(e, EngineEvent::TradingResumed { .. })),
            1
        );
    }

    #[tokio::test]
    async fn test_manual_freeze() {
        let (monitor, sink) = monitor();
        assert!(monitor
            .freeze(&Address::from("0xmallory"), "test")
            .await
            .is_err());
        monitor.freeze(&admin(), "maintenance").await.unwrap();
        monitor.freeze(&admin(), "maintenance").await.unwrap();
        assert!(monitor.is_frozen().await);
        assert_eq!(halts(&sink), 1);
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

    fn failing_monitor() -> (SafetyMonitor, Arc<MemorySink>) {
        let sink = Arc::new(MemorySink::new());
        let monitor = SafetyMonitor::with_store(
            SafetyParams::default(),
            Arc::new(AccessControl::new(admin())),
            sink.clone(),
            Arc::new(FailingStore),
        )
        .unwrap();
        (monitor, sink)
    }

    #[tokio::test]
    async fn test_failed_save_still_counts_failures() {
        let (monitor, sink) = failing_monitor();
        for expected in 1..=2 {
            assert!(matches!(
                monitor.record_outcome(false).await,
                Err(ArbError::Persistence(_))
            ));
            assert_eq!(monitor.consecutive_failures().await, expected);
        }
        assert!(!monitor.is_frozen().await);

        assert!(monitor.record_outcome(false).await.is_err());
        assert_eq!(monitor.consecutive_failures().await, 3);
        assert!(monitor.is_frozen().await);
        assert_eq!(halts(&sink), 1);
    }

    #[tokio::test]
    async fn test_failed_save_blocks_loosening_changes() {
        let (monitor, _) = failing_monitor();
        monitor.record_outcome(false).await.ok();

        // Loosening changes are not applied without a durable write.
        assert!(monitor.record_outcome(true).await.is_err());
        assert_eq!(monitor.consecutive_failures().await, 1);
        assert!(monitor
            .check_price(&asset(), PriceSample::new(dec!(100), T0), T0)
            .await
            .is_err());
        assert_eq!(monitor.snapshot().await.last_price, None);

        assert!(monitor.freeze(&admin(), "maintenance").await.is_err());
        assert!(monitor.is_frozen().await);
        assert!(monitor.unfreeze(&admin()).await.is_err());
        assert!(monitor.is_frozen().await);
    }

    #[tokio::test]
    async fn test_resumes_frozen_from_store() {
        let store = Arc::new(MemorySafetyStore::new());
        let access = Arc::new(AccessControl::new(admin()));
        let first = SafetyMonitor::with_store(
            SafetyParams::default(),
            access.clone(),
            Arc::new(MemorySink::new()),
            store.clone(),
        )
        .unwrap();
        for _ in 0..3 {
            first.record_outcome(false).await.unwrap();
        }

        let params = SafetyParams {
            drop_threshold_pct: dec!(5),
            ..SafetyParams::default()
        };
        let second =
            SafetyMonitor::with_store(params, access, Arc::new(MemorySink::new()), store).unwrap();
        assert!(second.is_frozen().await);
        assert_eq!(second.snapshot().await.drop_threshold_pct, dec!(5));
    }
}
