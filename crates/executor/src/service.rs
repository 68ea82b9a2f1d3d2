use crate::orchestrator::{ExecutionReport, LoanOrchestrator};
use arb_core::SafetyMonitor;
use common::errors::ArbError;
use common::events::{EngineEvent, EventSink};
use common::traits::{Clock, PriceOracle};
use common::types::{AssetPair, NetworkId};
use detector::ArbitrageEvaluator;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::Receiver;
use tokio::sync::Mutex;

/// What one trigger of the service did.
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    Executed(ExecutionReport),
    /// No venue passed the evaluator.
    Skipped,
    /// The circuit breaker is, or just became, FROZEN.
    Halted(String),
    /// Execution was attempted and rejected or rolled back.
    Failed(ArbError),
}

/// Drives one network: sample the oracle, evaluate, execute.
pub struct ArbitrageService {
    network: NetworkId,
    pair: AssetPair,
    base_amount: Decimal,
    min_profit: Decimal,
    oracle: Arc<dyn PriceOracle>,
    evaluator: ArbitrageEvaluator,
    orchestrator: Arc<LoanOrchestrator>,
    safety: Arc<SafetyMonitor>,
    clock: Arc<dyn Clock>,
    sink: Arc<dyn EventSink>,
    cycle_lock: Mutex<()>,
}

impl ArbitrageService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        base_amount: Decimal,
        min_profit: Decimal,
        oracle: Arc<dyn PriceOracle>,
        evaluator: ArbitrageEvaluator,
        orchestrator: Arc<LoanOrchestrator>,
        safety: Arc<SafetyMonitor>,
        clock: Arc<dyn Clock>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            network: orchestrator.network().clone(),
            pair: evaluator.pair().clone(),
            base_amount,
            min_profit,
            oracle,
            evaluator,
            orchestrator,
            safety,
            clock,
            sink,
            cycle_lock: Mutex::new(()),
        }
    }

    pub fn network(&self) -> &NetworkId {
        &self.network
    }

    /// Runs one trigger. Cycles on the same network never overlap.
    pub async fn run_cycle(&self) -> CycleOutcome {
        let _cycle = self.cycle_lock.lock().await;

        match self.oracle.latest_price(&self.pair.quote).await {
            Ok(sample) => {
                match self
                    .safety
                    .check_price(&self.pair.quote, sample, self.clock.now())
                    .await
                {
                    Ok(outcome) => log::debug!("[{}] price sample: {:?}", self.network, outcome),
                    Err(ArbError::UnsafeMarket(reason)) => {
                        self.sink.emit(EngineEvent::NetworkSkipped {
                            network: self.network.clone(),
                            reason: format!("trading halted: {}", reason),
                        });
                        return CycleOutcome::Halted(reason);
                    }
                    Err(e) => {
                        log::error!("[{}] price check failed: {}", self.network, e);
                        return CycleOutcome::Failed(e);
                    }
                }
            }
            // The readiness gate catches a feed that stays down.
            Err(e) => log::warn!("[{}] oracle read failed: {}", self.network, e),
        }

        let selection = match self
            .evaluator
            .evaluate(self.orchestrator.venues(), self.base_amount)
            .await
        {
            Some(selection) => selection,
            None => return CycleOutcome::Skipped,
        };

        match self
            .orchestrator
            .request_atomic_arbitrage(
                &self.pair,
                &selection.venue,
                selection.amount_in,
                self.min_profit,
            )
            .await
        {
            Ok(report) => CycleOutcome::Executed(report),
            Err(e) => {
                self.sink.emit(EngineEvent::NetworkSkipped {
                    network: self.network.clone(),
                    reason: e.to_string(),
                });
                match e {
                    ArbError::UnsafeMarket(reason) => CycleOutcome::Halted(reason),
                    other => CycleOutcome::Failed(other),
                }
            }
        }
    }

    /// Triggers a cycle every `interval` until `shutdown_rx` fires or
    /// `max_cycles` have run. Returns the number of cycles run.
    pub async fn run(
        &self,
        interval: Duration,
        max_cycles: Option<u64>,
        mut shutdown_rx: Receiver<()>,
    ) -> u64 {
        let mut ticker = tokio::time::interval(interval);
        let mut cycles = 0u64;
        loop {
            if max_cycles.is_some_and(|max| cycles >= max) {
                log::info!("[{}] completed {} cycles", self.network, cycles);
                break;
            }
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    log::info!("[{}] service shutting down.", self.network);
                    break;
                }
                _ = ticker.tick() => {
                    let outcome = self.run_cycle().await;
                    cycles += 1;
                    match &outcome {
                        CycleOutcome::Executed(report) => log::info!(
                            "[{}] cycle {}: executed on {}, profit {}",
                            self.network, cycles, report.venue, report.actual_profit
                        ),
                        CycleOutcome::Skipped => log::debug!("[{}] cycle {}: skipped", self.network, cycles),
                        CycleOutcome::Halted(reason) => log::error!(
                            "[{}] cycle {}: trading halted: {}", self.network, cycles, reason
                        ),
                        CycleOutcome::Failed(e) => log::warn!(
                            "[{}] cycle {}: {}", self.network, cycles, e
                        ),
                    }
                }
            }
        }
        cycles
    }
}
