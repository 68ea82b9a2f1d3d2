//! Cross-venue round trip evaluation.

use crate::gas::GasModel;
use arb_core::{EngineSettings, SafetyMonitor};
use common::errors::ArbError;
use common::events::{EngineEvent, EventSink};
use common::traits::{Clock, GasOracle};
use common::types::{Asset, AssetPair, NetworkId, RoundTripQuote, VenueSelection};
use dex_adapter_trait::{final_amount, Venue};
use futures::future::join_all;
use rust_decimal::Decimal;
use std::sync::Arc;

/// Picks the most profitable venue for an A -> B -> A round trip on one network.
pub struct ArbitrageEvaluator {
    network: NetworkId,
    pair: AssetPair,
    gas: GasModel,
    gas_oracle: Arc<dyn GasOracle>,
    safety: Arc<SafetyMonitor>,
    settings: Arc<EngineSettings>,
    clock: Arc<dyn Clock>,
    sink: Arc<dyn EventSink>,
}

impl ArbitrageEvaluator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        network: NetworkId,
        pair: AssetPair,
        gas: GasModel,
        gas_oracle: Arc<dyn GasOracle>,
        safety: Arc<SafetyMonitor>,
        settings: Arc<EngineSettings>,
        clock: Arc<dyn Clock>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            network,
            pair,
            gas,
            gas_oracle,
            safety,
            settings,
            clock,
            sink,
        }
    }

    pub fn pair(&self) -> &AssetPair {
        &self.pair
    }

    /// Returns the venue to execute on, or `None` when the network should be
    /// skipped this round. Every skip is emitted with its reason.
    pub async fn evaluate(
        &self,
        venues: &[Arc<dyn Venue>],
        base_amount: Decimal,
    ) -> Option<VenueSelection> {
        let market = match self.gas_oracle.gas_market().await {
            Ok(market) => market,
            Err(e) => return self.skip(format!("gas oracle unavailable: {}", e)),
        };
        if self.gas.is_congested(&market) {
            return self.skip(format!(
                "network congested: gas price {} > 2 x base fee {}",
                market.gas_price, market.base_fee
            ));
        }
        if !self.safety.is_ready(self.clock.now()).await {
            return self.skip("safety monitor not ready".to_string());
        }
        if venues.is_empty() {
            return self.skip("no venues registered".to_string());
        }

        let quotes = self.quote_venues(venues, base_amount).await;
        let best = match select_best(&quotes) {
            Some(best) if best.profit > Decimal::ZERO => best,
            _ => return self.skip("no profitable venue".to_string()),
        };

        let gas_cost = self
            .gas
            .execution_cost(&market, self.gas.round_trip_gas_units());
        let max_gas_pct = self.settings.max_gas_pct();
        if !GasModel::cost_within_budget(gas_cost, best.profit, max_gas_pct) {
            let err = ArbError::Unprofitable(format!(
                "gas cost {} exceeds {}% of profit {} on {}",
                gas_cost, max_gas_pct, best.profit, best.venue
            ));
            return self.skip(err.to_string());
        }

        let selection = VenueSelection {
            venue: best.venue.clone(),
            amount_in: best.amount_in,
            gross_profit: best.profit,
            gas_cost,
            net_profit: best.profit - gas_cost,
        };
        log::info!(
            "[{}] selected {} for {}: gross {} gas {} net {}",
            self.network,
            selection.venue,
            self.pair,
            selection.gross_profit,
            selection.gas_cost,
            selection.net_profit
        );
        Some(selection)
    }

    /// Quotes every venue concurrently. Results keep the order of `venues`.
    pub async fn quote_venues(
        &self,
        venues: &[Arc<dyn Venue>],
        base_amount: Decimal,
    ) -> Vec<RoundTripQuote> {
        let path = self.pair.round_trip_path();
        join_all(
            venues
                .iter()
                .map(|venue| quote_round_trip(venue.as_ref(), base_amount, &path)),
        )
        .await
    }

    fn skip(&self, reason: String) -> Option<VenueSelection> {
        self.sink.emit(EngineEvent::NetworkSkipped {
            network: self.network.clone(),
            reason,
        });
        None
    }
}

/// Prices one round trip. A venue that cannot quote is worth zero.
async fn quote_round_trip(
    venue: &dyn Venue,
    amount_in: Decimal,
    path: &[Asset],
) -> RoundTripQuote {
    let result = venue
        .quote(amount_in, path)
        .await
        .and_then(|amounts| final_amount(&amounts));
    match result {
        Ok(amount_out) => RoundTripQuote::new(venue.id().clone(), amount_in, amount_out),
        Err(e) => {
            let err = ArbError::QuoteUnavailable {
                venue: venue.id().clone(),
                reason: e.to_string(),
            };
            log::warn!("{}", err);
            RoundTripQuote::unavailable(venue.id().clone(), amount_in)
        }
    }
}

/// Highest profit wins; on equal profit the earlier quote wins.
pub fn select_best(quotes: &[RoundTripQuote]) -> Option<&RoundTripQuote> {
    quotes.iter().fold(None, |best, quote| match best {
        Some(current) if quote.profit <= current.profit => Some(current),
        _ => Some(quote),
    })
}
