//! Records emitted by the engine, and the sinks that carry them.

use crate::types::{Address, Asset, NetworkId, Price, VenueId};
use rust_decimal::Decimal;
use std::fmt;
use std::sync::Mutex;
use tokio::sync::mpsc::UnboundedSender;

/// An observable record of something the engine did or refused to do.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    ArbitrageExecuted {
        network: NetworkId,
        venue: VenueId,
        profit: Decimal,
    },
    NetworkSkipped {
        network: NetworkId,
        reason: String,
    },
    TradingHalted {
        reason: String,
    },
    TradingResumed {
        by: Address,
    },
    PriceChecked {
        asset: Asset,
        price: Price,
    },
    ConfigSet {
        network: NetworkId,
        loan_provider: Option<Address>,
        max_gas_budget: u64,
    },
    SettingsChanged {
        setting: &'static str,
        value: String,
    },
}

impl fmt::Display for EngineEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineEvent::ArbitrageExecuted {
                network,
                venue,
                profit,
            } => write!(f, "arbitrage-executed({network}, {venue}, {profit})"),
            EngineEvent::NetworkSkipped { network, reason } => {
                write!(f, "network-skipped({network}, {reason})")
            }
            EngineEvent::TradingHalted { reason } => write!(f, "trading-halted({reason})"),
            EngineEvent::TradingResumed { by } => write!(f, "trading-resumed({by})"),
            EngineEvent::PriceChecked { asset, price } => {
                write!(f, "price-checked({asset}, {price})")
            }
            EngineEvent::ConfigSet {
                network,
                loan_provider,
                max_gas_budget,
            } => {
                let provider = loan_provider
                    .as_ref()
                    .map(|a| a.to_string())
                    .unwrap_or_else(|| "unset".to_string());
                write!(f, "config-set({network}, {provider}, {max_gas_budget})")
            }
            EngineEvent::SettingsChanged { setting, value } => {
                write!(f, "settings-changed({setting}={value})")
            }
        }
    }
}

/// Destination for emitted records.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: EngineEvent);
}

/// Writes every record to the log.
#[derive(Debug, Default, Clone)]
pub struct LogSink;

impl EventSink for LogSink {
    fn emit(&self, event: EngineEvent) {
        match &event {
            EngineEvent::TradingHalted { .. } => log::error!("{}", event),
            EngineEvent::NetworkSkipped { .. } => log::warn!("{}", event),
            EngineEvent::PriceChecked { .. } => log::debug!("{}", event),
            _ => log::info!("{}", event),
        }
    }
}

/// Forwards records over a channel, e.g. to a reporting task.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: UnboundedSender<EngineEvent>,
}

impl ChannelSink {
    pub fn new(tx: UnboundedSender<EngineEvent>) -> Self {
        Self { tx }
    }
}

impl EventSink for ChannelSink {
    fn emit(&self, event: EngineEvent) {
        if self.tx.send(event).is_err() {
            log::debug!("Event receiver dropped; record discarded");
        }
    }
}

/// Keeps records in memory for later inspection.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<EngineEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of everything emitted so far.
    pub fn events(&self) -> Vec<EngineEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn count_where(&self, predicate: impl Fn(&EngineEvent) -> bool) -> usize {
        self.events().iter().filter(|e| predicate(e)).count()
    }
}

impl EventSink for MemorySink {
    fn emit(&self, event: EngineEvent) {
        match self.events.lock() {
            Ok(mut events) => events.push(event),
            Err(poisoned) => poisoned.into_inner().push(event),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_event_display() {
        let event = EngineEvent::ArbitrageExecuted {
            network: NetworkId::from("base"),
            venue: VenueId::from("aerodrome"),
            profit: dec!(11),
        };
        assert_eq!(format!("{}", event), "arbitrage-executed(base, aerodrome, 11)");

        let event = EngineEvent::ConfigSet {
            network: NetworkId::from("base"),
            loan_provider: None,
            max_gas_budget: 0,
        };
        assert_eq!(format!("{}", event), "config-set(base, unset, 0)");
    }

    #[test]
    fn test_memory_sink_records_in_order() {
        let sink = MemorySink::new();
        sink.emit(EngineEvent::TradingHalted {
            reason: "price drop".to_string(),
        });
        sink.emit(EngineEvent::NetworkSkipped {
            network: NetworkId::from("base"),
            reason: "unprofitable".to_string(),
        });

        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], EngineEvent::TradingHalted { .. }));
        assert_eq!(
            sink.count_where(|e| matches!(e, EngineEvent::NetworkSkipped { .. })),
            1
        );
    }

    #[tokio::test]
    async fn test_channel_sink_forwards() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let sink = ChannelSink::new(tx);
        sink.emit(EngineEvent::TradingResumed {
            by: Address::from("0xadmin"),
        });
        let received = rx.recv().await.unwrap();
        assert_eq!(
            received,
            EngineEvent::TradingResumed {
                by: Address::from("0xadmin")
            }
        );
    }
}
