//! Opaque parameters carried through the loan provider back to the callback.

use common::errors::ArbError;
use common::types::{Asset, VenueId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallbackParams {
    /// Binds the callback to the request that registered it.
    pub request_id: Uuid,
    pub venue: VenueId,
    /// Intermediate asset of the round trip.
    pub quote_asset: Asset,
    #[serde(with = "rust_decimal::serde::str")]
    pub min_profit: Decimal,
}

impl CallbackParams {
    pub fn encode(&self) -> Result<Vec<u8>, ArbError> {
        serde_json::to_vec(self).map_err(|e| ArbError::InvalidParams(e.to_string()))
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, ArbError> {
        serde_json::from_slice(bytes)
            .map_err(|e| ArbError::InvalidParams(format!("malformed callback params: {}", e)))
    }
}
