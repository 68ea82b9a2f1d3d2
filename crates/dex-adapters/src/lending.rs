use crate::chain::SimulatedChain;
use async_trait::async_trait;
use common::errors::ArbError;
use common::traits::{FlashLoanCall, LoanCallback, LoanProvider, LoanReceiver};
use common::types::Address;
use rust_decimal::Decimal;
use std::sync::Arc;

/// Flash lender over a [`SimulatedChain`].
///
/// The whole request is one unit: the ledger is snapshotted up front and
/// restored if funding, the receiver's callback, or repayment fails.
pub struct SimulatedLendingPool {
    address: Address,
    chain: Arc<SimulatedChain>,
    fee_bps: u32,
}

impl SimulatedLendingPool {
    pub fn new(address: Address, chain: Arc<SimulatedChain>, fee_bps: u32) -> Self {
        Self {
            address,
            chain,
            fee_bps,
        }
    }

    pub fn fee_for(&self, amount: Decimal) -> Decimal {
        amount * Decimal::from(self.fee_bps) / Decimal::from(10_000u32)
    }

    fn validate(call: &FlashLoanCall) -> Result<(), ArbError> {
        if call.assets.is_empty() || call.assets.len() != call.amounts.len() {
            return Err(ArbError::InvalidParams(format!(
                "{} assets for {} amounts",
                call.assets.len(),
                call.amounts.len()
            )));
        }
        if call.modes.len() != call.assets.len() || call.modes.iter().any(|m| *m != 0) {
            return Err(ArbError::InvalidParams(
                "only mode 0 (repay within the unit) is supported".to_string(),
            ));
        }
        if call.amounts.iter().any(|a| *a <= Decimal::ZERO) {
            return Err(ArbError::InvalidParams(
                "loan amounts must be positive".to_string(),
            ));
        }
        Ok(())
    }

    async fn run_unit(
        &self,
        initiator: &Address,
        receiver: &dyn LoanReceiver,
        call: FlashLoanCall,
    ) -> Result<(), ArbError> {
        let borrower = receiver.address().clone();
        let fees: Vec<Decimal> = call.amounts.iter().map(|a| self.fee_for(*a)).collect();

        for (asset, amount) in call.assets.iter().zip(&call.amounts) {
            self.chain
                .transfer(&self.address, &borrower, asset, *amount)
                .map_err(|e| ArbError::LoanFailed(format!("funding {}: {}", asset, e)))?;
        }

        receiver
            .on_loan_callback(
                &self.address,
                LoanCallback {
                    assets: call.assets.clone(),
                    amounts: call.amounts.clone(),
                    fees: fees.clone(),
                    initiator: initiator.clone(),
                    params: call.params,
                },
            )
            .await?;

        for ((asset, amount), fee) in call.assets.iter().zip(&call.amounts).zip(&fees) {
            self.chain
                .transfer_from(&self.address, &borrower, &self.address, asset, *amount + *fee)
                .map_err(|e| ArbError::LoanFailed(format!("repaying {}: {}", asset, e)))?;
        }
        Ok(())
    }
}

#[async_trait]
impl LoanProvider for SimulatedLendingPool {
    fn address(&self) -> &Address {
        &self.address
    }

    fn fee_bps(&self) -> u32 {
        self.fee_bps
    }

    async fn request_loan(
        &self,
        initiator: &Address,
        receiver: &dyn LoanReceiver,
        call: FlashLoanCall,
    ) -> Result<(), ArbError> {
        Self::validate(&call)?;

        let snapshot = self.chain.snapshot();
        match self.run_unit(initiator, receiver, call).await {
            Ok(()) => Ok(()),
            Err(e) => {
                self.chain.restore(snapshot);
                log::warn!("Loan unit from {} reverted: {}", self.address, e);
                Err(e)
            }
        }
    }
}
