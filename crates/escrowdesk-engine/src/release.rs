//! Release executor: moves tokens out of the custodial wallet.
//!
//! 1. Gas pre-check: the custodial wallet must hold at least the configured
//!    native reserve (skipped for admin force release)
//! 2. Convert whole tokens to base units with the token's decimals
//! 3. Submit the transfer through the [`LedgerClient`]
//!
//! The executor never touches deal state. Callers only advance a deal
//! after a transfer reference comes back.

use std::sync::Arc;

use escrowdesk_types::{EscrowError, Result, TransferReference, WalletAddress};
use rust_decimal::Decimal;

use crate::ports::{LedgerClient, TransferRequest};
use crate::units::to_base_units;

/// Whether to verify the gas reserve before submitting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GasCheck {
    Required,
    Skip,
}

pub struct ReleaseExecutor {
    ledger: Arc<dyn LedgerClient>,
    custodial_wallet: WalletAddress,
    token_id: String,
    min_gas_reserve: Decimal,
}

impl ReleaseExecutor {
    #[must_use]
    pub fn new(
        ledger: Arc<dyn LedgerClient>,
        custodial_wallet: WalletAddress,
        token_id: String,
        min_gas_reserve: Decimal,
    ) -> Self {
        Self {
            ledger,
            custodial_wallet,
            token_id,
            min_gas_reserve,
        }
    }

    /// Transfer `amount` whole tokens from custody to `to`.
    ///
    /// # Errors
    /// - `InsufficientGas` if the reserve check fails
    /// - whatever the ledger returns for balance reads or submission
    pub async fn transfer(
        &self,
        to: &WalletAddress,
        amount: Decimal,
        gas: GasCheck,
    ) -> Result<TransferReference> {
        if gas == GasCheck::Required {
            let available = self.ledger.native_balance(&self.custodial_wallet).await?;
            if available < self.min_gas_reserve {
                tracing::warn!(
                    available = %available,
                    needed = %self.min_gas_reserve,
                    "custodial wallet below gas reserve"
                );
                return Err(EscrowError::InsufficientGas {
                    needed: self.min_gas_reserve,
                    available,
                });
            }
        }

        let request = TransferRequest {
            from: self.custodial_wallet.clone(),
            to: to.clone(),
            token_id: self.token_id.clone(),
            amount_units: to_base_units(amount, self.ledger.token_decimals())?,
        };
        let reference = self.ledger.submit_transfer(&request).await?;
        tracing::info!(to = %to, amount = %amount, tx = %reference, "transfer submitted");
        Ok(reference)
    }
}

impl std::fmt::Debug for ReleaseExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReleaseExecutor")
            .field("custodial_wallet", &self.custodial_wallet)
            .field("token_id", &self.token_id)
            .field("min_gas_reserve", &self.min_gas_reserve)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockLedger;

    fn wallet(byte: char) -> WalletAddress {
        WalletAddress::parse(&format!("0x{}", byte.to_string().repeat(40))).unwrap()
    }

    fn executor(ledger: &Arc<MockLedger>) -> ReleaseExecutor {
        ReleaseExecutor::new(
            Arc::clone(ledger) as Arc<dyn LedgerClient>,
            wallet('a'),
            "usdt".into(),
            Decimal::new(1, 2),
        )
    }

    #[tokio::test]
    async fn submits_base_units() {
        let ledger = Arc::new(MockLedger::new());
        let tx = executor(&ledger)
            .transfer(&wallet('b'), Decimal::TEN, GasCheck::Required)
            .await
            .unwrap();

        let sent = ledger.transfers();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].amount_units, 10_000_000);
        assert_eq!(sent[0].to, wallet('b'));
        assert_eq!(sent[0].from, wallet('a'));
        assert!(!tx.0.is_empty());
    }

    #[tokio::test]
    async fn low_gas_blocks_transfer() {
        let ledger = Arc::new(MockLedger::new());
        ledger.set_native_balance(Decimal::new(1, 3));
        let err = executor(&ledger)
            .transfer(&wallet('b'), Decimal::TEN, GasCheck::Required)
            .await
            .unwrap_err();
        assert!(matches!(err, EscrowError::InsufficientGas { .. }));
        assert!(ledger.transfers().is_empty());
    }

    #[tokio::test]
    async fn skip_ignores_gas_reserve() {
        let ledger = Arc::new(MockLedger::new());
        ledger.set_native_balance(Decimal::ZERO);
        executor(&ledger)
            .transfer(&wallet('b'), Decimal::ONE, GasCheck::Skip)
            .await
            .unwrap();
        assert_eq!(ledger.transfers().len(), 1);
    }

    #[tokio::test]
    async fn submission_failure_propagates() {
        let ledger = Arc::new(MockLedger::new());
        ledger.fail_transfers("nonce too low");
        let err = executor(&ledger)
            .transfer(&wallet('b'), Decimal::ONE, GasCheck::Required)
            .await
            .unwrap_err();
        assert!(matches!(err, EscrowError::SubmissionFailed { .. }));
    }
}
