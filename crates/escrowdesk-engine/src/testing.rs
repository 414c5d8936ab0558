//! In-memory doubles for the outbound ports. Enabled by the
//! `test-helpers` feature.

use std::sync::{
    Mutex, MutexGuard, PoisonError,
    atomic::{AtomicU64, Ordering},
};

use async_trait::async_trait;
use escrowdesk_types::{
    ChannelId, Deal, EscrowError, Notification, Result, TransferReference, WalletAddress,
    constants,
};
use rust_decimal::Decimal;

use crate::ports::{ForwardingProvider, LedgerClient, Notifier, TransferRequest};
use crate::reconcile::{ObservedDeposit, SenderVerifier};
use crate::units::to_base_units;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Scriptable ledger: a single token balance for the custodial wallet, a
/// native balance, and a log of submitted transfers.
#[derive(Debug)]
pub struct MockLedger {
    token_units: Mutex<u128>,
    native: Mutex<Decimal>,
    balance_failure: Mutex<Option<String>>,
    transfer_failure: Mutex<Option<String>>,
    transfers: Mutex<Vec<TransferRequest>>,
    next_tx: AtomicU64,
}

impl Default for MockLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl MockLedger {
    /// Zero tokens, one native coin of gas.
    pub fn new() -> Self {
        Self {
            token_units: Mutex::new(0),
            native: Mutex::new(Decimal::ONE),
            balance_failure: Mutex::new(None),
            transfer_failure: Mutex::new(None),
            transfers: Mutex::new(Vec::new()),
            next_tx: AtomicU64::new(1),
        }
    }

    /// Add `amount` whole tokens to the custodial balance.
    pub fn credit(&self, amount: Decimal) {
        let units = to_base_units(amount, constants::DEFAULT_TOKEN_DECIMALS)
            .expect("test credit fits in base units");
        *lock(&self.token_units) += units;
    }

    pub fn set_token_units(&self, units: u128) {
        *lock(&self.token_units) = units;
    }

    pub fn set_native_balance(&self, amount: Decimal) {
        *lock(&self.native) = amount;
    }

    /// Make balance reads fail until [`MockLedger::heal_balance_reads`].
    pub fn fail_balance_reads(&self, reason: &str) {
        *lock(&self.balance_failure) = Some(reason.to_string());
    }

    pub fn heal_balance_reads(&self) {
        *lock(&self.balance_failure) = None;
    }

    /// Make submissions fail until [`MockLedger::heal_transfers`].
    pub fn fail_transfers(&self, reason: &str) {
        *lock(&self.transfer_failure) = Some(reason.to_string());
    }

    pub fn heal_transfers(&self) {
        *lock(&self.transfer_failure) = None;
    }

    /// Every successful submission so far.
    pub fn transfers(&self) -> Vec<TransferRequest> {
        lock(&self.transfers).clone()
    }
}

#[async_trait]
impl LedgerClient for MockLedger {
    fn token_decimals(&self) -> u32 {
        constants::DEFAULT_TOKEN_DECIMALS
    }

    async fn token_balance(&self, _address: &WalletAddress, _token_id: &str) -> Result<u128> {
        if let Some(reason) = lock(&self.balance_failure).clone() {
            return Err(EscrowError::BalanceUnavailable { reason });
        }
        Ok(*lock(&self.token_units))
    }

    async fn native_balance(&self, _address: &WalletAddress) -> Result<Decimal> {
        if let Some(reason) = lock(&self.balance_failure).clone() {
            return Err(EscrowError::BalanceUnavailable { reason });
        }
        Ok(*lock(&self.native))
    }

    async fn submit_transfer(&self, request: &TransferRequest) -> Result<TransferReference> {
        if let Some(reason) = lock(&self.transfer_failure).clone() {
            return Err(EscrowError::SubmissionFailed { reason });
        }
        {
            let mut units = lock(&self.token_units);
            *units = units.saturating_sub(request.amount_units);
        }
        lock(&self.transfers).push(request.clone());
        let n = self.next_tx.fetch_add(1, Ordering::Relaxed);
        Ok(TransferReference(format!("0x{n:064x}")))
    }
}

/// Captures every notification. Can be told to fail delivery.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<(ChannelId, Notification)>>,
    failing: Mutex<bool>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        *lock(&self.failing) = failing;
    }

    /// Notifications delivered so far, oldest first.
    pub fn notifications(&self) -> Vec<Notification> {
        lock(&self.sent).iter().map(|(_, n)| n.clone()).collect()
    }

    pub fn channels(&self) -> Vec<ChannelId> {
        lock(&self.sent).iter().map(|(c, _)| *c).collect()
    }

    /// How many delivered notifications satisfy `pred`.
    pub fn count(&self, pred: impl Fn(&Notification) -> bool) -> usize {
        lock(&self.sent).iter().filter(|(_, n)| pred(n)).count()
    }

    pub fn clear(&self) {
        lock(&self.sent).clear();
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, channel: ChannelId, notification: &Notification) -> Result<()> {
        if *lock(&self.failing) {
            return Err(EscrowError::Internal("gateway unavailable".into()));
        }
        lock(&self.sent).push((channel, notification.clone()));
        Ok(())
    }
}

/// Forwarding provider returning a deterministic per-deal address.
#[derive(Debug, Default)]
pub struct StaticForwarding {
    failing: Mutex<bool>,
}

impl StaticForwarding {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        *lock(&self.failing) = failing;
    }

    /// The address issued for `deal`.
    pub fn address_for(deal: &Deal) -> String {
        format!("fwd-{}", deal.id)
    }
}

#[async_trait]
impl ForwardingProvider for StaticForwarding {
    async fn create_forwarding_address(&self, deal: &Deal) -> Result<String> {
        if *lock(&self.failing) {
            return Err(EscrowError::Internal("provider unavailable".into()));
        }
        Ok(Self::address_for(deal))
    }
}

/// Sender verification that rejects every deposit.
#[derive(Debug, Default, Clone, Copy)]
pub struct RejectAllSenders;

impl SenderVerifier for RejectAllSenders {
    fn verify(&self, _deal: &Deal, _deposit: &ObservedDeposit) -> bool {
        false
    }
}
