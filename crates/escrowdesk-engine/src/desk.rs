//! `EscrowDesk`: the coordinator that owns the ports, the guard state and
//! the single lock serializing every read-modify-write of the repository.
//!
//! ```text
//! command / webhook / poll tick
//!         │
//!         ▼
//!  ┌──────────────┐  lock  ┌────────────┐  load/replace  ┌────────────┐
//!  │  EscrowDesk  ├───────▶│ DeskState  ├───────────────▶│ Repository │
//!  └──────┬───────┘        └────────────┘                └────────────┘
//!         │ after unlock
//!         ▼
//!      Notifier
//! ```
//!
//! Operations live in sibling modules as further `impl EscrowDesk` blocks:
//! [`crate::trading`], [`crate::settlement`], [`crate::admin`],
//! [`crate::reconcile`], [`crate::webhook`], [`crate::commands`].

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use escrowdesk_guard::{PaymentClaims, RateLimiter};
use escrowdesk_store::Repository;
use escrowdesk_types::{
    Blacklist, Deal, DealId, EscrowConfig, EscrowError, Handle, Notification, Result,
    WalletAddress, constants,
};
use rust_decimal::Decimal;

use crate::book::{BookSnapshot, OrderBook};
use crate::clock::{Clock, SystemClock};
use crate::ports::{ForwardingProvider, LedgerClient, Notifier};
use crate::reconcile::{AcceptRegisteredSender, SenderVerifier};
use crate::release::ReleaseExecutor;

/// State guarded by the coordinating lock, besides the repository itself.
#[derive(Debug, Default)]
pub(crate) struct DeskState {
    /// Custodial token balance seen by the previous reconciliation cycle.
    pub(crate) last_balance: Option<Decimal>,
}

/// The escrow core.
pub struct EscrowDesk {
    pub(crate) config: EscrowConfig,
    pub(crate) repo: Arc<dyn Repository>,
    pub(crate) ledger: Arc<dyn LedgerClient>,
    pub(crate) notifier: Arc<dyn Notifier>,
    pub(crate) forwarding: Option<Arc<dyn ForwardingProvider>>,
    pub(crate) sender_check: Arc<dyn SenderVerifier>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) executor: ReleaseExecutor,
    pub(crate) state: tokio::sync::Mutex<DeskState>,
    limiter: Mutex<RateLimiter>,
    pub(crate) claims: PaymentClaims,
}

impl EscrowDesk {
    /// Build a desk over validated `config`.
    ///
    /// # Errors
    /// Returns `Configuration` if `config` fails validation.
    pub fn new(
        config: EscrowConfig,
        repo: Arc<dyn Repository>,
        ledger: Arc<dyn LedgerClient>,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self> {
        config.validate()?;
        let executor = ReleaseExecutor::new(
            Arc::clone(&ledger),
            config.custodial_wallet.clone(),
            config.token_id.clone(),
            config.min_gas_reserve,
        );
        tracing::info!(
            engine = constants::ENGINE_NAME,
            version = constants::VERSION,
            custodial = %config.custodial_wallet,
            channel = %config.group_channel,
            "escrow desk ready"
        );
        Ok(Self {
            limiter: Mutex::new(RateLimiter::new(&config.rate_limits)),
            claims: PaymentClaims::new(config.claim_ttl(), constants::MAX_PAYMENT_CLAIMS),
            config,
            repo,
            ledger,
            notifier,
            forwarding: None,
            sender_check: Arc::new(AcceptRegisteredSender),
            clock: Arc::new(SystemClock),
            executor,
            state: tokio::sync::Mutex::new(DeskState::default()),
        })
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn with_forwarding(mut self, provider: Arc<dyn ForwardingProvider>) -> Self {
        self.forwarding = Some(provider);
        self
    }

    #[must_use]
    pub fn with_sender_verifier(mut self, verifier: Arc<dyn SenderVerifier>) -> Self {
        self.sender_check = verifier;
        self
    }

    #[must_use]
    pub fn config(&self) -> &EscrowConfig {
        &self.config
    }

    pub(crate) fn limiter(&self) -> MutexGuard<'_, RateLimiter> {
        self.limiter.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn ensure_admin(&self, actor: &Handle) -> Result<()> {
        if self.config.is_admin(actor) {
            Ok(())
        } else {
            Err(EscrowError::NotAdmin(actor.clone()))
        }
    }

    /// Amount bounds from the config, and no more decimal places than the
    /// token carries.
    pub(crate) fn check_deal_amount(&self, amount: Decimal) -> Result<()> {
        self.config.check_amount(amount)?;
        let decimals = self.ledger.token_decimals();
        if amount.normalize().scale() > decimals {
            return Err(EscrowError::InvalidAmount {
                reason: format!("{amount} has more than {decimals} decimal places"),
            });
        }
        Ok(())
    }

    /// Deliver `notes` to the group channel. Delivery failures are logged
    /// and dropped; state has already been persisted.
    pub(crate) async fn publish(&self, notes: Vec<Notification>) {
        for note in notes {
            if let Err(e) = self.notifier.notify(self.config.group_channel, &note).await {
                tracing::warn!(
                    error = %e,
                    deal_id = ?note.deal_id(),
                    alert = note.is_alert(),
                    "notification not delivered"
                );
            }
        }
    }

    /// Build a new `WaitingDeposit` deal and ask the forwarding provider,
    /// if any, for a deposit address. Returns the deal and the address the
    /// seller must pay into.
    pub(crate) async fn open_deal(&self, mut deal: Deal) -> (Deal, String) {
        let mut deposit_to = self.config.custodial_wallet.to_string();
        if let Some(provider) = &self.forwarding {
            match provider.create_forwarding_address(&deal).await {
                Ok(address) => {
                    deal.deposit_address = Some(address.clone());
                    deposit_to = address;
                }
                Err(e) => tracing::warn!(
                    deal_id = %deal.id,
                    error = %e,
                    "forwarding address unavailable, using custodial wallet"
                ),
            }
        }
        tracing::info!(
            deal_id = %deal.id,
            buyer = %deal.buyer,
            seller = %deal.seller,
            amount = %deal.amount,
            "deal opened"
        );
        (deal, deposit_to)
    }

    // =================================================================
    // Queries
    // =================================================================

    /// # Errors
    /// `DealNotFound` if no deal has this id.
    pub fn deal(&self, id: DealId) -> Result<Deal> {
        self.repo
            .load_deals()?
            .get(&id)
            .cloned()
            .ok_or(EscrowError::DealNotFound(id))
    }

    /// Every stored deal, oldest first.
    pub fn deals(&self) -> Result<Vec<Deal>> {
        Ok(self.repo.load_deals()?.iter().cloned().collect())
    }

    /// Active orders on both sides.
    pub fn list_orders(&self) -> Result<BookSnapshot> {
        Ok(OrderBook::from_state(self.repo.load_orders()?).snapshot())
    }

    pub fn wallet_of(&self, handle: &Handle) -> Result<Option<WalletAddress>> {
        Ok(self.repo.load_wallets()?.get(handle).cloned())
    }

    pub fn blacklist(&self) -> Result<Blacklist> {
        self.repo.load_blacklist()
    }

    /// Custodial balance recorded by the last reconciliation cycle.
    pub async fn last_sampled_balance(&self) -> Option<Decimal> {
        self.state.lock().await.last_balance
    }
}

impl std::fmt::Debug for EscrowDesk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EscrowDesk")
            .field("config", &self.config)
            .field("forwarding", &self.forwarding.is_some())
            .field("executor", &self.executor)
            .finish_non_exhaustive()
    }
}
