//! Payment reconciliation.
//!
//! The custodial wallet is shared by every deal, so a deposit is inferred
//! from the change in its token balance between two cycles:
//!
//! ```text
//! tick ─▶ sweep expired deals ─▶ sample balance ─▶ delta = now - last
//!   delta <= 0          ─▶ record sample, done
//!   |delta - amount| <= tolerance ─▶ claim (deal, amount) ─▶ sender check
//!                                    ├─ pass: WAITING_DEPOSIT → DEPOSITED
//!                                    └─ fail: → CANCELLED_WRONG_SENDER
//!   otherwise           ─▶ → CANCELLED_WRONG_AMOUNT, alert admins
//! ```
//!
//! At most one deal consumes a given delta. The first cycle after start only
//! records a baseline. Webhook deposits go through the same confirm and
//! reject paths.

use chrono::{DateTime, Utc};
use escrowdesk_types::{
    AlertReason, Deal, DealBook, DealId, DealStatus, Notification, Result, SellerWallet,
    TransferReference,
};
use rust_decimal::Decimal;

use crate::desk::EscrowDesk;
use crate::units::from_base_units;

/// How an observed amount compares to the deal amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DepositMatch {
    /// Within tolerance.
    Exact,
    Over,
    Under,
}

/// `observed` against `expected`, allowing `tolerance` either way.
#[must_use]
pub fn classify_deposit(observed: Decimal, expected: Decimal, tolerance: Decimal) -> DepositMatch {
    if (observed - expected).abs() <= tolerance {
        DepositMatch::Exact
    } else if observed > expected {
        DepositMatch::Over
    } else {
        DepositMatch::Under
    }
}

/// A deposit seen either as a balance delta or via the forwarding webhook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservedDeposit {
    pub amount: Decimal,
    /// Provider transaction id. Balance deltas carry none.
    pub reference: Option<TransferReference>,
}

/// Decides whether a deposit came from the seller's authorized wallet.
/// Only consulted when the deal has one registered.
pub trait SenderVerifier: Send + Sync {
    fn verify(&self, deal: &Deal, deposit: &ObservedDeposit) -> bool;
}

/// Accepts any deposit for a deal whose seller wallet is registered.
///
/// A balance delta does not identify its sender, so the registered wallet
/// cannot be checked against chain data here.
#[derive(Debug, Default, Clone, Copy)]
pub struct AcceptRegisteredSender;

impl SenderVerifier for AcceptRegisteredSender {
    fn verify(&self, deal: &Deal, _deposit: &ObservedDeposit) -> bool {
        deal.seller_wallet.is_set()
    }
}

/// What a deal did with an observed deposit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DepositOutcome {
    Confirmed(DealId),
    WrongAmount(DealId),
    WrongSender(DealId),
}

/// Summary of one reconciliation cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub expired: Vec<DealId>,
    /// Balance observed this cycle.
    pub balance: Option<Decimal>,
    /// Change since the previous sample; `None` on the baseline cycle.
    pub delta: Option<Decimal>,
    pub outcome: Option<DepositOutcome>,
}

impl EscrowDesk {
    /// Remove in-flight deals older than the deal TTL.
    fn sweep_expired(&self, deals: &mut DealBook, now: DateTime<Utc>) -> Vec<Notification> {
        let ttl = self.config.deal_ttl();
        let expired: Vec<DealId> = deals
            .iter()
            .filter(|d| d.is_expired(now, ttl))
            .map(|d| d.id)
            .collect();
        expired
            .into_iter()
            .filter_map(|id| deals.remove(&id))
            .map(|deal| {
                tracing::info!(deal_id = %deal.id, status = %deal.status, "deal expired");
                Notification::DealExpired {
                    deal_id: deal.id,
                    buyer: deal.buyer,
                    seller: deal.seller,
                }
            })
            .collect()
    }

    /// Apply an observed deposit to a `WaitingDeposit` deal whose amount it
    /// matches. Caller holds the desk lock and has claimed the payment.
    pub(crate) fn confirm_deposit(&self, deal: &mut Deal, deposit: &ObservedDeposit) -> Result<(DepositOutcome, Notification)> {
        let sender_ok = match &deal.seller_wallet {
            SellerWallet::Set(_) => self.sender_check.verify(deal, deposit),
            SellerWallet::Unset => true,
        };
        if !sender_ok {
            deal.transition(DealStatus::CancelledWrongSender, "confirm deposit")?;
            deal.cancel_reason = Some("deposit not from the seller's registered wallet".into());
            tracing::warn!(deal_id = %deal.id, expected = %deal.seller_wallet, "deposit from wrong sender");
            return Ok((
                DepositOutcome::WrongSender(deal.id),
                Notification::SecurityAlert {
                    deal_id: Some(deal.id),
                    reason: AlertReason::WrongSender {
                        expected_wallet: deal.seller_wallet.to_string(),
                    },
                },
            ));
        }

        deal.transition(DealStatus::Deposited, "confirm deposit")?;
        deal.deposit_reference.clone_from(&deposit.reference);
        tracing::info!(deal_id = %deal.id, amount = %deposit.amount, "deposit confirmed");
        Ok((
            DepositOutcome::Confirmed(deal.id),
            Notification::DepositConfirmed {
                deal_id: deal.id,
                buyer: deal.buyer.clone(),
                seller: deal.seller.clone(),
                amount: deal.amount,
            },
        ))
    }

    /// Cancel a `WaitingDeposit` deal whose deposit diverged from its amount.
    pub(crate) fn reject_amount(deal: &mut Deal, observed: Decimal) -> Result<(DepositOutcome, Notification)> {
        deal.transition(DealStatus::CancelledWrongAmount, "confirm deposit")?;
        deal.received_amount = Some(observed);
        deal.cancel_reason = Some(if observed > deal.amount {
            format!("received {observed}, expected {}: overpaid", deal.amount)
        } else {
            format!("received {observed}, expected {}: insufficient amount", deal.amount)
        });
        tracing::warn!(deal_id = %deal.id, expected = %deal.amount, received = %observed, "deposit amount mismatch");
        Ok((
            DepositOutcome::WrongAmount(deal.id),
            Notification::SecurityAlert {
                deal_id: Some(deal.id),
                reason: AlertReason::WrongAmount {
                    expected: deal.amount,
                    received: observed,
                },
            },
        ))
    }

    /// Match one balance delta against the waiting deals, oldest first.
    /// The first deal that reacts to the delta consumes it.
    fn attribute_delta(
        &self,
        deals: &mut DealBook,
        delta: Decimal,
        now: DateTime<Utc>,
    ) -> Result<Option<(DepositOutcome, Notification)>> {
        let ttl = self.config.deal_ttl();
        let tolerance = self.config.amount_tolerance;
        let waiting: Vec<DealId> = deals.waiting_deposit().map(|d| d.id).collect();

        for id in waiting {
            let deal = deals.get_mut(&id)?;
            match classify_deposit(delta, deal.amount, tolerance) {
                DepositMatch::Exact => {
                    if self.claims.try_claim(deal.id, deal.amount, now).is_err() {
                        tracing::debug!(deal_id = %deal.id, "payment already claimed, skipping");
                        continue;
                    }
                    if deal.is_expired(now, ttl) {
                        continue;
                    }
                    let deposit = ObservedDeposit {
                        amount: delta,
                        reference: None,
                    };
                    return self.confirm_deposit(deal, &deposit).map(Some);
                }
                DepositMatch::Over | DepositMatch::Under => {
                    return Self::reject_amount(deal, delta).map(Some);
                }
            }
        }
        Ok(None)
    }

    /// Run one reconciliation cycle.
    ///
    /// # Errors
    /// Ledger or repository errors. A failed balance read leaves the last
    /// sample untouched; expiry results from the same cycle are kept.
    pub async fn reconcile_once(&self) -> Result<CycleReport> {
        let mut state = self.state.lock().await;
        let now = self.clock.now();
        let mut report = CycleReport::default();

        let mut deals = self.repo.load_deals()?;
        let mut notes = self.sweep_expired(&mut deals, now);
        report.expired = notes.iter().filter_map(Notification::deal_id).collect();
        if !notes.is_empty() {
            self.repo.replace_deals(&deals)?;
        }
        let claims_dropped = self.claims.prune(now);
        let users_dropped = self.limiter().prune(now);
        if claims_dropped + users_dropped > 0 {
            tracing::debug!(
                claims_dropped,
                users_dropped,
                live_claims = self.claims.len(),
                "guard state pruned"
            );
        }

        let sampled = match self
            .ledger
            .token_balance(&self.config.custodial_wallet, &self.config.token_id)
            .await
            .and_then(|units| from_base_units(units, self.ledger.token_decimals()))
        {
            Ok(balance) => balance,
            Err(e) => {
                drop(state);
                self.publish(notes).await;
                return Err(e);
            }
        };
        report.balance = Some(sampled);
        let previous = state.last_balance.replace(sampled);

        if let Some(previous) = previous {
            let delta = sampled - previous;
            report.delta = Some(delta);
            if delta > Decimal::ZERO {
                tracing::debug!(delta = %delta, balance = %sampled, "custodial balance increased");
                if let Some((outcome, note)) = self.attribute_delta(&mut deals, delta, now)? {
                    self.repo.replace_deals(&deals)?;
                    report.outcome = Some(outcome);
                    notes.push(note);
                }
            }
        } else {
            tracing::info!(balance = %sampled, "reconciliation baseline recorded");
        }
        drop(state);

        self.publish(notes).await;
        Ok(report)
    }
}
