//! Party-driven deal transitions and the payout path shared with admin
//! overrides.
//!
//! Every payout runs while the desk lock is held, so two releases of the
//! same deal cannot both reach the ledger. A deal only advances after the
//! ledger returns a transfer reference; on failure it keeps its status and
//! administrators get a `TransferFailed` alert.

use escrowdesk_types::{
    AlertReason, Deal, DealBook, DealId, DealStatus, EscrowError, Handle, Notification, Result,
    WalletAddress,
};
use tokio::sync::MutexGuard;

use crate::desk::{DeskState, EscrowDesk};
use crate::lifecycle;
use crate::release::GasCheck;

/// Where a payout sends the escrowed tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Payout {
    /// Deal amount to the buyer's payout wallet; deal ends in `target`.
    ToBuyer { target: DealStatus },
    /// Held amount to an admin-chosen address; deal ends `EmergencyRefunded`.
    Refund { to: WalletAddress },
}

pub(crate) fn transfer_failed(deal_id: DealId, error: &EscrowError) -> Notification {
    Notification::SecurityAlert {
        deal_id: Some(deal_id),
        reason: AlertReason::TransferFailed {
            error: error.to_string(),
        },
    }
}

impl EscrowDesk {
    /// Move funds for `deal` and advance it. Caller holds the desk lock and
    /// has already checked the source status.
    pub(crate) async fn pay_out(
        &self,
        deal: &mut Deal,
        payout: Payout,
        gas: GasCheck,
    ) -> Result<Notification> {
        let (to, amount, target) = match payout {
            Payout::ToBuyer { target } => (deal.buyer_wallet.clone(), deal.amount, target),
            Payout::Refund { to } => (
                to,
                deal.received_amount.unwrap_or(deal.amount),
                DealStatus::EmergencyRefunded,
            ),
        };
        if !deal.status.can_transition_to(target) {
            return Err(EscrowError::InvalidTransition {
                deal_id: deal.id,
                actual: deal.status,
                action: "pay out",
            });
        }

        let transfer = match self.executor.transfer(&to, amount, gas).await {
            Ok(tx) => tx,
            Err(e) => {
                tracing::error!(deal_id = %deal.id, to = %to, amount = %amount, error = %e, "payout failed");
                return Err(e);
            }
        };
        deal.transition(target, "pay out")?;
        deal.transfer_reference = Some(transfer.clone());
        tracing::info!(deal_id = %deal.id, status = %deal.status, tx = %transfer, "deal paid out");

        Ok(match target {
            DealStatus::EmergencyReleased => Notification::EmergencyReleased {
                deal_id: deal.id,
                to,
                amount,
                transfer,
            },
            DealStatus::EmergencyRefunded => Notification::Refunded {
                deal_id: deal.id,
                to,
                amount,
                transfer,
            },
            _ => Notification::DealCompleted {
                deal_id: deal.id,
                buyer: deal.buyer.clone(),
                amount,
                transfer,
            },
        })
    }

    /// Persist and announce the result of [`EscrowDesk::pay_out`].
    ///
    /// When `persist_on_failure` is set the deal book is written even if the
    /// transfer failed, keeping flags the caller set before paying out.
    pub(crate) async fn finish_payout(
        &self,
        guard: MutexGuard<'_, DeskState>,
        deals: &DealBook,
        deal_id: DealId,
        outcome: Result<Notification>,
        persist_on_failure: bool,
    ) -> Result<Deal> {
        let snapshot = deals.get(&deal_id).cloned().ok_or(EscrowError::DealNotFound(deal_id))?;
        match outcome {
            Ok(note) => {
                self.repo.replace_deals(deals)?;
                drop(guard);
                self.publish(vec![note]).await;
                Ok(snapshot)
            }
            Err(e) => {
                if persist_on_failure {
                    self.repo.replace_deals(deals)?;
                }
                drop(guard);
                self.publish(vec![transfer_failed(deal_id, &e)]).await;
                Err(e)
            }
        }
    }

    /// Buyer declares fiat sent.
    ///
    /// # Errors
    /// `DealNotFound`, `NotAParty` unless the caller is the buyer, or
    /// `InvalidTransition` unless the deal is `Deposited`.
    pub async fn confirm_fiat_sent(&self, actor: &Handle, deal_id: DealId) -> Result<Deal> {
        let guard = self.state.lock().await;
        let mut deals = self.repo.load_deals()?;
        let deal = deals.get_mut(&deal_id)?;
        lifecycle::mark_fiat_sent(deal, actor)?;
        let snapshot = deal.clone();
        self.repo.replace_deals(&deals)?;
        drop(guard);

        tracing::info!(deal_id = %deal_id, buyer = %actor, "fiat marked sent");
        self.publish(vec![Notification::FiatSent {
            deal_id,
            seller: snapshot.seller.clone(),
        }])
        .await;
        Ok(snapshot)
    }

    /// Seller confirms fiat received. With both confirmations in place the
    /// deal amount is released to the buyer.
    ///
    /// # Errors
    /// Party and status errors as for [`EscrowDesk::confirm_fiat_sent`],
    /// plus any release failure. On release failure the seller's
    /// confirmation is kept and the deal stays `FiatSent`.
    pub async fn confirm_fiat_received(&self, actor: &Handle, deal_id: DealId) -> Result<Deal> {
        let guard = self.state.lock().await;
        let mut deals = self.repo.load_deals()?;
        let deal = deals.get_mut(&deal_id)?;
        let ready = lifecycle::mark_fiat_received(deal, actor)?;
        tracing::info!(deal_id = %deal_id, seller = %actor, ready, "fiat marked received");

        if !ready {
            let snapshot = deal.clone();
            self.repo.replace_deals(&deals)?;
            return Ok(snapshot);
        }

        let outcome = self
            .pay_out(
                deal,
                Payout::ToBuyer {
                    target: DealStatus::Released,
                },
                GasCheck::Required,
            )
            .await;
        self.finish_payout(guard, &deals, deal_id, outcome, true).await
    }

    /// Seller reports that fiat never arrived.
    pub async fn report_not_received(&self, actor: &Handle, deal_id: DealId) -> Result<Deal> {
        self.dispute_with(deal_id, actor, |deal| lifecycle::mark_not_received(deal, actor))
            .await
    }

    /// Either party raises a dispute on a funded deal.
    pub async fn open_dispute(&self, actor: &Handle, deal_id: DealId, reason: &str) -> Result<Deal> {
        self.dispute_with(deal_id, actor, |deal| lifecycle::open_dispute(deal, actor, reason))
            .await
    }

    async fn dispute_with(
        &self,
        deal_id: DealId,
        actor: &Handle,
        apply: impl FnOnce(&mut Deal) -> Result<()>,
    ) -> Result<Deal> {
        let guard = self.state.lock().await;
        let mut deals = self.repo.load_deals()?;
        let deal = deals.get_mut(&deal_id)?;
        apply(deal)?;
        let snapshot = deal.clone();
        self.repo.replace_deals(&deals)?;
        drop(guard);

        tracing::warn!(deal_id = %deal_id, by = %actor, "dispute opened");
        self.publish(vec![Notification::DisputeOpened {
            deal_id,
            raised_by: actor.clone(),
            reason: snapshot.dispute_reason.clone().unwrap_or_default(),
        }])
        .await;
        Ok(snapshot)
    }
}
